use crate::compile::CompileResult;
use crate::options::CompileOptions;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default cache location, relative to the project root.
pub const CACHE_DIR: &str = ".bling/cache";

#[derive(Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: CompileResult,
}

/// On-disk cache of compile results, one JSON file per module and build.
pub struct CompileCache {
    cache_dir: PathBuf,
}

impl CompileCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn in_root(root: &Path) -> io::Result<Self> {
        Self::new(root.join(CACHE_DIR))
    }

    /// Hash of everything that determines the output of a compile.
    pub fn fingerprint(source: &str, options: &CompileOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_string(options).unwrap_or_default().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, file_path: &str, ssr: bool) -> PathBuf {
        let safe_name = file_path.replace(['/', '\\', ':'], "_");
        let build = if ssr { "server" } else { "client" };
        self.cache_dir.join(format!("{}.{}.json", safe_name, build))
    }

    pub fn get(
        &self,
        file_path: &str,
        source: &str,
        options: &CompileOptions,
    ) -> Option<CompileResult> {
        let entry_path = self.entry_path(file_path, options.ssr);
        let data = fs::read_to_string(&entry_path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("dropping corrupt cache entry for {}: {}", file_path, e);
                fs::remove_file(entry_path).ok();
                return None;
            }
        };

        if entry.fingerprint == Self::fingerprint(source, options) {
            debug!("cache hit for {}", file_path);
            Some(entry.result)
        } else {
            debug!("cache stale for {}", file_path);
            None
        }
    }

    pub fn set(
        &self,
        file_path: &str,
        source: &str,
        options: &CompileOptions,
        result: &CompileResult,
    ) {
        let entry = CacheEntry {
            fingerprint: Self::fingerprint(source, options),
            result: result.clone(),
        };
        let entry_path = self.entry_path(file_path, options.ssr);
        match serde_json::to_string(&entry) {
            Ok(data) => {
                if let Err(e) = fs::write(&entry_path, data) {
                    warn!("cannot write cache entry {}: {}", entry_path.display(), e);
                }
            }
            Err(e) => warn!("cannot serialize cache entry for {}: {}", file_path, e),
        }
    }
}
