use serde::{Deserialize, Serialize};
use std::env;
use std::io;

/// Out-of-band build environment. `TestClient` keeps the handler body reachable
/// in client output so tests can call it without a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildProfile {
    #[default]
    Client,
    TestClient,
}

impl BuildProfile {
    /// `TEST_ENV=client` selects the test profile.
    pub fn from_env() -> Self {
        match env::var("TEST_ENV").as_deref() {
            Ok("client") => BuildProfile::TestClient,
            _ => BuildProfile::Client,
        }
    }

    pub fn keeps_handlers(self) -> bool {
        self == BuildProfile::TestClient
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    pub ssr: bool,
    /// Absolute directory that module paths are made relative to.
    pub root: String,
    #[serde(default)]
    pub minify: bool,
    #[serde(default)]
    pub profile: BuildProfile,
}

impl CompileOptions {
    pub fn new(ssr: bool, root: impl Into<String>) -> Self {
        CompileOptions {
            ssr,
            root: root.into(),
            minify: false,
            profile: BuildProfile::Client,
        }
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_profile(mut self, profile: BuildProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Plugin defaults: cwd as root, minify in production, profile from `TEST_ENV`.
    pub fn from_env(ssr: bool) -> io::Result<Self> {
        let root = env::current_dir()?.to_string_lossy().to_string();
        let minify = env::var("NODE_ENV").as_deref() == Ok("production");
        Ok(CompileOptions {
            ssr,
            root,
            minify,
            profile: BuildProfile::from_env(),
        })
    }
}
