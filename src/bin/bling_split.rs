use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bling_compiler_native::cache::CompileCache;
use bling_compiler_native::discovery::{contains_marker, find_source_files};
use bling_compiler_native::{
    transform_server_fn, BuildProfile, CompileOptions, CompileResult, Diagnostic, ServerRoute,
};
use clap::Parser;
use rayon::prelude::*;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Split modules with `serverFn$` calls into client and server builds.
#[derive(Parser)]
#[command(name = "bling-split", version)]
struct Cli {
    /// Source file or directory.
    input: PathBuf,
    #[arg(short, long, default_value = "dist")]
    out_dir: PathBuf,
    /// Directory route ids are relative to. Defaults to the current directory.
    #[arg(long)]
    root: Option<PathBuf>,
    /// Hash route ids.
    #[arg(long)]
    minify: bool,
    /// Keep handlers callable in the client build.
    #[arg(long)]
    test_client: bool,
    #[arg(long)]
    no_cache: bool,
}

struct SplitModule {
    relative: String,
    client: String,
    server: String,
    routes: Vec<ServerRoute>,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("cannot read the current directory")?
            .join(path))
    }
}

fn compile_cached(
    cache: Option<&CompileCache>,
    source: &str,
    filename: &str,
    options: &CompileOptions,
) -> Result<CompileResult> {
    if let Some(hit) = cache.and_then(|c| c.get(filename, source, options)) {
        return Ok(hit);
    }
    let result = transform_server_fn(source, filename, options).map_err(|e| {
        let diagnostic = Diagnostic::new(&e, Some(filename));
        anyhow::anyhow!("[{}] {}\n  {}", diagnostic.code, diagnostic.message, diagnostic.guarantee)
    })?;
    if let Some(cache) = cache {
        cache.set(filename, source, options, &result);
    }
    Ok(result)
}

fn split_file(
    path: &Path,
    root: &Path,
    client_options: &CompileOptions,
    server_options: &CompileOptions,
    cache: Option<&CompileCache>,
) -> Result<SplitModule> {
    let source =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    if !contains_marker(&source) {
        debug!("copying {}", relative);
        return Ok(SplitModule {
            relative,
            client: source.clone(),
            server: source,
            routes: Vec::new(),
        });
    }

    let filename = path.to_string_lossy();
    let client = compile_cached(cache, &source, &filename, client_options)
        .with_context(|| format!("client build of {}", relative))?;
    let server = compile_cached(cache, &source, &filename, server_options)
        .with_context(|| format!("server build of {}", relative))?;

    Ok(SplitModule {
        relative,
        client: client.code,
        server: server.code,
        routes: server.routes,
    })
}

fn write_output(out_dir: &Path, build: &str, relative: &str, code: &str) -> Result<()> {
    let target = out_dir.join(build).join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    fs::write(&target, code).with_context(|| format!("cannot write {}", target.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bling=info")),
        )
        .without_time()
        .init();

    let cli = Cli::parse();
    let root = match &cli.root {
        Some(root) => absolute(root)?,
        None => absolute(Path::new("."))?,
    };
    let input = absolute(&cli.input)?;
    let out_dir = absolute(&cli.out_dir)?;

    let profile = if cli.test_client {
        BuildProfile::TestClient
    } else {
        BuildProfile::Client
    };
    let root_str = root.to_string_lossy().to_string();
    let client_options = CompileOptions::new(false, root_str.clone())
        .with_minify(cli.minify)
        .with_profile(profile);
    let server_options = CompileOptions::new(true, root_str)
        .with_minify(cli.minify)
        .with_profile(profile);

    let cache = if cli.no_cache {
        None
    } else {
        Some(CompileCache::in_root(&root).context("cannot create the compile cache")?)
    };

    let files = find_source_files(&input);
    info!("splitting {} modules from {}", files.len(), input.display());

    let modules: Vec<SplitModule> = files
        .par_iter()
        .map(|path| split_file(path, &root, &client_options, &server_options, cache.as_ref()))
        .collect::<Result<_>>()
        .map_err(|e| {
            error!("{:#}", e);
            e
        })?;

    let mut manifest: BTreeMap<String, Vec<ServerRoute>> = BTreeMap::new();
    for module in &modules {
        write_output(&out_dir, "client", &module.relative, &module.client)?;
        write_output(&out_dir, "server", &module.relative, &module.server)?;
        if !module.routes.is_empty() {
            manifest.insert(module.relative.clone(), module.routes.clone());
        }
    }

    let manifest_path = out_dir.join("routes.json");
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("cannot create {}", out_dir.display()))?;
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("cannot write {}", manifest_path.display()))?;

    let route_count: usize = manifest.values().map(Vec::len).sum();
    info!(
        "wrote {} modules and {} routes to {}",
        modules.len(),
        route_count,
        out_dir.display()
    );
    Ok(())
}
