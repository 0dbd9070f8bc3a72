//! # Bling server function compiler
//!
//! Splits a module that marks functions with `serverFn$(fn, options)` into a
//! client build and a server build.
//!
//! ## Pipeline
//!
//! 1. **Resolve**: `oxc_semantic` binds every identifier use to its declaration
//!    ([`bindings`]).
//! 2. **Extract**: one mutable walk records removable declarations
//!    ([`reference_tracker`]) and rewrites every marker call ([`extract`]):
//!    - server build: `const $$server_module<n> = serverFn$.createHandler(fn, "<path>", opts)`
//!      followed by `serverFn$.registerHandler("<path>", $$server_module<n>)`;
//!    - client build: `const $$server_module<n> = serverFn$.createFetcher("<path>", opts)`.
//! 3. **Sweep**: declarations that only served a removed handler are deleted until
//!    a pass removes nothing ([`sweep`]).
//!
//! ## Route pathnames
//!
//! `/_m/<route id>/<name>` where the route id is `<module path>/<ordinal>`, or its
//! digest when minifying ([`route_id`]). Both builds number calls identically, so
//! a client fetcher and its server handler always agree on the pathname.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod bindings;
pub mod cache;
pub mod compile;
pub mod discovery;
pub mod error;
pub mod exports;
pub mod extract;
pub mod options;
pub mod reference_tracker;
pub mod route_id;
pub mod sweep;
pub mod template;

#[cfg(test)]
mod sweep_tests;

pub use compile::{compile_server_fn, transform_program, transform_server_fn, CompileResult};
pub use error::{CompileError, Diagnostic};
pub use exports::{build_placeholder_module, compile_server_file, detect_export_names};
pub use extract::ServerRoute;
pub use options::{BuildProfile, CompileOptions};

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi_error(error: &CompileError, file: &str) -> napi::Error {
    let diagnostic = Diagnostic::new(error, Some(file));
    napi::Error::from_reason(
        serde_json::to_string(&diagnostic).unwrap_or_else(|_| error.to_string()),
    )
}

/// `options_json` is a serialized [`CompileOptions`]; when absent the plugin
/// defaults are read from the environment.
#[cfg(feature = "napi")]
#[napi]
pub fn transform_server_fn_native(
    source: String,
    filename: String,
    ssr: bool,
    options_json: Option<String>,
) -> napi::Result<CompileResult> {
    let result = match options_json {
        Some(json) => {
            let options: CompileOptions = serde_json::from_str(&json)
                .map_err(|e| napi::Error::from_reason(format!("invalid options: {}", e)))?;
            transform_server_fn(&source, &filename, &CompileOptions { ssr, ..options })
        }
        None => compile_server_fn(&source, &filename, ssr),
    };
    result.map_err(|e| to_napi_error(&e, &filename))
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_server_file_native(source: String, filename: String) -> napi::Result<String> {
    compile_server_file(&source, &filename).map_err(|e| to_napi_error(&e, &filename))
}
