//! Module-level entry points.
//!
//! `transform_server_fn` parses one module, runs the extraction walk and the
//! dead-code sweep over it, and prints the result. Each call owns its arena, so
//! modules can be compiled on any number of threads.

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::bindings::BindingSnapshot;
use crate::error::CompileError;
use crate::extract::{CompileState, ServerFnTransform, ServerRoute, MARKER};
use crate::options::CompileOptions;
use crate::sweep::{DeadCodeSweeper, SweepStats};
use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub code: String,
    pub routes: Vec<ServerRoute>,
}

/// What a transform did to a parsed program.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub routes: Vec<ServerRoute>,
    pub sweep: SweepStats,
}

/// Runs extraction and the sweep on an already parsed program.
///
/// On error the program is left half rewritten and must be discarded.
pub fn transform_program<'a>(
    allocator: &'a Allocator,
    program: &mut Program<'a>,
    filename: &str,
    options: &CompileOptions,
) -> Result<TransformOutput, CompileError> {
    let snapshot = BindingSnapshot::resolve(program);
    let state = CompileState::new(filename, options);

    let mut transform = ServerFnTransform::new(allocator, state, snapshot);
    transform.visit_program(program);
    let extraction = transform.finish()?;
    debug!(
        "{}: {} routes, {} bindings tracked",
        filename,
        extraction.routes.len(),
        extraction.reference_set.len()
    );

    let sweep = DeadCodeSweeper::new(&extraction.reference_set, options.ssr).sweep(program)?;
    Ok(TransformOutput {
        routes: extraction.routes,
        sweep,
    })
}

pub fn transform_server_fn(
    source: &str,
    filename: &str,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    if !source.contains(MARKER) {
        trace!("{} has no {} calls", filename, MARKER);
        return Ok(CompileResult {
            code: source.to_string(),
            routes: Vec::new(),
        });
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(filename)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CompileError::Parse {
            file: filename.to_string(),
            message,
        });
    }

    let mut program = ret.program;
    let output = transform_program(&allocator, &mut program, filename, options)?;
    let code = Codegen::new().build(&program).code;

    info!(
        "compiled {} ({} build): {} server functions, {} declarations swept in {} passes",
        filename,
        if options.ssr { "server" } else { "client" },
        output.routes.len(),
        output.sweep.removed,
        output.sweep.iterations
    );

    Ok(CompileResult {
        code,
        routes: output.routes,
    })
}

/// Bundler-plugin entry point: options come from the process environment.
pub fn compile_server_fn(source: &str, id: &str, ssr: bool) -> Result<CompileResult, CompileError> {
    let options = CompileOptions::from_env(ssr).unwrap_or_else(|err| {
        warn!("cannot read the working directory ({}), using absolute ids", err);
        CompileOptions::new(ssr, "")
    });
    transform_server_fn(source, id, &options)
}

/// Source type from the module id's extension, ignoring bundler query suffixes.
pub(crate) fn source_type_for(filename: &str) -> SourceType {
    let path = filename.split(['?', '#']).next().unwrap_or(filename);
    SourceType::from_path(Path::new(path)).unwrap_or_else(|_| {
        SourceType::default()
            .with_typescript(true)
            .with_module(true)
            .with_jsx(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_for() {
        assert!(source_type_for("/app/a.ts").is_typescript());
        assert!(source_type_for("/app/a.tsx?v=123").is_jsx());
        assert!(source_type_for("/app/a.mjs").is_module());
        assert!(source_type_for("virtual:module").is_typescript());
    }

    #[test]
    fn test_module_without_marker_is_untouched() {
        let source = "const   spaced = 1;";
        let result =
            transform_server_fn(source, "/app/a.js", &CompileOptions::new(false, "/app")).unwrap();
        assert_eq!(result.code, source);
        assert!(result.routes.is_empty());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = transform_server_fn(
            "const f = serverFn$(function ( {",
            "/app/a.js",
            &CompileOptions::new(false, "/app"),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Parse { ref file, .. } if file == "/app/a.js"));
    }
}
