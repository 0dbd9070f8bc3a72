//! Server function extraction.
//!
//! One mutable walk over the module does two jobs: it feeds every declaration it
//! passes to the [`ReferenceTracker`], and it rewrites each `serverFn$(fn, opts)`
//! call into a reference to a generated `$$server_module<n>` binding whose
//! declaration is spliced in before the enclosing top-level statement.

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::bindings::BindingSnapshot;
use crate::error::CompileError;
use crate::options::{BuildProfile, CompileOptions};
use crate::reference_tracker::{ReferenceSet, ReferenceTracker};
use crate::route_id::{relative_module_path, route_pathname, RouteHasher, FALLBACK_SUFFIX};
use crate::template;
use oxc_allocator::{Allocator, CloneIn};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::{
    walk_assignment_expression, walk_computed_member_expression, walk_expression, walk_function,
    walk_import_declaration, walk_object_property, walk_static_member_expression,
    walk_variable_declarator,
};
use oxc_ast_visit::VisitMut;
use oxc_span::SPAN;
use oxc_syntax::scope::ScopeFlags;
use serde::{Deserialize, Serialize};
use std::mem;
use tracing::debug;

/// Callee name of a marker call.
pub const MARKER: &str = "serverFn$";
/// Stands in for the marker object inside an extracted handler.
pub const CONTEXT_IDENT: &str = "$$ctx";
pub const HANDLER_PREFIX: &str = "$$serverHandler";
pub const MODULE_PREFIX: &str = "$$server_module";
/// Module specifier suffix for the server runtime.
pub const SERVER_ENTRY_SUFFIX: &str = "/server";

const SOURCE_PLACEHOLDER: &str = "__bling_source__";
const OPTIONS_PLACEHOLDER: &str = "__bling_options__";
const FETCH_OPTIONS_PLACEHOLDER: &str = "__bling_fetch_options__";

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-module state threaded through the walk.
#[derive(Debug, Clone)]
pub struct CompileState {
    pub ssr: bool,
    pub profile: BuildProfile,
    pub relative_path: String,
    pub hasher: RouteHasher,
    next_ordinal: u32,
}

impl CompileState {
    pub fn new(filename: &str, options: &CompileOptions) -> Self {
        Self {
            ssr: options.ssr,
            profile: options.profile,
            relative_path: relative_module_path(filename, &options.root),
            hasher: RouteHasher::from_minify(options.minify),
            next_ordinal: 0,
        }
    }

    pub fn next_ordinal(&mut self) -> u32 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    pub fn pathname(&self, ordinal: u32, suffix: &str) -> String {
        let route_id = self.hasher.route_id(&self.relative_path, ordinal);
        route_pathname(&route_id, suffix)
    }
}

/// A generated route, reported alongside the rewritten code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ServerRoute {
    pub ordinal: u32,
    pub pathname: String,
    /// Name of the generated `$$server_module<n>` binding.
    pub binding: String,
}

#[derive(Debug)]
pub struct Extraction {
    pub reference_set: ReferenceSet,
    pub routes: Vec<ServerRoute>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVER FN TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ServerFnTransform<'a> {
    allocator: &'a Allocator,
    ast: AstBuilder<'a>,
    state: CompileState,
    tracker: ReferenceTracker,
    /// Statements waiting to be spliced in before the current top-level statement.
    pending: Vec<Statement<'a>>,
    /// Route suffix candidates of the enclosing declarators, function declarations
    /// and object properties, innermost last.
    suffixes: Vec<Option<String>>,
    routes: Vec<ServerRoute>,
    error: Option<CompileError>,
}

impl<'a> ServerFnTransform<'a> {
    /// `snapshot` must describe the program before this transform touches it.
    pub fn new(allocator: &'a Allocator, state: CompileState, snapshot: BindingSnapshot) -> Self {
        Self {
            allocator,
            ast: AstBuilder::new(allocator),
            state,
            tracker: ReferenceTracker::new(snapshot),
            pending: Vec::new(),
            suffixes: Vec::new(),
            routes: Vec::new(),
            error: None,
        }
    }

    /// Routes come back in ordinal order. A nested call finishes, and is
    /// recorded, before the call that encloses it.
    pub fn finish(mut self) -> Result<Extraction, CompileError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.routes.sort_by_key(|route| route.ordinal);
        Ok(Extraction {
            reference_set: self.tracker.into_reference_set(),
            routes: self.routes,
        })
    }

    fn fail(&mut self, err: CompileError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn current_suffix(&self) -> String {
        self.suffixes
            .last()
            .cloned()
            .flatten()
            .unwrap_or_else(|| FALLBACK_SUFFIX.to_string())
    }

    fn identifier(&self, name: &str) -> Expression<'a> {
        let name: &'a str = self.allocator.alloc_str(name);
        self.ast.expression_identifier(SPAN, name)
    }

    fn extract(&mut self, call: &mut CallExpression<'a>) -> Result<Expression<'a>, CompileError> {
        let ordinal = self.state.next_ordinal();
        let pathname = self.state.pathname(ordinal, &self.current_suffix());
        let module_name = format!("{}{}", MODULE_PREFIX, ordinal);

        let mut handler = match call
            .arguments
            .first_mut()
            .and_then(|arg| arg.as_expression_mut())
        {
            Some(expr) => mem::replace(expr, self.identifier("undefined")),
            None => {
                return Err(CompileError::MissingHandler {
                    offset: call.span.start,
                })
            }
        };
        let mut options = match call
            .arguments
            .get_mut(1)
            .and_then(|arg| arg.as_expression_mut())
        {
            Some(expr) => mem::replace(expr, self.identifier("undefined")),
            None => self.identifier("undefined"),
        };

        // Nested marker calls get later ordinals; their statements are queued
        // ahead of this one.
        self.visit_expression(&mut handler);
        self.visit_expression(&mut options);
        if let Some(err) = self.error.take() {
            return Err(err);
        }

        ContextRewriter::new(self.ast).visit_expression(&mut handler);
        self.normalize_handler(&mut handler, ordinal)?;

        let statements = self.emit(&module_name, &pathname, handler, options)?;
        for stmt in statements.iter() {
            if let Statement::VariableDeclaration(decl) = stmt {
                for declarator in &decl.declarations {
                    if let BindingPattern::BindingIdentifier(id) = &declarator.id {
                        if id.name.as_str() == module_name {
                            self.tracker.insert_unchecked(id);
                        }
                    }
                }
            }
        }
        for stmt in statements {
            self.pending.push(stmt);
        }

        debug!(
            "extracted {} call #{} as {} -> {}",
            MARKER, ordinal, module_name, pathname
        );
        self.routes.push(ServerRoute {
            ordinal,
            pathname,
            binding: module_name.clone(),
        });
        Ok(self.identifier(&module_name))
    }

    /// Arrow handlers become `async function $$serverHandler<n>` expressions and
    /// every function handler captures its receiver as `$$ctx`.
    fn normalize_handler(
        &self,
        handler: &mut Expression<'a>,
        ordinal: u32,
    ) -> Result<(), CompileError> {
        if let Expression::ArrowFunctionExpression(arrow) = handler {
            if arrow.expression {
                arrow.expression = false;
                for stmt in arrow.body.statements.iter_mut() {
                    if let Statement::ExpressionStatement(expr_stmt) = stmt {
                        let span = expr_stmt.span;
                        let value = mem::replace(
                            &mut expr_stmt.expression,
                            self.identifier("undefined"),
                        );
                        *stmt = self.ast.statement_return(span, Some(value));
                    }
                }
            }

            let source = format!("async function {}{}() {{}}", HANDLER_PREFIX, ordinal);
            let mut func = template::expression(self.allocator, &source)?;
            if let Expression::FunctionExpression(func) = &mut func {
                mem::swap(&mut func.params, &mut arrow.params);
                if let Some(body) = &mut func.body {
                    mem::swap(body, &mut arrow.body);
                }
            }
            *handler = func;
        }

        if let Expression::FunctionExpression(func) = handler {
            if let Some(body) = &mut func.body {
                let mut statements = template::statements(
                    self.allocator,
                    &format!("const {} = this;", CONTEXT_IDENT),
                    Vec::new(),
                )?;
                let existing = mem::replace(&mut body.statements, self.ast.vec());
                for stmt in existing {
                    statements.push(stmt);
                }
                body.statements = statements;
            }
        }
        Ok(())
    }

    fn emit(
        &self,
        module_name: &str,
        pathname: &str,
        handler: Expression<'a>,
        options: Expression<'a>,
    ) -> Result<oxc_allocator::Vec<'a, Statement<'a>>, CompileError> {
        let path = serde_json::to_string(pathname).map_err(|e| CompileError::Template {
            source_text: pathname.to_string(),
            message: e.to_string(),
        })?;

        if self.state.ssr {
            let source = format!(
                "const {module} = {marker}.createHandler({src}, {path}, {opts});\n\
                 {marker}.registerHandler({path}, {module});",
                module = module_name,
                marker = MARKER,
                src = SOURCE_PLACEHOLDER,
                opts = OPTIONS_PLACEHOLDER,
                path = path,
            );
            return template::statements(
                self.allocator,
                &source,
                vec![(SOURCE_PLACEHOLDER, handler), (OPTIONS_PLACEHOLDER, options)],
            );
        }

        if self.state.profile.keeps_handlers() {
            let fetch_options = options.clone_in(self.allocator);
            let source = format!(
                "{marker}.registerHandler({path}, {marker}.createHandler({src}, {path}, {opts}));\n\
                 const {module} = {marker}.createFetcher({path}, {fetch_opts});",
                module = module_name,
                marker = MARKER,
                src = SOURCE_PLACEHOLDER,
                opts = OPTIONS_PLACEHOLDER,
                fetch_opts = FETCH_OPTIONS_PLACEHOLDER,
                path = path,
            );
            return template::statements(
                self.allocator,
                &source,
                vec![
                    (SOURCE_PLACEHOLDER, handler),
                    (OPTIONS_PLACEHOLDER, options),
                    (FETCH_OPTIONS_PLACEHOLDER, fetch_options),
                ],
            );
        }

        // The handler body never reaches the client build.
        let source = format!(
            "const {module} = {marker}.createFetcher({path}, {opts});",
            module = module_name,
            marker = MARKER,
            opts = OPTIONS_PLACEHOLDER,
            path = path,
        );
        template::statements(
            self.allocator,
            &source,
            vec![(OPTIONS_PLACEHOLDER, options)],
        )
    }
}

fn is_marker_callee(callee: &Expression<'_>) -> bool {
    matches!(callee, Expression::Identifier(ident) if ident.name == MARKER)
}

fn declarator_suffix(pattern: &BindingPattern<'_>) -> Option<String> {
    match pattern {
        BindingPattern::BindingIdentifier(id) => Some(id.name.to_string()),
        BindingPattern::ArrayPattern(arr) => match arr.elements.first() {
            Some(Some(BindingPattern::BindingIdentifier(id))) => Some(id.name.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn property_suffix(key: &PropertyKey<'_>) -> Option<String> {
    match key {
        PropertyKey::StaticIdentifier(id) => Some(id.name.to_string()),
        PropertyKey::Identifier(id) => Some(id.name.to_string()),
        _ => None,
    }
}

fn imports_marker(decl: &ImportDeclaration<'_>) -> bool {
    let Some(specifiers) = &decl.specifiers else {
        return false;
    };
    specifiers.iter().any(|specifier| match specifier {
        ImportDeclarationSpecifier::ImportSpecifier(s) => match &s.imported {
            ModuleExportName::IdentifierName(id) => id.name == MARKER,
            ModuleExportName::IdentifierReference(id) => id.name == MARKER,
            ModuleExportName::StringLiteral(lit) => lit.value == MARKER,
        },
        _ => false,
    })
}

impl<'a> VisitMut<'a> for ServerFnTransform<'a> {
    fn visit_program(&mut self, program: &mut Program<'a>) {
        let body = mem::replace(&mut program.body, self.ast.vec());
        let mut rewritten = self.ast.vec_with_capacity(body.len());
        for mut stmt in body {
            self.visit_statement(&mut stmt);
            for generated in self.pending.drain(..) {
                rewritten.push(generated);
            }
            rewritten.push(stmt);
        }
        program.body = rewritten;
    }

    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        if self.error.is_some() {
            return;
        }
        let extracted = match expr {
            Expression::CallExpression(call) if is_marker_callee(&call.callee) => {
                Some(self.extract(call))
            }
            _ => None,
        };
        match extracted {
            Some(Ok(replacement)) => *expr = replacement,
            Some(Err(err)) => self.fail(err),
            None => walk_expression(self, expr),
        }
    }

    fn visit_variable_declarator(&mut self, declarator: &mut VariableDeclarator<'a>) {
        if let Err(err) = self.tracker.track_declarator(declarator) {
            self.fail(err);
            return;
        }
        self.suffixes.push(declarator_suffix(&declarator.id));
        walk_variable_declarator(self, declarator);
        self.suffixes.pop();
    }

    fn visit_function(&mut self, func: &mut Function<'a>, flags: ScopeFlags) {
        self.tracker.track_function(func);
        let named_declaration = func.is_declaration();
        if named_declaration {
            self.suffixes
                .push(func.id.as_ref().map(|id| id.name.to_string()));
        }
        walk_function(self, func, flags);
        if named_declaration {
            self.suffixes.pop();
        }
    }

    fn visit_object_property(&mut self, prop: &mut ObjectProperty<'a>) {
        let is_value = prop.kind == PropertyKind::Init && !prop.method;
        if is_value {
            self.suffixes.push(property_suffix(&prop.key));
        }
        walk_object_property(self, prop);
        if is_value {
            self.suffixes.pop();
        }
    }

    fn visit_assignment_expression(&mut self, assignment: &mut AssignmentExpression<'a>) {
        self.tracker.track_assignment(assignment);
        walk_assignment_expression(self, assignment);
    }

    fn visit_import_declaration(&mut self, decl: &mut ImportDeclaration<'a>) {
        self.tracker.track_import(decl);
        if self.state.ssr && imports_marker(decl) {
            let source = format!("{}{}", decl.source.value, SERVER_ENTRY_SUFFIX);
            debug!("rewriting import {} -> {}", decl.source.value, source);
            decl.source.value = self.allocator.alloc_str(&source).into();
            decl.source.raw = None;
        }
        walk_import_declaration(self, decl);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT REWRITER
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites `serverFn$.x` and `serverFn$[x]` to `$$ctx.x` / `$$ctx[x]`.
struct ContextRewriter<'a> {
    ast: AstBuilder<'a>,
}

impl<'a> ContextRewriter<'a> {
    fn new(ast: AstBuilder<'a>) -> Self {
        Self { ast }
    }

    fn rewrite_object(&self, object: &mut Expression<'a>) {
        if matches!(object, Expression::Identifier(ident) if ident.name == MARKER) {
            *object = self.ast.expression_identifier(SPAN, CONTEXT_IDENT);
        }
    }
}

impl<'a> VisitMut<'a> for ContextRewriter<'a> {
    fn visit_static_member_expression(&mut self, expr: &mut StaticMemberExpression<'a>) {
        self.rewrite_object(&mut expr.object);
        walk_static_member_expression(self, expr);
    }

    fn visit_computed_member_expression(&mut self, expr: &mut ComputedMemberExpression<'a>) {
        self.rewrite_object(&mut expr.object);
        walk_computed_member_expression(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn run(source: &str, options: &CompileOptions) -> (String, Vec<ServerRoute>) {
        let allocator = Allocator::default();
        let mut program = Parser::new(&allocator, source, SourceType::mjs())
            .parse()
            .program;
        let snapshot = BindingSnapshot::resolve(&program);
        let state = CompileState::new("/app/routes/index.ts", options);
        let mut transform = ServerFnTransform::new(&allocator, state, snapshot);
        transform.visit_program(&mut program);
        let extraction = transform.finish().unwrap();
        (Codegen::new().build(&program).code, extraction.routes)
    }

    #[test]
    fn test_suffix_from_declarator() {
        let (code, routes) = run(
            "const greet = serverFn$(function (name) { return name; });",
            &CompileOptions::new(true, "/app"),
        );
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].pathname, "/_m/routes/index.ts/0/greet");
        assert!(code.contains("const greet = $$server_module0"));
    }

    #[test]
    fn test_suffix_fallbacks() {
        let (_, routes) = run(
            r#"
            const [first, second] = serverFn$(() => 1);
            function outer() { return serverFn$(() => 2); }
            const api = { load: serverFn$(() => 3) };
            serverFn$(() => 4);
            const { a } = serverFn$(() => 5);
            "#,
            &CompileOptions::new(true, "/app"),
        );
        let suffixes: Vec<&str> = routes
            .iter()
            .map(|r| r.pathname.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(suffixes, vec!["first", "outer", "load", "fn", "fn"]);
    }

    #[test]
    fn test_arrow_is_normalized_with_context() {
        let (code, _) = run(
            "const add = serverFn$((a, b) => serverFn$.request(a + b));",
            &CompileOptions::new(true, "/app"),
        );
        assert!(code.contains("async function $$serverHandler0(a, b)"));
        assert!(code.contains("const $$ctx = this;"));
        assert!(code.contains("return $$ctx.request(a + b);"));
        assert!(!code.contains("=>"));
    }

    #[test]
    fn test_computed_member_uses_context() {
        let (code, _) = run(
            "const f = serverFn$(function () { return serverFn$[\"request\"]; });",
            &CompileOptions::new(true, "/app"),
        );
        assert!(code.contains("$$ctx[\"request\"]"));
    }

    #[test]
    fn test_nested_markers_get_later_ordinals() {
        let (code, routes) = run(
            "const outer = serverFn$(function () { const inner = serverFn$(() => 1); return inner; });",
            &CompileOptions::new(true, "/app"),
        );
        assert_eq!(routes[0].ordinal, 0);
        assert_eq!(routes[0].binding, "$$server_module0");
        assert_eq!(routes[1].ordinal, 1);
        assert!(routes[1].pathname.ends_with("/1/inner"));
        let inner = code.find("const $$server_module1").unwrap();
        let outer = code.find("const $$server_module0").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn test_missing_handler_is_fatal() {
        let allocator = Allocator::default();
        let mut program = Parser::new(&allocator, "const f = serverFn$();", SourceType::mjs())
            .parse()
            .program;
        let snapshot = BindingSnapshot::resolve(&program);
        let state = CompileState::new("/app/a.ts", &CompileOptions::new(false, "/app"));
        let mut transform = ServerFnTransform::new(&allocator, state, snapshot);
        transform.visit_program(&mut program);
        assert!(matches!(
            transform.finish(),
            Err(CompileError::MissingHandler { offset: 10 })
        ));
    }

    #[test]
    fn test_member_callee_is_not_a_marker() {
        let (code, routes) = run(
            "const f = api.serverFn$(() => 1);",
            &CompileOptions::new(false, "/app"),
        );
        assert!(routes.is_empty());
        assert!(code.contains("api.serverFn$"));
    }
}
