//! Fixed-point dead-code sweep.
//!
//! After extraction, code that only served a removed handler is unreferenced.
//! Each pass re-resolves bindings on the current tree and drops statement-level
//! declarations from the [`ReferenceSet`] that lost all their uses. Removing one
//! declaration can orphan another, so passes repeat until one removes nothing.

use crate::bindings::{BindingKey, BindingSnapshot};
use crate::error::CompileError;
use crate::reference_tracker::{function_assignment_key, import_local, ReferenceSet};
use oxc_allocator::Vec as ArenaVec;
use oxc_ast::ast::*;
use oxc_ast_visit::walk_mut::walk_statements;
use oxc_ast_visit::VisitMut;
use oxc_span::GetSpan;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Passes run, including the final one that removed nothing.
    pub iterations: u32,
    pub removed: usize,
}

pub struct DeadCodeSweeper<'r> {
    refs: &'r ReferenceSet,
    ssr: bool,
}

impl<'r> DeadCodeSweeper<'r> {
    pub fn new(refs: &'r ReferenceSet, ssr: bool) -> Self {
        Self { refs, ssr }
    }

    pub fn sweep(&self, program: &mut Program<'_>) -> Result<SweepStats, CompileError> {
        let mut stats = SweepStats::default();
        loop {
            let snapshot = BindingSnapshot::resolve(program);
            let mut pass = SweepPass {
                refs: self.refs,
                snapshot: &snapshot,
                ssr: self.ssr,
                removed: 0,
                error: None,
            };
            pass.visit_program(program);
            if let Some(err) = pass.error {
                return Err(err);
            }

            stats.iterations += 1;
            stats.removed += pass.removed;
            debug!(
                "sweep pass {} removed {} declarations",
                stats.iterations, pass.removed
            );
            if pass.removed == 0 {
                return Ok(stats);
            }
        }
    }
}

/// One removal pass over every statement list. Named function expressions
/// outside a declarator, function assignments nested inside larger
/// expressions, and declarations in `for` heads are never removed.
struct SweepPass<'s> {
    refs: &'s ReferenceSet,
    snapshot: &'s BindingSnapshot,
    ssr: bool,
    removed: usize,
    error: Option<CompileError>,
}

impl SweepPass<'_> {
    /// Only bindings the tracker admitted may go, and only once nothing uses them.
    fn is_dead(&self, key: &BindingKey) -> bool {
        self.refs.contains(key) && !self.snapshot.is_referenced(key)
    }

    fn is_dead_binding(&self, pattern: &BindingPattern<'_>) -> bool {
        match pattern {
            BindingPattern::BindingIdentifier(id) => self.is_dead(&BindingKey::of_binding(id)),
            _ => false,
        }
    }

    /// Returns whether `stmt` stays in its statement list.
    fn sweep_statement(&mut self, stmt: &mut Statement<'_>) -> Result<bool, CompileError> {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                if decl.declarations.is_empty() {
                    return Ok(true);
                }
                let mut keep = Vec::with_capacity(decl.declarations.len());
                for declarator in decl.declarations.iter_mut() {
                    keep.push(self.sweep_declarator(declarator)?);
                }
                let mut flags = keep.into_iter();
                decl.declarations.retain(|_| flags.next().unwrap_or(true));
                Ok(!decl.declarations.is_empty())
            }
            Statement::FunctionDeclaration(func) => {
                let dead = func
                    .id
                    .as_ref()
                    .is_some_and(|id| self.is_dead(&BindingKey::of_binding(id)));
                if dead {
                    trace!("removing function declaration at {}", func.span.start);
                    self.removed += 1;
                }
                Ok(!dead)
            }
            Statement::ExpressionStatement(expr_stmt) => {
                let dead = match &expr_stmt.expression {
                    Expression::AssignmentExpression(assignment) => {
                        function_assignment_key(assignment).is_some_and(|key| self.is_dead(&key))
                    }
                    _ => false,
                };
                if dead {
                    self.removed += 1;
                }
                Ok(!dead)
            }
            Statement::ImportDeclaration(import) => Ok(self.sweep_import(import)),
            _ => Ok(true),
        }
    }

    /// Returns whether the declarator survives.
    fn sweep_declarator(
        &mut self,
        declarator: &mut VariableDeclarator<'_>,
    ) -> Result<bool, CompileError> {
        let before = self.removed;
        match &mut declarator.id {
            BindingPattern::BindingIdentifier(id) => {
                if self.is_dead(&BindingKey::of_binding(id)) {
                    trace!("removing declarator `{}`", id.name);
                    self.removed += 1;
                    return Ok(false);
                }
                Ok(true)
            }
            BindingPattern::ObjectPattern(obj) => {
                let keep: Vec<bool> = obj
                    .properties
                    .iter()
                    .map(|prop| !self.is_dead_binding(&prop.value))
                    .collect();
                self.removed += keep.iter().filter(|kept| !**kept).count();
                let mut flags = keep.into_iter();
                obj.properties.retain(|_| flags.next().unwrap_or(true));

                let rest_dead = obj
                    .rest
                    .as_ref()
                    .is_some_and(|rest| self.is_dead_binding(&rest.argument));
                if rest_dead {
                    obj.rest = None;
                    self.removed += 1;
                }

                let emptied = obj.properties.is_empty() && obj.rest.is_none();
                Ok(!(self.removed != before && emptied))
            }
            BindingPattern::ArrayPattern(arr) => {
                // Dead elements become holes so later positions keep their index.
                for element in arr.elements.iter_mut() {
                    let dead = element
                        .as_ref()
                        .is_some_and(|pattern| self.is_dead_binding(pattern));
                    if dead {
                        *element = None;
                        self.removed += 1;
                    }
                }
                let rest_dead = arr
                    .rest
                    .as_ref()
                    .is_some_and(|rest| self.is_dead_binding(&rest.argument));
                if rest_dead {
                    arr.rest = None;
                    self.removed += 1;
                }
                if arr.rest.is_none() {
                    while matches!(arr.elements.last(), Some(None)) {
                        arr.elements.pop();
                    }
                }

                let emptied = arr.elements.is_empty() && arr.rest.is_none();
                Ok(!(self.removed != before && emptied))
            }
            BindingPattern::AssignmentPattern(assign) => Err(CompileError::UnsupportedPatternShape {
                shape: "AssignmentPattern",
                offset: assign.span().start,
            }),
        }
    }

    /// Returns whether the import declaration stays.
    fn sweep_import(&mut self, import: &mut ImportDeclaration<'_>) -> bool {
        let Some(specifiers) = &mut import.specifiers else {
            return true;
        };
        if specifiers.is_empty() {
            return true;
        }

        let keep: Vec<bool> = specifiers
            .iter()
            .map(|specifier| !self.is_dead(&BindingKey::of_binding(import_local(specifier))))
            .collect();
        let dropped = keep.iter().filter(|kept| !**kept).count();
        if dropped == 0 {
            return true;
        }
        self.removed += dropped;
        let mut flags = keep.into_iter();
        specifiers.retain(|_| flags.next().unwrap_or(true));

        if !specifiers.is_empty() {
            return true;
        }
        // The server build keeps the module's side effects.
        if self.ssr {
            import.specifiers = None;
            true
        } else {
            false
        }
    }
}

impl<'a> VisitMut<'a> for SweepPass<'_> {
    fn visit_statements(&mut self, stmts: &mut ArenaVec<'a, Statement<'a>>) {
        walk_statements(self, stmts);
        if self.error.is_some() {
            return;
        }

        let mut keep = Vec::with_capacity(stmts.len());
        for stmt in stmts.iter_mut() {
            match self.sweep_statement(stmt) {
                Ok(kept) => keep.push(kept),
                Err(err) => {
                    self.error = Some(err);
                    return;
                }
            }
        }
        let mut flags = keep.into_iter();
        stmts.retain(|_| flags.next().unwrap_or(true));
    }
}
