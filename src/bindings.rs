//! Binding resolution snapshots.
//!
//! `oxc_semantic` resolves every identifier use to its declaring symbol. A
//! snapshot records, for every binding identifier and identifier reference in the
//! program, whether the symbol behind it is referenced. The snapshot owns no AST
//! data so the program can be mutated right after it is taken.

use oxc_ast::ast::{BindingIdentifier, IdentifierReference, Program};
use oxc_ast::AstKind;
use oxc_ast_visit::Visit;
use oxc_semantic::{Semantic, SemanticBuilder};
use oxc_span::Span;
use oxc_syntax::symbol::SymbolId;
use std::collections::HashMap;
use tracing::trace;

/// Stable address of a binding across re-resolutions: the identifier's name and
/// the span of the identifier node. Nodes are moved, never re-created, by the
/// rewriter, so the span survives every pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub name: String,
    pub span: Span,
}

impl BindingKey {
    pub fn of_binding(ident: &BindingIdentifier<'_>) -> Self {
        BindingKey {
            name: ident.name.to_string(),
            span: ident.span,
        }
    }

    pub fn of_reference(ident: &IdentifierReference<'_>) -> Self {
        BindingKey {
            name: ident.name.to_string(),
            span: ident.span,
        }
    }
}

#[derive(Debug, Default)]
pub struct BindingSnapshot {
    referenced: HashMap<BindingKey, bool>,
}

impl BindingSnapshot {
    /// Rebuilds semantic information for the current state of `program`.
    pub fn resolve(program: &Program<'_>) -> Self {
        let ret = SemanticBuilder::new()
            .with_check_syntax_error(false)
            .build(program);
        if !ret.errors.is_empty() {
            trace!("semantic analysis reported {} errors", ret.errors.len());
        }

        let mut collector = SnapshotCollector {
            semantic: &ret.semantic,
            symbols: HashMap::new(),
            referenced: HashMap::new(),
        };
        collector.visit_program(program);

        BindingSnapshot {
            referenced: collector.referenced,
        }
    }

    /// Unknown keys count as referenced: nothing the snapshot can't see is pruned.
    pub fn is_referenced(&self, key: &BindingKey) -> bool {
        self.referenced.get(key).copied().unwrap_or(true)
    }
}

struct SnapshotCollector<'s> {
    semantic: &'s Semantic<'s>,
    symbols: HashMap<SymbolId, bool>,
    referenced: HashMap<BindingKey, bool>,
}

impl SnapshotCollector<'_> {
    fn symbol_referenced(&mut self, symbol_id: SymbolId) -> bool {
        if let Some(&cached) = self.symbols.get(&symbol_id) {
            return cached;
        }
        let referenced = self.compute_referenced(symbol_id);
        self.symbols.insert(symbol_id, referenced);
        referenced
    }

    // Generated code carries spans of its own template text, so two nodes can
    // share a key. Either one being referenced wins.
    fn record(&mut self, key: BindingKey, referenced: bool) {
        self.referenced
            .entry(key)
            .and_modify(|existing| *existing |= referenced)
            .or_insert(referenced);
    }

    fn compute_referenced(&self, symbol_id: SymbolId) -> bool {
        let used = self
            .semantic
            .symbol_references(symbol_id)
            .any(|reference| reference.is_read() || reference.is_type());
        if !used {
            return false;
        }

        // A function declaration only counts as referenced when some use lies
        // outside its own body; pure self-recursion does not keep it alive.
        let declaration = self.semantic.scoping().symbol_declaration(symbol_id);
        let nodes = self.semantic.nodes();
        match nodes.kind(declaration) {
            AstKind::Function(func) if func.is_declaration() => {
                self.semantic.symbol_references(symbol_id).any(|reference| {
                    !nodes
                        .ancestor_ids(reference.node_id())
                        .any(|ancestor| ancestor == declaration)
                })
            }
            _ => true,
        }
    }
}

impl<'a> Visit<'a> for SnapshotCollector<'_> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        if let Some(symbol_id) = ident.symbol_id.get() {
            let referenced = self.symbol_referenced(symbol_id);
            self.record(BindingKey::of_binding(ident), referenced);
        }
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let Some(reference_id) = ident.reference_id.get() else {
            return;
        };
        let symbol_id = self
            .semantic
            .scoping()
            .get_reference(reference_id)
            .symbol_id();
        // Unresolved globals have no binding that could keep them alive.
        let referenced = match symbol_id {
            Some(symbol_id) => self.symbol_referenced(symbol_id),
            None => false,
        };
        self.record(BindingKey::of_reference(ident), referenced);
    }
}
