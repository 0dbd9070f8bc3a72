//! Collects the bindings the dead-code sweep is allowed to remove.
//!
//! A binding enters the set only when it is referenced at the moment it is
//! visited. Anything the tracker never saw is left alone by the sweep, however
//! unreferenced it becomes later.

use crate::bindings::{BindingKey, BindingSnapshot};
use crate::error::CompileError;
use oxc_ast::ast::{
    AssignmentExpression, AssignmentTarget, BindingIdentifier, BindingPattern, Expression,
    Function, ImportDeclaration, ImportDeclarationSpecifier, VariableDeclarator,
};
use oxc_span::GetSpan;
use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
pub struct ReferenceSet {
    keys: HashSet<BindingKey>,
}

impl ReferenceSet {
    pub fn insert(&mut self, key: BindingKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &BindingKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub struct ReferenceTracker {
    snapshot: BindingSnapshot,
    set: ReferenceSet,
}

impl ReferenceTracker {
    /// `snapshot` must be taken before the tree is rewritten.
    pub fn new(snapshot: BindingSnapshot) -> Self {
        Self {
            snapshot,
            set: ReferenceSet::default(),
        }
    }

    pub fn into_reference_set(self) -> ReferenceSet {
        self.set
    }

    /// Adds a binding without the referenced test. Used for generated bindings
    /// that are referenced by construction.
    pub fn insert_unchecked(&mut self, ident: &BindingIdentifier<'_>) {
        self.set.insert(BindingKey::of_binding(ident));
    }

    fn track(&mut self, key: BindingKey) {
        if self.snapshot.is_referenced(&key) {
            self.set.insert(key);
        }
    }

    pub fn track_declarator(
        &mut self,
        declarator: &VariableDeclarator<'_>,
    ) -> Result<(), CompileError> {
        for leaf in pattern_leaves(&declarator.id)? {
            self.track(BindingKey::of_binding(leaf));
        }
        Ok(())
    }

    pub fn track_function(&mut self, func: &Function<'_>) {
        if !func.is_declaration() {
            return;
        }
        if let Some(id) = &func.id {
            self.track(BindingKey::of_binding(id));
        }
    }

    /// `x = function () {}` and `x = () => {}` where `x` is a plain identifier.
    pub fn track_assignment(&mut self, assignment: &AssignmentExpression<'_>) {
        if let Some(key) = function_assignment_key(assignment) {
            self.track(key);
        }
    }

    pub fn track_import(&mut self, decl: &ImportDeclaration<'_>) {
        let Some(specifiers) = &decl.specifiers else {
            return;
        };
        for specifier in specifiers {
            self.track(BindingKey::of_binding(import_local(specifier)));
        }
    }
}

pub(crate) fn import_local<'b, 'a>(
    specifier: &'b ImportDeclarationSpecifier<'a>,
) -> &'b BindingIdentifier<'a> {
    match specifier {
        ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
    }
}

/// Key of `x` in `x = function () {}` / `x = () => {}`.
pub(crate) fn function_assignment_key(assignment: &AssignmentExpression<'_>) -> Option<BindingKey> {
    let AssignmentTarget::AssignmentTargetIdentifier(target) = &assignment.left else {
        return None;
    };
    match &assignment.right {
        Expression::FunctionExpression(_) | Expression::ArrowFunctionExpression(_) => {
            Some(BindingKey::of_reference(target))
        }
        _ => None,
    }
}

/// Plain identifiers bound directly by a declarator id.
///
/// Object and array patterns contribute the properties, elements and rest
/// arguments that are bare identifiers; nested or defaulted leaves bind nothing
/// at this level. A top-level assignment pattern is not a declarator shape.
pub fn pattern_leaves<'b, 'a>(
    pattern: &'b BindingPattern<'a>,
) -> Result<Vec<&'b BindingIdentifier<'a>>, CompileError> {
    let mut leaves = Vec::new();
    match pattern {
        BindingPattern::BindingIdentifier(id) => leaves.push(id.as_ref()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                if let BindingPattern::BindingIdentifier(id) = &prop.value {
                    leaves.push(id.as_ref());
                }
            }
            if let Some(rest) = &obj.rest {
                if let BindingPattern::BindingIdentifier(id) = &rest.argument {
                    leaves.push(id.as_ref());
                }
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                if let BindingPattern::BindingIdentifier(id) = element {
                    leaves.push(id.as_ref());
                }
            }
            if let Some(rest) = &arr.rest {
                if let BindingPattern::BindingIdentifier(id) = &rest.argument {
                    leaves.push(id.as_ref());
                }
            }
        }
        BindingPattern::AssignmentPattern(assign) => {
            return Err(CompileError::UnsupportedPatternShape {
                shape: "AssignmentPattern",
                offset: assign.span().start,
            });
        }
    }
    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_ast::ast::Statement;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn leaf_names(source: &str) -> Vec<String> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        let Statement::VariableDeclaration(decl) = &ret.program.body[0] else {
            panic!("expected a variable declaration");
        };
        pattern_leaves(&decl.declarations[0].id)
            .unwrap()
            .iter()
            .map(|id| id.name.to_string())
            .collect()
    }

    #[test]
    fn test_object_pattern_leaves() {
        assert_eq!(
            leaf_names("const { a, b: renamed, c = 1, d: { e }, ...rest } = f();"),
            vec!["a", "renamed", "rest"]
        );
    }

    #[test]
    fn test_array_pattern_leaves_skip_holes() {
        assert_eq!(
            leaf_names("const [first, , [nested], fourth = 2, ...others] = f();"),
            vec!["first", "others"]
        );
    }

    #[test]
    fn test_assignment_pattern_is_unsupported() {
        let allocator = Allocator::default();
        let source = "const { a: b = 1 } = f();";
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        let Statement::VariableDeclaration(decl) = &ret.program.body[0] else {
            panic!("expected a variable declaration");
        };
        let BindingPattern::ObjectPattern(obj) = &decl.declarations[0].id else {
            panic!("expected an object pattern");
        };
        let err = pattern_leaves(&obj.properties[0].value).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedPatternShape {
                shape: "AssignmentPattern",
                ..
            }
        ));
    }

    #[test]
    fn test_tracker_only_admits_referenced_bindings() {
        let source = "const used = 1; const unused = 2; console.log(used);";
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
        let mut tracker = ReferenceTracker::new(BindingSnapshot::resolve(&ret.program));
        for stmt in &ret.program.body {
            if let Statement::VariableDeclaration(decl) = stmt {
                for declarator in &decl.declarations {
                    tracker.track_declarator(declarator).unwrap();
                }
            }
        }
        let set = tracker.into_reference_set();
        assert_eq!(set.len(), 1);
    }
}
