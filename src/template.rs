//! Code templates instantiated into the module's own arena.
//!
//! A template is plain JavaScript text. Identifiers named like `__bling_source__`
//! are placeholders: each is replaced, exactly once, by an expression the caller
//! built in the same allocator.

use crate::error::CompileError;
use oxc_allocator::{Allocator, Vec as ArenaVec};
use oxc_ast::ast::{Expression, Statement};
use oxc_ast_visit::walk_mut;
use oxc_ast_visit::VisitMut;
use oxc_parser::Parser;
use oxc_span::SourceType;

pub type Substitutions<'a> = Vec<(&'static str, Expression<'a>)>;

/// Parses `source` as module statements and fills in `substitutions`.
pub fn statements<'a>(
    allocator: &'a Allocator,
    source: &str,
    substitutions: Substitutions<'a>,
) -> Result<ArenaVec<'a, Statement<'a>>, CompileError> {
    let text = allocator.alloc_str(source);
    let ret = Parser::new(allocator, text, SourceType::mjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(template_error(
            source,
            ret.errors.iter().map(|e| e.to_string()).collect(),
        ));
    }

    let mut program = ret.program;
    let mut filler = PlaceholderFiller::new(substitutions);
    filler.visit_program(&mut program);
    filler.finish(source)?;
    Ok(program.body)
}

/// Parses `source` as a single expression. No placeholders.
pub fn expression<'a>(
    allocator: &'a Allocator,
    source: &str,
) -> Result<Expression<'a>, CompileError> {
    let text = allocator.alloc_str(source);
    Parser::new(allocator, text, SourceType::mjs())
        .parse_expression()
        .map_err(|errors| {
            template_error(source, errors.iter().map(|e| e.to_string()).collect())
        })
}

fn template_error(source: &str, messages: Vec<String>) -> CompileError {
    CompileError::Template {
        source_text: source.to_string(),
        message: messages.join("; "),
    }
}

struct PlaceholderFiller<'a> {
    slots: Vec<(&'static str, Option<Expression<'a>>)>,
    reused: Option<&'static str>,
}

impl<'a> PlaceholderFiller<'a> {
    fn new(substitutions: Substitutions<'a>) -> Self {
        Self {
            slots: substitutions
                .into_iter()
                .map(|(name, expr)| (name, Some(expr)))
                .collect(),
            reused: None,
        }
    }

    fn finish(self, source: &str) -> Result<(), CompileError> {
        if let Some(name) = self.reused {
            return Err(template_error(
                source,
                vec![format!("placeholder `{}` used more than once", name)],
            ));
        }
        let unused: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, expr)| expr.is_some())
            .map(|(name, _)| format!("placeholder `{}` not found", name))
            .collect();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(template_error(source, unused))
        }
    }
}

impl<'a> VisitMut<'a> for PlaceholderFiller<'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        let name = match expr {
            Expression::Identifier(ident) => Some(ident.name),
            _ => None,
        };
        if let Some(name) = name {
            if let Some((placeholder, slot)) = self
                .slots
                .iter_mut()
                .find(|(placeholder, _)| name.as_str() == *placeholder)
            {
                match slot.take() {
                    Some(replacement) => *expr = replacement,
                    None => self.reused = Some(*placeholder),
                }
                return;
            }
        }
        walk_mut::walk_expression(self, expr);
    }
}
