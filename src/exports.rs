//! Placeholder server modules.
//!
//! A module that only exists on the server is replaced in the client bundle by a
//! stub that exposes the same export names, each bound to `undefined`.

use crate::compile::source_type_for;
use crate::error::CompileError;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();

    static ref RESERVED_WORDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        for word in [
            "await", "break", "case", "catch", "class", "const", "continue", "debugger",
            "default", "delete", "do", "else", "enum", "export", "extends", "false",
            "finally", "for", "function", "if", "implements", "import", "in",
            "instanceof", "interface", "let", "new", "null", "package", "private",
            "protected", "public", "return", "static", "super", "switch", "this",
            "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
        ] {
            s.insert(word);
        }
        s
    };
}

/// Export names of `source` in declaration order, without duplicates.
pub fn detect_export_names(source: &str, filename: &str) -> Result<Vec<String>, CompileError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(filename)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let reason = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CompileError::ExportDetection {
            file: filename.to_string(),
            reason,
        });
    }

    let mut names = Vec::new();
    for stmt in &ret.program.body {
        match stmt {
            Statement::ExportNamedDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    continue;
                }
                if let Some(declaration) = &decl.declaration {
                    collect_declaration_names(declaration, &mut names);
                }
                for specifier in &decl.specifiers {
                    if !specifier.export_kind.is_type() {
                        names.push(module_export_name(&specifier.exported));
                    }
                }
            }
            Statement::ExportDefaultDeclaration(_) => names.push("default".to_string()),
            Statement::ExportAllDeclaration(all) => {
                if all.export_kind.is_type() {
                    continue;
                }
                match &all.exported {
                    Some(exported) => names.push(module_export_name(exported)),
                    None => {
                        return Err(CompileError::ExportDetection {
                            file: filename.to_string(),
                            reason: format!(
                                "`export * from \"{}\"` needs the exports of another module",
                                all.source.value
                            ),
                        })
                    }
                }
            }
            _ => {}
        }
    }

    let mut seen = HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    debug!("{} exports {:?}", filename, names);
    Ok(names)
}

fn module_export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn collect_declaration_names(declaration: &Declaration<'_>, names: &mut Vec<String>) {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                collect_pattern_names(&declarator.id, names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::TSEnumDeclaration(decl) => names.push(decl.id.name.to_string()),
        Declaration::TSModuleDeclaration(decl) => {
            if let TSModuleDeclarationName::Identifier(id) = &decl.id {
                if is_value_namespace(decl) {
                    names.push(id.name.to_string());
                }
            }
        }
        Declaration::TSImportEqualsDeclaration(decl) => {
            if !decl.import_kind.is_type() {
                names.push(decl.id.name.to_string());
            }
        }
        _ => {}
    }
}

/// A namespace only exists at runtime when it is not `declare`d and holds at
/// least one value.
fn is_value_namespace(decl: &TSModuleDeclaration<'_>) -> bool {
    if decl.declare {
        return false;
    }
    match &decl.body {
        Some(TSModuleDeclarationBody::TSModuleDeclaration(inner)) => is_value_namespace(inner),
        Some(TSModuleDeclarationBody::TSModuleBlock(block)) => {
            block.body.iter().any(is_value_statement)
        }
        None => false,
    }
}

fn is_value_statement(stmt: &Statement<'_>) -> bool {
    match stmt {
        Statement::TSTypeAliasDeclaration(_) | Statement::TSInterfaceDeclaration(_) => false,
        Statement::TSModuleDeclaration(inner) => is_value_namespace(inner),
        Statement::ExportNamedDeclaration(export) => match &export.declaration {
            Some(Declaration::TSTypeAliasDeclaration(_))
            | Some(Declaration::TSInterfaceDeclaration(_)) => false,
            Some(Declaration::TSModuleDeclaration(inner)) => is_value_namespace(inner),
            _ => !export.export_kind.is_type(),
        },
        _ => true,
    }
}

fn collect_pattern_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_pattern_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                collect_pattern_names(element, names);
            }
            if let Some(rest) = &arr.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_pattern_names(&assign.left, names),
    }
}

fn is_plain_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED_WORDS.contains(name)
}

/// Module text exporting every name in `names` with the value `undefined`.
pub fn build_placeholder_module(names: &[String]) -> String {
    if names.is_empty() {
        return "export {};\n".to_string();
    }

    let mut lines = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        if name == "default" {
            lines.push("export default undefined;".to_string());
        } else if is_plain_identifier(name) {
            lines.push(format!("export const {} = undefined;", name));
        } else {
            let local = format!("__bling_export_{}", index);
            let quoted = serde_json::to_string(name).unwrap_or_else(|_| format!("\"{}\"", name));
            lines.push(format!("const {} = undefined;", local));
            lines.push(format!("export {{ {} as {} }};", local, quoted));
        }
    }
    lines.join("\n") + "\n"
}

/// Placeholder for a server-only module, printed through the code generator.
pub fn compile_server_file(source: &str, filename: &str) -> Result<String, CompileError> {
    let names = detect_export_names(source, filename)?;
    let text = build_placeholder_module(&names);

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &text, SourceType::mjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(CompileError::Template {
            source_text: text.clone(),
            message: ret
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        });
    }
    Ok(Codegen::new().build(&ret.program).code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_export_names() {
        let source = r#"
            import { db } from "./db";
            export const { a, b: [c, ...d] } = load();
            export function handler() {}
            export class Store {}
            const local = 1;
            export { local as renamed, local as "kebab-name" };
            export * as helpers from "./helpers";
            export default db;
            export type Shape = { x: number };
            export { local };
            export { local as renamed };
        "#;
        let names = detect_export_names(source, "/app/server.ts").unwrap();
        assert_eq!(
            names,
            vec![
                "a", "c", "d", "handler", "Store", "renamed", "kebab-name", "helpers",
                "default", "local"
            ]
        );
    }

    #[test]
    fn test_namespaces_and_import_equals_are_exports() {
        let source = r#"
            export namespace NS { export const a = 1; }
            export namespace Nested.Inner { export function f() {} }
            export namespace Types { export interface Shape { x: number } }
            export declare namespace Ambient { const b: number; }
            export import Alias = NS.a;
            export const eval2 = 1;
        "#;
        let names = detect_export_names(source, "/app/server.ts").unwrap();
        assert_eq!(names, vec!["NS", "Nested", "Alias", "eval2"]);

        let code = compile_server_file(
            "export namespace NS { export const a = 1; } export const eval2 = 1;",
            "/app/server.ts",
        )
        .unwrap();
        assert!(code.contains("export const NS = undefined;"));
        assert!(code.contains("export const eval2 = undefined;"));
    }

    #[test]
    fn test_star_reexport_is_an_error() {
        let err = detect_export_names("export * from \"./other\";", "/app/a.js").unwrap_err();
        assert!(matches!(err, CompileError::ExportDetection { .. }));
        assert!(err.to_string().contains("./other"));
    }

    #[test]
    fn test_parse_failure_is_an_export_error() {
        let err = detect_export_names("export const = ;", "/app/a.js").unwrap_err();
        assert!(matches!(err, CompileError::ExportDetection { .. }));
    }

    #[test]
    fn test_build_placeholder_module() {
        let names = vec![
            "load".to_string(),
            "default".to_string(),
            "kebab-name".to_string(),
            "class".to_string(),
        ];
        let module = build_placeholder_module(&names);
        assert!(module.contains("export const load = undefined;"));
        assert!(module.contains("export default undefined;"));
        assert!(module.contains("export { __bling_export_2 as \"kebab-name\" };"));
        assert!(module.contains("export { __bling_export_3 as \"class\" };"));
        assert_eq!(build_placeholder_module(&[]), "export {};\n");
    }

    #[test]
    fn test_compile_server_file() {
        let code = compile_server_file(
            "import db from \"./db\";\nexport async function getUser(id) { return db.find(id); }\nexport default getUser;",
            "/app/user.server.js",
        )
        .unwrap();
        assert!(code.contains("export const getUser = undefined;"));
        assert!(code.contains("export default undefined;"));
        assert!(!code.contains("db"));
    }
}
