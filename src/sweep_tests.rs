//! Fixed-point and allow-list properties of the dead-code sweep, run on the
//! output of the real extraction walk.

#[cfg(test)]
mod tests {
    use crate::bindings::BindingSnapshot;
    use crate::extract::{CompileState, ServerFnTransform};
    use crate::options::CompileOptions;
    use crate::reference_tracker::ReferenceSet;
    use crate::sweep::{DeadCodeSweeper, SweepStats};
    use oxc_allocator::Allocator;
    use oxc_ast_visit::VisitMut;
    use oxc_codegen::Codegen;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    struct Swept {
        code: String,
        first: SweepStats,
        second: SweepStats,
        refs: ReferenceSet,
    }

    /// Extracts, sweeps, then sweeps the result again with the same set.
    fn sweep_twice(source: &str, ssr: bool) -> Swept {
        let allocator = Allocator::default();
        let mut program = Parser::new(&allocator, source, SourceType::mjs())
            .parse()
            .program;
        let options = CompileOptions::new(ssr, "/app");
        let state = CompileState::new("/app/page.js", &options);
        let mut transform =
            ServerFnTransform::new(&allocator, state, BindingSnapshot::resolve(&program));
        transform.visit_program(&mut program);
        let refs = transform.finish().unwrap().reference_set;

        let sweeper = DeadCodeSweeper::new(&refs, ssr);
        let first = sweeper.sweep(&mut program).unwrap();
        let second = sweeper.sweep(&mut program).unwrap();
        Swept {
            code: Codegen::new().build(&program).code,
            first,
            second,
            refs,
        }
    }

    const CHAINED: &str = r#"
        import { serverFn$ } from "@tanstack/bling";
        import { readFile } from "node:fs/promises";
        const [config, , extra] = await readFile("config.json");
        function parse(text) { return JSON.parse(text); }
        function load() { return parse(config) ?? extra; }
        export const settings = serverFn$(async () => load());
    "#;

    #[test]
    fn test_second_sweep_removes_nothing() {
        let swept = sweep_twice(CHAINED, false);
        assert!(swept.first.removed > 0);
        assert!(swept.first.iterations > 1);
        assert_eq!(swept.second.removed, 0);
        assert_eq!(swept.second.iterations, 1);
    }

    #[test]
    fn test_chain_is_fully_removed_on_the_client() {
        let swept = sweep_twice(CHAINED, false);
        for gone in ["readFile", "config", "extra", "parse", "load"] {
            assert!(!swept.code.contains(gone), "{} survived:\n{}", gone, swept.code);
        }
        assert!(swept.code.contains("export const settings = $$server_module0;"));
    }

    #[test]
    fn test_server_keeps_the_chain() {
        let swept = sweep_twice(CHAINED, true);
        assert_eq!(swept.first.removed, 0);
        assert!(swept.code.contains("function load()"));
        assert!(swept.code.contains("import { readFile } from \"node:fs/promises\";"));
    }

    #[test]
    fn test_only_tracked_bindings_are_removed() {
        let source = r#"
            const dormant = 1;
            let writtenOnly;
            writtenOnly = 2;
            function helper() { return 1; }
            export const x = serverFn$(() => helper());
        "#;
        let swept = sweep_twice(source, false);
        // helper, plus the generated module binding that stays referenced.
        assert_eq!(swept.refs.len(), 2);
        assert!(!swept.code.contains("helper"));
        assert!(swept.code.contains("const dormant = 1;"));
        assert!(swept.code.contains("let writtenOnly;"));
        assert!(swept.code.contains("writtenOnly = 2;"));
    }

    #[test]
    fn test_partial_array_pattern_keeps_positions() {
        let swept = sweep_twice(
            r#"
            const [first, second, third] = tuple();
            export const x = serverFn$(() => second);
            export const y = [first, third];
            "#,
            false,
        );
        assert!(swept.code.contains("const [first, , third] = tuple();"));
    }
}
