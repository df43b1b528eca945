use std::{path::Path, sync::Arc};

use crate::{
    ast::Body,
    diagnostics::Diagnostics,
    module::{self, ModuleName, ParsedModule, SourceUnit},
    parser::{self, Parser},
    scope::Scopes,
    type_checker::Checker,
    util::fmt::tree,
};

pub const TEST_FILE: &str = "test.aeon";

pub fn format_diagnostics(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics
        .iter()
        .map(|d| format!("{}: {}: {}", d.location, d.level, d.message))
        .collect()
}

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    CheckerProgram(&'static str),
    CheckerExpr(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    TreeError(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

/// Parses and checks a module named `test`, along with empty bootstrap and
/// prelude modules.
pub fn check_module(input: &str) -> (ParsedModule, Diagnostics) {
    let mut modules = Vec::with_capacity(3);
    let mut diagnostics = Diagnostics::new();
    for (name, path, source) in [
        (ModuleName::bootstrap(), "bootstrap.aeon", ""),
        (ModuleName::prelude(), "prelude.aeon", ""),
        (ModuleName::parse("test"), TEST_FILE, input),
    ] {
        let (module, parse_diagnostics) = module::parse_module(name, &SourceUnit::new(path, source));
        diagnostics.append(parse_diagnostics);
        modules.push(module);
    }

    let checker = Checker::with_capacity(32);
    let (_registry, check_diagnostics) = checker.check(&mut modules);
    diagnostics.append(check_diagnostics);
    let module = modules.pop().expect("the test module is parsed last");
    (module, diagnostics)
}

/// Prints a checked module without its imports.
fn print_module(body: &Body) -> String {
    let mut buf = Vec::with_capacity(1024);
    for node in body.children.iter().filter(|node| !node.is_import()) {
        tree::print_node(&mut buf, 0, node).unwrap();
    }
    String::from_utf8(buf).unwrap()
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    let file: Arc<Path> = Arc::from(Path::new(TEST_FILE));
    let mut scopes = Scopes::new();

    match test {
        Test::ParserProgram(input) => {
            match parser::parse_module(input.as_bytes(), file, &mut scopes) {
                Ok(body) => (tree::print_body_string(&body), vec![]),
                Err(error) => (String::new(), vec![format!("{}: error: {error}", error.location)]),
            }
        }
        Test::ParserExpr(input) => {
            match Parser::new(input.as_bytes(), file, &mut scopes).parse_standalone_expression() {
                Ok((node, _)) => (tree::print_node_string(&node), vec![]),
                Err(error) => (String::new(), vec![format!("{}: error: {error}", error.location)]),
            }
        }
        Test::CheckerProgram(input) => {
            let (module, diagnostics) = check_module(input);
            (print_module(&module.ast), format_diagnostics(&diagnostics))
        }
        Test::CheckerExpr(input) => {
            let (module, diagnostics) = check_module(input);
            let tree = module
                .ast
                .children
                .last()
                .filter(|node| !node.is_import())
                .map(tree::print_node_string)
                .unwrap_or_default();
            (tree, format_diagnostics(&diagnostics))
        }
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::TreeError(expected_tree) => {
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim())
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors)
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, tree_error, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeError(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram($source)
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr($source)
    };
    (@@get_test(checker, program), $source:expr) => {
        crate::util::test_utils::Test::CheckerProgram($source)
    };
    (@@get_test(checker, expr), $source:expr) => {
        crate::util::test_utils::Test::CheckerExpr($source)
    };
}
pub(crate) use tree_tests;
