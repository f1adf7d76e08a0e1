//! Parsing logic bodies with oxc.
//!
//! Bodies are parsed as modules with `return` allowed at the top level, so
//! both `return ...` and top-level `await` are accepted.

use crate::error::ParseError;
use crate::guard::check_source;
use crate::visit::MemberKeys;
use oxc_allocator::Allocator;
use oxc_ast::ast::{Program, Statement};
use oxc_ast::Visit;
use oxc_parser::{ParseOptions, Parser};
use oxc_span::{SourceType, Span};
use std::collections::BTreeSet;

/// Stack given to the parser thread. Together with the source checks this
/// bounds the parser's recursion well below overflow.
const PARSER_STACK_SIZE: usize = 256 * 1024 * 1024;

fn on_parser_stack<R, F>(f: F) -> Result<R, ParseError>
where
    R: Send,
    F: FnOnce() -> Result<R, ParseError> + Send,
{
    std::thread::scope(|scope| {
        let handle = std::thread::Builder::new()
            .name("canvas-parse".to_string())
            .stack_size(PARSER_STACK_SIZE)
            .spawn_scoped(scope, f)
            .map_err(|e| ParseError::new(format!("Parser thread unavailable: {}", e)))?;
        handle
            .join()
            .map_err(|_| ParseError::new("Parser thread panicked"))?
    })
}

/// Parse `source` and hand the program to `inspect`.
///
/// `preserve_parens` keeps parenthesized expressions as their own nodes so
/// spans cover the parentheses.
fn with_program<R, F>(source: &str, preserve_parens: bool, inspect: F) -> Result<R, ParseError>
where
    R: Send,
    F: FnOnce(&Program<'_>) -> R + Send,
{
    check_source(source)?;
    on_parser_stack(|| {
        let allocator = Allocator::default();
        let options = ParseOptions {
            allow_return_outside_function: true,
            preserve_parens,
            ..ParseOptions::default()
        };
        let parsed = Parser::new(&allocator, source, SourceType::mjs())
            .with_options(options)
            .parse();

        if let Some(error) = parsed.errors.first() {
            return Err(ParseError::new(error.to_string()));
        }
        if parsed.panicked {
            return Err(ParseError::new("Unexpected end of input"));
        }
        Ok(inspect(&parsed.program))
    })
}

/// Keys read from `object` through `object.key`, `object["key"]` and their
/// optional-chaining forms, anywhere in `source`.
pub fn member_references(source: &str, object: &str) -> Result<BTreeSet<String>, ParseError> {
    with_program(source, false, |program| {
        let mut keys = MemberKeys::new(object);
        keys.visit_program(program);
        keys.into_keys()
    })
}

/// Span of the last top-level statement when it is an expression
/// statement.
fn trailing_expression(program: &Program<'_>) -> Option<Span> {
    match program.body.last() {
        Some(Statement::ExpressionStatement(statement)) => Some(statement.span),
        Some(_) => None,
        // a lone string literal parses as a directive
        None => program.directives.last().map(|directive| directive.span),
    }
}

/// Rewrites `source` so that a final expression statement becomes the
/// body's return value. Returns `None` when nothing needs rewriting or the
/// body does not parse.
pub(crate) fn return_trailing_expression(source: &str) -> Option<String> {
    let span = with_program(source, true, trailing_expression).ok()??;
    let (start, end) = (span.start as usize, span.end as usize);
    let expression = source[start..end].trim_end().trim_end_matches(';');
    Some(format!(
        "{}return ({});{}",
        &source[..start],
        expression,
        &source[end..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(source: &str) -> Result<Vec<String>, ParseError> {
        member_references(source, "$node").map(|keys| keys.into_iter().collect())
    }

    #[test]
    fn accepts_modern_syntax() {
        assert_eq!(
            keys("const { x } = $node[\"Fetch\"].data; return x * 2").unwrap(),
            vec!["Fetch"]
        );
        assert!(keys("return /a/.test('abc') && new Date() instanceof Date").is_ok());
        assert!(keys("const v = await Promise.resolve(3); return v").is_ok());
    }

    #[test]
    fn reports_syntax_errors() {
        assert!(keys("not valid js (((").is_err());
        assert!(keys("return (").is_err());
    }

    #[test]
    fn rejects_deep_nesting_without_parsing() {
        let source = format!("return {}$node.A{}", "(".repeat(2_000), ")".repeat(2_000));
        let err = keys(&source).unwrap_err();
        assert!(err.to_string().starts_with("Nesting deeper than"), "{}", err);
    }

    #[test]
    fn trailing_expression_becomes_return() {
        assert_eq!(
            return_trailing_expression("let x = 5; x * 2").as_deref(),
            Some("let x = 5; return (x * 2);")
        );
        assert_eq!(
            return_trailing_expression("(1 + 1);").as_deref(),
            Some("return ((1 + 1));")
        );
        assert_eq!(
            return_trailing_expression("'bare'").as_deref(),
            Some("return ('bare');")
        );
        assert_eq!(
            return_trailing_expression("if (a) return 1;\nb // tail").as_deref(),
            Some("if (a) return 1;\nreturn (b); // tail")
        );
    }

    #[test]
    fn explicit_return_is_left_alone() {
        assert_eq!(return_trailing_expression("return 1"), None);
        assert_eq!(return_trailing_expression("let x = 5;"), None);
        assert_eq!(return_trailing_expression("return ("), None);
    }
}
