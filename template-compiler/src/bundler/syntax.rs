//! Parse-only validation of a finished bundle.

use std::sync::OnceLock;

use regex::Regex;
use rquickjs::{CatchResultExt, CaughtError, Context, Runtime};
use tracing::warn;

/// Syntax error reported by the engine, positioned in bundle coordinates
/// (1-based line, 0-based column).
#[derive(Debug, Clone, PartialEq)]
pub struct BundleSyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r":(\d+)(?::(\d+))?\)?\s*$").expect("valid location regex"))
}

/// Compile `code` without running it. The bundle is wrapped in a function
/// expression that is created but never called, so no user code executes.
pub fn check(code: &str) -> Result<(), BundleSyntaxError> {
    let wrapped = format!("(function () {{\n{}\n}});", code);

    let runtime = match Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!("Skipping syntax validation, engine unavailable: {}", e);
            return Ok(());
        }
    };
    let context = match Context::full(&runtime) {
        Ok(context) => context,
        Err(e) => {
            warn!("Skipping syntax validation, engine unavailable: {}", e);
            return Ok(());
        }
    };

    context.with(|ctx| match ctx.eval::<(), _>(wrapped).catch(&ctx) {
        Ok(()) => Ok(()),
        Err(CaughtError::Exception(exception)) => {
            let message = exception
                .message()
                .unwrap_or_else(|| "Invalid syntax".to_string());
            let (line, column) = exception
                .stack()
                .as_deref()
                .and_then(first_location)
                .or_else(|| exception.line().map(|line| (line.max(0) as u32, 0)))
                .unwrap_or((1, 0));
            Err(BundleSyntaxError {
                message,
                // the wrapper adds one line ahead of the bundle
                line: line.saturating_sub(1),
                column,
            })
        }
        Err(CaughtError::Value(value)) => Err(BundleSyntaxError {
            message: format!("{:?}", value),
            line: 0,
            column: 0,
        }),
        Err(CaughtError::Error(error)) => Err(BundleSyntaxError {
            message: error.to_string(),
            line: 0,
            column: 0,
        }),
    })
}

/// Line and 0-based column from the first `file:line[:col]` frame of a stack.
fn first_location(stack: &str) -> Option<(u32, u32)> {
    stack.lines().find_map(|frame| {
        let captures = location_pattern().captures(frame.trim())?;
        let line = captures.get(1)?.as_str().parse::<u32>().ok()?;
        let column = captures
            .get(2)
            .and_then(|c| c.as_str().parse::<u32>().ok())
            .map(|c| c.saturating_sub(1))
            .unwrap_or(0);
        Some((line, column))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_code_passes() {
        assert!(check("var a = 1;\nfunction f() { return a + 1; }\nthrow new Error('never runs');").is_ok());
    }

    #[test]
    fn test_syntax_error_is_located_in_bundle_coordinates() {
        let err = check("var a = 1;\nvar b = ;\n").unwrap_err();
        assert!(!err.message.is_empty());
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_first_location_parsing() {
        assert_eq!(first_location("    at eval_script:4:7\n"), Some((4, 6)));
        assert_eq!(first_location("    at eval_script:4\n"), Some((4, 0)));
        assert_eq!(first_location("    at f (eval_script:9:2)\n"), Some((9, 1)));
        assert_eq!(first_location("no location"), None);
    }
}
