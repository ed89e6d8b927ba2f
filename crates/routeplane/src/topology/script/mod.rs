//! Topology script language
//!
//! A small declarative language for describing routes:
//!
//! ```text
//! lookup_plugin(:mailer, "mailer")
//! let replies = config("app.replies")
//!
//! route {
//!   intercept(header("payload-classifier").is_equal_to("code"))
//!     .process(route_config())
//!     .proceed
//!
//!   from("direct:start")
//!     .process(add_headers({reply_to: replies}))
//!     .to("mock:result")
//! }
//! ```
//!
//! Scripts are parsed into an [`ast::Script`] and evaluated by
//! [`eval::Evaluator`] against a topology session. Nothing in a script can
//! reach the host beyond the vocabulary, the builtins and the capabilities
//! registered in the session.

pub mod ast;
pub mod eval;
mod lexer;
mod parser;

use thiserror::Error;

pub use ast::Script;

/// Syntax error with its source position
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Syntax error at {line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Route vocabulary, forwarded to the definition builder.
pub const VOCABULARY: &[&str] = &[
    "from",
    "to",
    "process",
    "process_ref",
    "intercept",
    "choice",
    "when",
    "otherwise",
    "end",
    "proceed",
    "stop",
    "set_header",
];

/// Functions available to every script.
pub const BUILTINS: &[&str] = &[
    "config",
    "lookup",
    "header",
    "body",
    "is_not",
    "add_headers",
    "route_config",
    "lookup_plugin",
    "register_plugin",
];

const KEYWORDS: &[&str] = &["let", "route", "true", "false", "nil"];

/// Deepest nesting of blocks, arguments, collections and method chains a
/// script may use.
pub const MAX_NESTING: usize = 128;

/// Parse script source.
pub fn parse(source: &str) -> Result<Script, ParseError> {
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens).parse_script()
}

/// Names that capabilities may not take.
pub fn is_reserved(name: &str) -> bool {
    VOCABULARY.contains(&name) || BUILTINS.contains(&name) || KEYWORDS.contains(&name)
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved("from"));
        assert!(is_reserved("add_headers"));
        assert!(is_reserved("route"));
        assert!(!is_reserved("mailer"));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("svc_2"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("2svc"));
        assert!(!is_identifier("with space"));
        assert!(!is_identifier(""));
    }
}
