//! Rich error reporting for the parser

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Parse error with rich diagnostic information
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum ParseError {
    /// Syntax error with unexpected input
    #[error("unexpected token `{token}`")]
    #[diagnostic(code(parser::unexpected_token), help("this token is not valid here"))]
    UnexpectedToken {
        /// What was found
        token: String,
        /// Source location
        #[label("unexpected token")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// Missing expected token
    #[error("expected `{expected}`, found `{found}`")]
    #[diagnostic(code(parser::missing_token), help("try adding `{expected}` here"))]
    MissingToken {
        /// What was expected
        expected: String,
        /// What was actually found
        found: String,
        /// Source location where it should be
        #[label("expected `{expected}` here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// Invalid syntax construct
    #[error("invalid {construct}")]
    #[diagnostic(code(parser::invalid_syntax))]
    InvalidSyntax {
        /// Type of construct (e.g., "function declaration", "destructor")
        construct: String,
        /// Detailed explanation
        #[help]
        suggestion: Option<String>,
        /// Source location
        #[label("{construct} is invalid")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl ParseError {
    /// The primary source location of the error
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::UnexpectedToken { span, .. }
            | Self::MissingToken { span, .. }
            | Self::InvalidSyntax { span, .. } => *span,
        }
    }
}
