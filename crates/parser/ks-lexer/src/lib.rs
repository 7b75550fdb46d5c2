//! Lexer for the Kestrel language
//!
//! The lexer materializes the whole token sequence up front so the parser
//! can freely save and restore its position during speculative parsing.

mod token;

pub use token::{Token, TokenKind};

use ks_span::Span;
use logos::Logos;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Lexer diagnostics
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum LexError {
    /// A character the token grammar does not recognize
    #[error("unrecognized character `{character}`")]
    #[diagnostic(code(lexer::unrecognized_character))]
    UnrecognizedCharacter {
        /// The offending character
        character: char,
        /// Source location
        #[label("not a valid token")]
        span: SourceSpan,
    },
}

/// A fully buffered, randomly addressable token sequence
///
/// The cursor can be saved with [`TokenStream::pos`] and rewound with
/// [`TokenStream::restore`]; the stream always ends with an
/// [`TokenKind::Eof`] sentinel and never advances past it.
#[derive(Debug, Clone)]
pub struct TokenStream<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> TokenStream<'src> {
    /// The source text the stream was lexed from
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Current cursor position, for later [`TokenStream::restore`]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Rewind (or fast-forward) the cursor to a saved position
    pub fn restore(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len() - 1);
    }

    /// The token at the cursor, without consuming it
    pub fn peek(&self) -> Token {
        self.tokens[self.pos]
    }

    /// The kind of the token at the cursor
    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// The kind of the token `n` positions past the cursor
    pub fn nth_kind(&self, n: usize) -> TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx].kind
    }

    /// Whether the cursor is at a token of the given kind
    pub fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Consume and return the token at the cursor
    ///
    /// At end of input this keeps returning the EOF sentinel.
    pub fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Consume the token at the cursor if it has the given kind
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// The source text of a token
    pub fn text(&self, token: Token) -> &'src str {
        &self.source[token.span.range()]
    }

    /// Span of the most recently consumed token
    ///
    /// Before any token is consumed this is the first token's span; used by
    /// the parser to close off node spans.
    pub fn prev_span(&self) -> Span {
        let idx = self.pos.saturating_sub(1);
        self.tokens[idx].span
    }
}

/// Lex the whole source into a buffered token stream
///
/// Unrecognized characters are skipped and reported; the returned stream is
/// always terminated by an EOF sentinel.
pub fn tokenize(source: &str) -> (TokenStream<'_>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => {
                tokens.push(Token::new(kind, Span::new(span.start as u32, span.end as u32)));
            }
            Err(()) => {
                let character = source[span.start..].chars().next().unwrap_or('\u{fffd}');
                errors.push(LexError::UnrecognizedCharacter {
                    character,
                    span: (span.start, span.end - span.start).into(),
                });
            }
        }
    }

    let end = source.len() as u32;
    tokens.push(Token::new(TokenKind::Eof, Span::new(end, end)));

    (
        TokenStream {
            source,
            tokens,
            pos: 0,
        },
        errors,
    )
}
