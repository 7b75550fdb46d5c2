//! Compilation driver and high-level APIs
//!
//! Orchestrates the fixed pass order of the pipeline: lex-all, parse-all,
//! register-all (class shapes, then prototypes), lower-all. Syntax problems
//! are collected and surfaced alongside the result; the first semantic
//! error aborts the unit.

use anyhow::{Context as _, Result};
use ks_hir::AstContext;
use ks_intern::Interner;
use ks_lexer::LexError;
use ks_lower::SemanticError;
use ks_parser::ParseError;
use std::path::Path;

/// Everything a successful compilation produces
#[derive(Debug)]
pub struct CompileResult {
    /// The lowered registry handed to the backend
    pub context: AstContext,
    /// Recoverable syntax errors; each one cost a top-level declaration
    pub syntax_errors: Vec<ParseError>,
    /// Characters the lexer rejected
    pub lex_errors: Vec<LexError>,
    /// The interner shared by every name in `context`
    pub interner: Interner,
}

impl CompileResult {
    /// Whether any syntax-tier diagnostics were produced
    pub fn has_syntax_errors(&self) -> bool {
        !self.syntax_errors.is_empty() || !self.lex_errors.is_empty()
    }
}

/// Compile in-memory source text
///
/// `name` labels diagnostics (usually the file path).
pub fn compile_source(source: &str, name: &str) -> Result<CompileResult, SemanticError> {
    let interner = Interner::new();
    let parsed = ks_parser::parse_source(source, name, &interner);
    let context = ks_lower::lower_unit(&parsed.unit, &interner, name, source)?;
    Ok(CompileResult {
        context,
        syntax_errors: parsed.errors,
        lex_errors: parsed.lex_errors,
        interner,
    })
}

/// Backend symbol name of any function registered in a compiled context
pub fn mangled_name(context: &AstContext, interner: &Interner, func: ks_ty::TypeId) -> String {
    ks_ty::mangle::mangled_name(&context.types, interner, func)
}

/// Compile a source file from disk
///
/// An unreadable file is a fatal open error; nothing is recovered.
pub fn compile_file(path: impl AsRef<Path>) -> Result<CompileResult> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open `{}`", path.display()))?;
    let name = path.display().to_string();
    compile_source(&source, &name).map_err(Into::into)
}
