//! Integration test utilities for the Kestrel front end

use ks_driver::CompileResult;
use ks_hir::{Body, Expr};
use ks_lower::SemanticError;

/// Compile a source string end to end
pub fn compile(source: &str) -> Result<CompileResult, SemanticError> {
    ks_driver::compile_source(source, "<fixture>")
}

/// Compile a source string, asserting both tiers stayed clean
///
/// # Panics
///
/// Panics if the lexer or parser reported anything, or on a semantic error.
pub fn compile_clean(source: &str) -> CompileResult {
    let result = compile(source).expect("fixture should lower");
    assert!(
        !result.has_syntax_errors(),
        "fixture has syntax errors: {:?} {:?}",
        result.lex_errors,
        result.syntax_errors
    );
    result
}

/// The lowered body registered under a backend symbol name
///
/// # Panics
///
/// Panics if no body with that name exists.
pub fn body_named<'a>(result: &'a CompileResult, mangled: &str) -> &'a Body {
    &result
        .context
        .bodies
        .iter()
        .find(|body| body.mangled == mangled)
        .unwrap_or_else(|| panic!("no lowered body named `{mangled}`"))
        .body
}

/// All call targets in a body, in arena allocation order
pub fn call_targets(body: &Body) -> Vec<String> {
    body.exprs
        .iter()
        .filter_map(|(_, expr)| match expr {
            Expr::Call { mangled, .. } => Some(mangled.clone()),
            _ => None,
        })
        .collect()
}
