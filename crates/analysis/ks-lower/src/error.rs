//! Semantic error reporting
//!
//! Every semantic problem is fatal: the first error aborts the remainder of
//! the unit's compilation. This is the counterpart of the parser's
//! declaration-granular recovery; the asymmetry is deliberate.

use ks_intern::{Interner, Symbol};
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Fatal semantic error raised during lowering
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum SemanticError {
    /// An identifier resolved to nothing in any visible scope or namespace
    #[error("unknown identifier `{name}`")]
    #[diagnostic(code(lower::unknown_identifier))]
    UnknownIdentifier {
        /// The unresolved name
        name: String,
        /// Near-miss suggestion, if one is close enough
        #[help]
        suggestion: Option<String>,
        /// Source location
        #[label("not found in this scope")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// A type name resolved to nothing
    #[error("unknown type `{name}`")]
    #[diagnostic(code(lower::unknown_type))]
    UnknownType {
        /// The unresolved type name
        name: String,
        /// Source location
        #[label("no such type")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// A name was declared twice in the same lexical scope
    #[error("`{name}` is already declared in this scope")]
    #[diagnostic(
        code(lower::duplicate_declaration),
        help("shadowing is only allowed in a nested block")
    )]
    DuplicateDeclaration {
        /// The redeclared name
        name: String,
        /// Source location of the redeclaration
        #[label("declared a second time here")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// No candidate in the overload-set matched the argument types
    #[error("no suitable overload of `{name}` for arguments ({args})")]
    #[diagnostic(
        code(lower::no_suitable_overload),
        help("argument types must match a declaration exactly; there are no implicit conversions")
    )]
    NoSuitableOverload {
        /// The called name
        name: String,
        /// Rendered argument types
        args: String,
        /// Source location of the call
        #[label("no overload matches")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// Operand types of a binary operator differ
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    #[diagnostic(code(lower::type_mismatch))]
    TypeMismatch {
        /// The type required by context
        expected: String,
        /// The type actually found
        found: String,
        /// Source location
        #[label("the types must match exactly")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// Member access on something without that member
    #[error("`{ty}` has no member `{member}`")]
    #[diagnostic(code(lower::invalid_member_access))]
    InvalidMemberAccess {
        /// The accessed type
        ty: String,
        /// The missing member
        member: String,
        /// Source location
        #[label("invalid member access")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },

    /// Assignment (or `&`, `++`, `--`) applied to a non-storage expression
    #[error("expression is not an assignable storage location")]
    #[diagnostic(
        code(lower::invalid_assignment_target),
        help("only variables, members, subscripts and dereferences can be assigned to")
    )]
    InvalidAssignmentTarget {
        /// Source location
        #[label("cannot be assigned to")]
        span: SourceSpan,
        /// Source code for context
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl SemanticError {
    /// Pick the closest of `candidates` to `name`, rendered as a help line
    ///
    /// Uses a plain Levenshtein distance with a cutoff of 2; `None` when
    /// nothing is close enough.
    pub fn suggest(name: &str, interner: &Interner, candidates: &[Symbol]) -> Option<String> {
        let mut best: Option<(usize, String)> = None;
        for candidate in candidates {
            let text = interner.resolve(candidate);
            let distance = levenshtein(name, &text);
            if distance == 0 || distance > 2 {
                continue;
            }
            if best.as_ref().is_none_or(|(d, _)| distance < *d) {
                best = Some((distance, text));
            }
        }
        best.map(|(_, text)| format!("did you mean `{text}`?"))
    }
}

/// Edit distance between two short identifier strings
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}
