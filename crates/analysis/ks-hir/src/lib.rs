//! Typed, lowered AST
//!
//! This is what the lowering pass produces and the backend consumes: every
//! node carries its resolved type, calls carry their resolved target, and
//! destructor calls are already injected at scope exits.

use ks_arena::{Arena, Idx};
use ks_intern::{Interner, Symbol};
use ks_syntax::{BinOp, UnOp};
use ks_ty::{NamespaceTree, TypeId, TypeTable};

/// Id of an expression inside a [`Body`]
pub type ExprId = Idx<Expr>;

/// A typed, lowered expression or statement node
#[derive(Debug, Clone)]
pub enum Expr {
    /// Integer literal
    Integer {
        /// Literal value
        value: i64,
        /// Resolved type (`i32`)
        ty: TypeId,
    },
    /// Float literal
    Float {
        /// Literal value
        value: f64,
        /// Resolved type (`float`)
        ty: TypeId,
    },
    /// Reference to a named local (parameters included)
    Variable {
        /// Variable name
        name: Symbol,
        /// Per-function slot ordinal
        ordinal: u32,
        /// Resolved type
        ty: TypeId,
    },
    /// Binary operation (never an assignment; see [`Expr::Assign`])
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        lhs: ExprId,
        /// Right operand
        rhs: ExprId,
        /// Result type
        ty: TypeId,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnOp,
        /// Operand
        operand: ExprId,
        /// Result type
        ty: TypeId,
    },
    /// Store into an assignable storage location
    ///
    /// Compound assignments are desugared before this node is built: the
    /// arithmetic happens in `value`, the store happens here.
    Assign {
        /// Target; always satisfies [`Expr::is_place`]
        target: ExprId,
        /// Stored value
        value: ExprId,
        /// Result type (the target's type)
        ty: TypeId,
    },
    /// Access to a data member by layout index
    Member {
        /// Accessed expression
        base: ExprId,
        /// Member index in layout order
        index: u32,
        /// Member type
        ty: TypeId,
    },
    /// Array subscript
    Index {
        /// Subscripted expression (an `__arr<T,N>`)
        base: ExprId,
        /// Subscript expression
        index: ExprId,
        /// Element type
        ty: TypeId,
    },
    /// Call with a resolved target
    Call {
        /// The resolved function signature
        target: TypeId,
        /// Backend symbol name of the target
        mangled: String,
        /// Receiver for methods, constructors and destructors
        receiver: Option<ExprId>,
        /// Arguments in order
        args: Vec<ExprId>,
        /// The target's declared return type
        ty: TypeId,
    },
    /// Construction of a nameless temporary: allocates storage for the
    /// temporary and invokes the constructor with that storage as receiver
    Construct {
        /// The generated temporary name
        temp: Symbol,
        /// The constructed class
        class: TypeId,
        /// The resolved constructor overload
        ctor: TypeId,
        /// Backend symbol name of the constructor
        mangled: String,
        /// Constructor arguments
        args: Vec<ExprId>,
    },
    /// Local variable definition
    VarDef {
        /// Variable name
        name: Symbol,
        /// Per-function slot ordinal
        ordinal: u32,
        /// Declared type
        ty: TypeId,
        /// Lowered initializer, if any
        init: Option<ExprId>,
    },
    /// Statement block; injected destructor calls are already appended
    Block {
        /// Statements in order
        stmts: Vec<ExprId>,
    },
    /// Conditional
    If {
        /// Condition
        cond: ExprId,
        /// Then branch
        then_branch: ExprId,
        /// Optional else branch
        else_branch: Option<ExprId>,
    },
    /// Loop
    For {
        /// Initializer, run once
        init: Option<ExprId>,
        /// Condition, checked before each iteration
        cond: Option<ExprId>,
        /// Step, run after each iteration
        step: Option<ExprId>,
        /// Loop body
        body: ExprId,
    },
    /// Return; destructor calls for live bindings precede this node in the
    /// enclosing block
    Return {
        /// Returned value, if any
        value: Option<ExprId>,
    },
}

impl Expr {
    /// The resolved type of a value-producing node
    pub fn ty(&self) -> Option<TypeId> {
        match self {
            Self::Integer { ty, .. }
            | Self::Float { ty, .. }
            | Self::Variable { ty, .. }
            | Self::Binary { ty, .. }
            | Self::Unary { ty, .. }
            | Self::Assign { ty, .. }
            | Self::Member { ty, .. }
            | Self::Index { ty, .. }
            | Self::Call { ty, .. } => Some(*ty),
            Self::Construct { class, .. } => Some(*class),
            Self::VarDef { .. }
            | Self::Block { .. }
            | Self::If { .. }
            | Self::For { .. }
            | Self::Return { .. } => None,
        }
    }

    /// Whether the node is an assignable storage location
    ///
    /// This is the capability assignment and compound assignment check
    /// before building an [`Expr::Assign`].
    pub fn is_place(&self) -> bool {
        matches!(
            self,
            Self::Variable { .. }
                | Self::Member { .. }
                | Self::Index { .. }
                | Self::Unary {
                    op: UnOp::Deref,
                    ..
                }
        )
    }
}

/// A lowered function body: expression arena plus root block
#[derive(Debug, Clone)]
pub struct Body {
    /// All expressions of the body
    pub exprs: Arena<Expr>,
    /// The root block
    pub root: ExprId,
}

impl Body {
    /// Look up an expression
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }
}

/// A lowered function: resolved signature, backend symbol, body
#[derive(Debug, Clone)]
pub struct FunctionBody {
    /// The function's signature type
    pub func: TypeId,
    /// Backend symbol name
    pub mangled: String,
    /// The lowered body
    pub body: Body,
}

/// The top-level registry handed to the backend
///
/// Exposes, in registration order: lowered compound layouts (`classes`),
/// function prototypes (`prototypes`), and lowered bodies (`bodies`). All
/// symbol names are globally unique per the mangling rules.
#[derive(Debug, Clone)]
pub struct AstContext {
    /// All types of the unit, arena-allocated
    pub types: TypeTable,
    /// The namespace tree of the unit
    pub namespaces: NamespaceTree,
    /// Compound types in registration order; member order is layout order
    pub classes: Vec<TypeId>,
    /// Function signatures in registration order (prototype-only functions
    /// such as externals and the implicit `new` included)
    pub prototypes: Vec<TypeId>,
    /// Lowered bodies in lowering order
    pub bodies: Vec<FunctionBody>,
    next_temp: u32,
}

impl AstContext {
    /// Create an empty context over a fresh type table
    pub fn new(interner: &Interner) -> Self {
        Self {
            types: TypeTable::new(interner),
            namespaces: NamespaceTree::new(),
            classes: Vec::new(),
            prototypes: Vec::new(),
            bodies: Vec::new(),
            next_temp: 0,
        }
    }

    /// Allocate the next nameless-temporary name (`__tmp0`, `__tmp1`, ...)
    pub fn fresh_temp(&mut self, interner: &Interner) -> Symbol {
        let name = format!("__tmp{}", self.next_temp);
        self.next_temp += 1;
        interner.intern(&name)
    }
}
