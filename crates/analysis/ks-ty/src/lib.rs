//! Type and symbol model
//!
//! Types are arena-allocated and interned by `(base name, argument list)`,
//! so structural type equality is `TypeId` equality. Function signatures are
//! types too; an overload-set is a list of function-kind type ids.

pub mod mangle;
pub mod namespace;

pub use namespace::{NamespaceId, NamespaceTree};

use indexmap::IndexMap;
use ks_arena::{Arena, Idx};
use ks_intern::{Interner, Symbol};
use rustc_hash::FxHashMap;

/// Id of an arena-allocated type
pub type TypeId = Idx<Type>;

/// Base name of the structural pointer generic
pub const PTR_BASE: &str = "__ptr";
/// Base name of the structural array generic
pub const ARR_BASE: &str = "__arr";

/// The fixed builtin scalar type names
pub const BUILTIN_NAMES: [&str; 8] = ["i32", "i64", "u32", "u64", "bool", "float", "double", "void"];

/// A type: base name, ordered template arguments, and kind payload
#[derive(Debug, Clone)]
pub struct Type {
    /// Base name
    pub name: Symbol,
    /// Template arguments in order, empty for plain types
    pub args: Vec<TypeId>,
    /// Kind payload
    pub kind: TypeKind,
}

/// Kind of a type
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// A builtin scalar or a structural generic (`__ptr<T>`, `__arr<T,N>`)
    Builtin,
    /// An integer-literal template argument
    Literal {
        /// The literal value
        value: i64,
    },
    /// A function signature
    Function(FunctionType),
    /// A user-defined class
    Compound(CompoundType),
}

/// A function signature
#[derive(Debug, Clone)]
pub struct FunctionType {
    /// Parameters in declaration order
    pub params: Vec<Param>,
    /// Return type
    pub ret: TypeId,
    /// Owning compound type for methods, constructors and destructors
    pub owner: Option<TypeId>,
    /// Whether the symbol keeps its plain name for foreign linking
    pub external: bool,
}

/// A named, typed function parameter
#[derive(Debug, Clone)]
pub struct Param {
    /// Parameter name
    pub name: Symbol,
    /// Parameter type
    pub ty: TypeId,
}

/// A named, typed data member
#[derive(Debug, Clone)]
pub struct Member {
    /// Member name
    pub name: Symbol,
    /// Member type
    pub ty: TypeId,
}

/// A user-defined class
///
/// Member order is fixed at registration and is the permanent in-memory
/// layout order.
#[derive(Debug, Clone, Default)]
pub struct CompoundType {
    /// Data members in layout order
    pub members: Vec<Member>,
    /// Member-function overload-sets keyed by plain name, in registration
    /// order
    pub methods: IndexMap<Symbol, Vec<TypeId>>,
    /// Constructor overloads in declaration order
    pub constructors: Vec<TypeId>,
    /// The destructor, if the class declares one
    pub destructor: Option<TypeId>,
}

impl CompoundType {
    /// Index of a data member by name, agreeing with layout order
    pub fn member_index(&self, name: Symbol) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Cached ids of the builtin scalar types
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    /// `i32`
    pub i32: TypeId,
    /// `i64`
    pub i64: TypeId,
    /// `u32`
    pub u32: TypeId,
    /// `u64`
    pub u64: TypeId,
    /// `bool`
    pub bool: TypeId,
    /// `float`
    pub float: TypeId,
    /// `double`
    pub double: TypeId,
    /// `void`
    pub void: TypeId,
}

/// Arena plus interning table for all types of a compilation unit
#[derive(Debug, Clone)]
pub struct TypeTable {
    arena: Arena<Type>,
    interned: FxHashMap<(Symbol, Vec<TypeId>), TypeId>,
    builtins: Builtins,
    ptr_base: Symbol,
    arr_base: Symbol,
}

impl TypeTable {
    /// Create a table with the builtin scalars pre-registered
    pub fn new(interner: &Interner) -> Self {
        let mut arena = Arena::new();
        let mut interned = FxHashMap::default();

        let mut builtin = |name: &str| {
            let sym = interner.intern(name);
            let id = arena.alloc(Type {
                name: sym,
                args: Vec::new(),
                kind: TypeKind::Builtin,
            });
            interned.insert((sym, Vec::new()), id);
            id
        };

        let builtins = Builtins {
            i32: builtin("i32"),
            i64: builtin("i64"),
            u32: builtin("u32"),
            u64: builtin("u64"),
            bool: builtin("bool"),
            float: builtin("float"),
            double: builtin("double"),
            void: builtin("void"),
        };

        Self {
            arena,
            interned,
            builtins,
            ptr_base: interner.intern(PTR_BASE),
            arr_base: interner.intern(ARR_BASE),
        }
    }

    /// The builtin scalar ids
    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    /// Look up a type by value
    pub fn get(&self, id: TypeId) -> &Type {
        &self.arena[id]
    }

    /// Mutable access, used by the prototype-registration pass to attach
    /// methods, constructors and the destructor to a compound
    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.arena[id]
    }

    /// Look up an already interned `(name, args)` pair
    pub fn lookup(&self, name: Symbol, args: &[TypeId]) -> Option<TypeId> {
        self.interned.get(&(name, args.to_vec())).copied()
    }

    /// Intern a `(name, args)` pair, allocating with `kind` when new
    ///
    /// An existing registration wins; the supplied kind is ignored then.
    pub fn intern(&mut self, name: Symbol, args: Vec<TypeId>, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&(name, args.clone())) {
            return id;
        }
        let id = self.arena.alloc(Type {
            name,
            args: args.clone(),
            kind,
        });
        self.interned.insert((name, args), id);
        id
    }

    /// Allocate a function signature; signatures are not interned, every
    /// declaration gets its own id
    pub fn alloc_function(&mut self, name: Symbol, func: FunctionType) -> TypeId {
        self.arena.alloc(Type {
            name,
            args: Vec::new(),
            kind: TypeKind::Function(func),
        })
    }

    /// Allocate a type without interning it
    ///
    /// Compound types are registered through their namespace, not the
    /// interning table, so equal class names in different namespaces stay
    /// distinct types.
    pub fn alloc_raw(&mut self, name: Symbol, args: Vec<TypeId>, kind: TypeKind) -> TypeId {
        self.arena.alloc(Type { name, args, kind })
    }

    /// The integer-literal template-argument type for `value`
    pub fn literal(&mut self, value: i64, interner: &Interner) -> TypeId {
        let name = interner.intern(&value.to_string());
        self.intern(name, Vec::new(), TypeKind::Literal { value })
    }

    /// The structural pointer type `__ptr<inner>`
    pub fn ptr_to(&mut self, inner: TypeId) -> TypeId {
        let base = self.ptr_base;
        self.intern(base, vec![inner], TypeKind::Builtin)
    }

    /// The structural array type `__arr<element, len>`
    pub fn array_of(&mut self, element: TypeId, len: TypeId) -> TypeId {
        let base = self.arr_base;
        self.intern(base, vec![element, len], TypeKind::Builtin)
    }

    /// Whether `base` names one of the structural generics
    pub fn is_structural_base(&self, base: Symbol) -> bool {
        base == self.ptr_base || base == self.arr_base
    }

    /// The pointee of `__ptr<T>`, if `id` is a pointer
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        let ty = self.get(id);
        if ty.name == self.ptr_base && ty.args.len() == 1 {
            Some(ty.args[0])
        } else {
            None
        }
    }

    /// The element type of `__arr<T,N>`, if `id` is an array
    pub fn element(&self, id: TypeId) -> Option<TypeId> {
        let ty = self.get(id);
        if ty.name == self.arr_base && ty.args.len() == 2 {
            Some(ty.args[0])
        } else {
            None
        }
    }

    /// Whether the type is a user-defined compound
    pub fn is_compound(&self, id: TypeId) -> bool {
        matches!(self.get(id).kind, TypeKind::Compound(_))
    }

    /// The compound payload, if the type is one
    pub fn as_compound(&self, id: TypeId) -> Option<&CompoundType> {
        match &self.get(id).kind {
            TypeKind::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    /// The function payload, if the type is one
    pub fn as_function(&self, id: TypeId) -> Option<&FunctionType> {
        match &self.get(id).kind {
            TypeKind::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Human-readable rendering (`__ptr<Point>`, `__arr<i32, 4>`), for
    /// diagnostics only; the wire format is [`mangle`]
    pub fn display(&self, id: TypeId, interner: &Interner) -> String {
        let ty = self.get(id);
        let base = interner.resolve(&ty.name);
        if ty.args.is_empty() {
            return base;
        }
        let args = ty
            .args
            .iter()
            .map(|&arg| self.display(arg, interner))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{base}<{args}>")
    }
}
