//! Lexical scope stack
//!
//! The symbol table layers a stack of lexical scopes over the current
//! namespace path. Each scope maps names to `(type, ordinal)` bindings and
//! owns an ordered drop list of compound-typed bindings (named locals and
//! nameless temporaries alike), appended at declaration time and drained in
//! reverse by [`SymbolTable::close_scope`] for destructor injection.

use ks_intern::Symbol;
use ks_ty::TypeId;
use rustc_hash::FxHashMap;

/// What kind of region a scope covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The function's outer scope, holding `this` and the parameters; its
    /// bindings are never destructed by the callee
    Function,
    /// Any nested block (function body, braced block, loop header, branch)
    Block,
}

/// A resolved local binding
#[derive(Debug, Clone, Copy)]
pub struct LocalVar {
    /// The binding's type
    pub ty: TypeId,
    /// Per-function slot ordinal
    pub ordinal: u32,
}

/// One pending destructor-injection entry
#[derive(Debug, Clone, Copy)]
pub struct DropEntry {
    /// Binding name (a generated `__tmpN` name for temporaries)
    pub name: Symbol,
    /// The binding's compound type
    pub ty: TypeId,
    /// Per-function slot ordinal
    pub ordinal: u32,
}

#[derive(Debug, Default)]
struct Scope {
    kind: Option<ScopeKind>,
    vars: FxHashMap<Symbol, LocalVar>,
    drops: Vec<DropEntry>,
}

/// Stack of lexical scopes, innermost last
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    next_ordinal: u32,
}

impl SymbolTable {
    /// Create an empty table for one function body
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a new innermost scope
    pub fn open_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind: Some(kind),
            ..Scope::default()
        });
    }

    /// Leave the innermost scope, returning its drop list in reverse
    /// declaration order (the destructor call order)
    pub fn close_scope(&mut self) -> Vec<DropEntry> {
        let mut scope = self.scopes.pop().unwrap_or_default();
        scope.drops.reverse();
        scope.drops
    }

    /// Declare a named binding in the innermost scope
    ///
    /// `record_drop` marks compound-typed bindings for destructor injection.
    /// Redeclaring a name in the *same* scope is an error; shadowing an
    /// outer scope is fine.
    pub fn declare(
        &mut self,
        name: Symbol,
        ty: TypeId,
        record_drop: bool,
    ) -> Result<u32, ()> {
        let scope = self.scopes.last_mut().expect("a scope is open");
        if scope.vars.contains_key(&name) {
            return Err(());
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        scope.vars.insert(name, LocalVar { ty, ordinal });
        if record_drop {
            scope.drops.push(DropEntry { name, ty, ordinal });
        }
        Ok(ordinal)
    }

    /// Declare a nameless temporary in the innermost scope
    ///
    /// Temporaries always join the drop list; their generated names are
    /// unique so no duplicate check is needed.
    pub fn declare_temp(&mut self, name: Symbol, ty: TypeId) -> u32 {
        let scope = self.scopes.last_mut().expect("a scope is open");
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        scope.vars.insert(name, LocalVar { ty, ordinal });
        scope.drops.push(DropEntry { name, ty, ordinal });
        ordinal
    }

    /// Resolve a name innermost-to-outermost
    pub fn lookup(&self, name: Symbol) -> Option<LocalVar> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(&name).copied())
    }

    /// Drop entries of every scope from the innermost back to, but not
    /// including, the function's outer scope, in destructor call order
    ///
    /// Used for `return`: bindings stay declared (the scopes remain open),
    /// only the destructor calls are emitted.
    pub fn drops_to_function(&self) -> Vec<DropEntry> {
        let mut entries = Vec::new();
        for scope in self.scopes.iter().rev() {
            if scope.kind == Some(ScopeKind::Function) {
                break;
            }
            entries.extend(scope.drops.iter().rev().copied());
        }
        entries
    }

    /// Every visible binding name, innermost first, for suggestions
    pub fn visible_names(&self) -> Vec<Symbol> {
        let mut names = Vec::new();
        for scope in self.scopes.iter().rev() {
            names.extend(scope.vars.keys().copied());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_intern::Interner;
    use ks_ty::TypeTable;

    #[test]
    fn shadowing_resolves_to_the_innermost_binding() {
        let interner = Interner::new();
        let types = TypeTable::new(&interner);
        let b = types.builtins();
        let name = interner.intern("x");

        let mut table = SymbolTable::new();
        table.open_scope(ScopeKind::Function);
        table.declare(name, b.i32, false).unwrap();
        table.open_scope(ScopeKind::Block);
        table.declare(name, b.float, false).unwrap();

        assert_eq!(table.lookup(name).unwrap().ty, b.float);
        table.close_scope();
        assert_eq!(table.lookup(name).unwrap().ty, b.i32);
    }

    #[test]
    fn same_scope_redeclaration_is_rejected() {
        let interner = Interner::new();
        let types = TypeTable::new(&interner);
        let b = types.builtins();
        let name = interner.intern("x");

        let mut table = SymbolTable::new();
        table.open_scope(ScopeKind::Block);
        table.declare(name, b.i32, false).unwrap();
        assert!(table.declare(name, b.i32, false).is_err());
    }

    #[test]
    fn close_scope_reverses_declaration_order() {
        let interner = Interner::new();
        let types = TypeTable::new(&interner);
        let b = types.builtins();

        let mut table = SymbolTable::new();
        table.open_scope(ScopeKind::Block);
        for name in ["a", "b", "c"] {
            table.declare(interner.intern(name), b.i32, true).unwrap();
        }
        let drops = table.close_scope();
        let order: Vec<String> = drops.iter().map(|d| interner.resolve(&d.name)).collect();
        assert_eq!(order, ["c", "b", "a"]);
    }

    #[test]
    fn temporaries_interleave_with_named_bindings() {
        let interner = Interner::new();
        let types = TypeTable::new(&interner);
        let b = types.builtins();

        let mut table = SymbolTable::new();
        table.open_scope(ScopeKind::Block);
        table.declare(interner.intern("a"), b.i32, true).unwrap();
        table.declare_temp(interner.intern("__tmp0"), b.i32);
        table.declare(interner.intern("b"), b.i32, true).unwrap();

        let drops = table.close_scope();
        let order: Vec<String> = drops.iter().map(|d| interner.resolve(&d.name)).collect();
        assert_eq!(order, ["b", "__tmp0", "a"]);
    }

    #[test]
    fn return_drops_stop_at_the_function_boundary() {
        let interner = Interner::new();
        let types = TypeTable::new(&interner);
        let b = types.builtins();

        let mut table = SymbolTable::new();
        table.open_scope(ScopeKind::Function);
        table.declare(interner.intern("param"), b.i32, true).unwrap();
        table.open_scope(ScopeKind::Block);
        table.declare(interner.intern("local"), b.i32, true).unwrap();
        table.open_scope(ScopeKind::Block);
        table.declare(interner.intern("inner"), b.i32, true).unwrap();

        let drops = table.drops_to_function();
        let order: Vec<String> = drops.iter().map(|d| interner.resolve(&d.name)).collect();
        assert_eq!(order, ["inner", "local"]);
    }
}
