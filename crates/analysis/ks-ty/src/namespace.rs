//! Namespace tree
//!
//! Namespaces form a tree rooted at the compilation unit. Nodes are stored
//! in a flat vector and reference each other by id, never by pointer. Each
//! node owns its child table, named-type table, type-alias table and
//! function overload-sets; children are created lazily on first reference.

use crate::{mangle, TypeId, TypeTable};
use ks_intern::{Interner, Symbol};
use rustc_hash::FxHashMap;

/// Unique identifier for a namespace node
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct NamespaceId(pub u32);

/// A single namespace node
#[derive(Debug, Clone, Default)]
struct NamespaceNode {
    parent: Option<NamespaceId>,
    children: FxHashMap<Symbol, NamespaceId>,
    types: FxHashMap<Symbol, TypeId>,
    aliases: FxHashMap<Symbol, TypeId>,
    functions: FxHashMap<Symbol, Vec<TypeId>>,
}

/// The namespace tree of one compilation unit
#[derive(Debug, Clone)]
pub struct NamespaceTree {
    nodes: Vec<NamespaceNode>,
    root: NamespaceId,
}

impl NamespaceTree {
    /// Create a tree holding only the root namespace
    pub fn new() -> Self {
        Self {
            nodes: vec![NamespaceNode::default()],
            root: NamespaceId(0),
        }
    }

    /// The root (compilation-unit) namespace
    pub fn root(&self) -> NamespaceId {
        self.root
    }

    /// Parent of a namespace, `None` for the root
    pub fn parent(&self, ns: NamespaceId) -> Option<NamespaceId> {
        self.nodes[ns.0 as usize].parent
    }

    /// The child namespace of the given name, created on first reference
    pub fn child(&mut self, parent: NamespaceId, name: Symbol) -> NamespaceId {
        if let Some(&existing) = self.nodes[parent.0 as usize].children.get(&name) {
            return existing;
        }
        let id = NamespaceId(self.nodes.len() as u32);
        self.nodes.push(NamespaceNode {
            parent: Some(parent),
            ..NamespaceNode::default()
        });
        self.nodes[parent.0 as usize].children.insert(name, id);
        id
    }

    /// The child namespace of the given name, if it exists
    pub fn find_child(&self, parent: NamespaceId, name: Symbol) -> Option<NamespaceId> {
        self.nodes[parent.0 as usize].children.get(&name).copied()
    }

    /// Register a named type in a namespace; a later registration under the
    /// same name wins
    pub fn define_type(&mut self, ns: NamespaceId, name: Symbol, ty: TypeId) {
        self.nodes[ns.0 as usize].types.insert(name, ty);
    }

    /// Register a type alias in a namespace
    pub fn define_alias(&mut self, ns: NamespaceId, name: Symbol, target: TypeId) {
        self.nodes[ns.0 as usize].aliases.insert(name, target);
    }

    /// Append a function to its overload-set in a namespace
    ///
    /// There is no duplicate check; a declaration whose full mangled name
    /// collides with an existing entry overwrites that entry in place, so
    /// the set never exposes two identical symbols. Returns the replaced
    /// entry when that happens.
    pub fn add_function(
        &mut self,
        ns: NamespaceId,
        name: Symbol,
        func: TypeId,
        types: &TypeTable,
        interner: &Interner,
    ) -> Option<TypeId> {
        let mangled = mangle::mangled_name(types, interner, func);
        let set = self.nodes[ns.0 as usize].functions.entry(name).or_default();
        if let Some(slot) = set
            .iter()
            .position(|&existing| mangle::mangled_name(types, interner, existing) == mangled)
        {
            let replaced = set[slot];
            set[slot] = func;
            Some(replaced)
        } else {
            set.push(func);
            None
        }
    }

    /// The overload-set registered directly in a namespace
    pub fn functions_in(&self, ns: NamespaceId, name: Symbol) -> Option<&[TypeId]> {
        self.nodes[ns.0 as usize]
            .functions
            .get(&name)
            .map(Vec::as_slice)
    }

    /// The type registered directly in a namespace (aliases first)
    pub fn type_in(&self, ns: NamespaceId, name: Symbol) -> Option<TypeId> {
        let node = &self.nodes[ns.0 as usize];
        node.aliases
            .get(&name)
            .or_else(|| node.types.get(&name))
            .copied()
    }

    /// Resolve a type name from `from` outward through parent namespaces
    pub fn lookup_type(&self, from: NamespaceId, name: Symbol) -> Option<TypeId> {
        let mut current = Some(from);
        while let Some(ns) = current {
            if let Some(ty) = self.type_in(ns, name) {
                return Some(ty);
            }
            current = self.parent(ns);
        }
        None
    }

    /// Resolve a function overload-set from `from` outward
    pub fn lookup_function(&self, from: NamespaceId, name: Symbol) -> Option<&[TypeId]> {
        let mut current = Some(from);
        while let Some(ns) = current {
            if let Some(set) = self.functions_in(ns, name) {
                return Some(set);
            }
            current = self.parent(ns);
        }
        None
    }

    /// Resolve a `::`-qualified namespace path
    ///
    /// The first segment is searched outward from `from`; the remaining
    /// segments descend strictly inward.
    pub fn lookup_path(&self, from: NamespaceId, path: &[Symbol]) -> Option<NamespaceId> {
        let (&first, rest) = path.split_first()?;

        let mut head = None;
        let mut current = Some(from);
        while let Some(ns) = current {
            if let Some(child) = self.find_child(ns, first) {
                head = Some(child);
                break;
            }
            current = self.parent(ns);
        }

        let mut ns = head?;
        for &segment in rest {
            ns = self.find_child(ns, segment)?;
        }
        Some(ns)
    }

    /// All names with function overload-sets visible from `from`, used for
    /// near-miss suggestions in diagnostics
    pub fn visible_function_names(&self, from: NamespaceId) -> Vec<Symbol> {
        let mut names = Vec::new();
        let mut current = Some(from);
        while let Some(ns) = current {
            names.extend(self.nodes[ns.0 as usize].functions.keys().copied());
            current = self.parent(ns);
        }
        names
    }
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}
