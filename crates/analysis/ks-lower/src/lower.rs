//! Untyped tree → typed AST lowering
//!
//! Lowering runs in a fixed pass order so forward references across the
//! whole file resolve: class names are declared first, then aliases, then
//! class layouts (with the implicit `new`), then every function and method
//! prototype; only then are bodies lowered. Template instantiations
//! discovered along the way register their shape and prototypes immediately
//! and queue their method bodies behind the main body queue.

use crate::error::SemanticError;
use crate::symbols::{DropEntry, ScopeKind, SymbolTable};
use ks_arena::Arena;
use ks_hir::{AstContext, Body, Expr, ExprId, FunctionBody};
use ks_intern::{Interner, Symbol};
use ks_span::Span;
use ks_syntax::{self as ast, BinOp, UnOp};
use ks_ty::{
    mangle, CompoundType, FunctionType, Member, NamespaceId, Param, TypeId, TypeKind,
    BUILTIN_NAMES,
};
use miette::SourceSpan;
use rustc_hash::FxHashMap;

type LowerResult<T> = Result<T, SemanticError>;

/// A class template awaiting instantiation
#[derive(Clone)]
struct ClassTemplate {
    params: Vec<Symbol>,
    decl: ast::ClassDecl,
    ns: NamespaceId,
}

/// A function body queued for the lowering pass
#[derive(Clone)]
struct BodyJob {
    func: TypeId,
    decl: ast::FnDecl,
    owner: Option<TypeId>,
    ns: NamespaceId,
    subst: FxHashMap<Symbol, TypeId>,
}

/// What a function declaration inside a class body is
#[derive(Clone, Copy, PartialEq, Eq)]
enum MethodRole {
    Method,
    Constructor,
    Destructor,
}

/// Lower a parsed unit into the backend-facing registry
///
/// The first semantic error aborts the whole unit.
pub fn lower_unit(
    unit: &ast::Unit,
    interner: &Interner,
    file_name: &str,
    source: &str,
) -> LowerResult<AstContext> {
    let mut lowering = LoweringContext::new(interner, file_name, source);
    let root = lowering.ctx.namespaces.root();

    lowering.declare_classes(&unit.decls, root);
    lowering.register_aliases(&unit.decls, root)?;
    lowering.register_layouts(&unit.decls, root)?;
    lowering.register_prototypes(&unit.decls, root)?;

    // The queue grows while template instantiations are discovered, so this
    // is an index walk rather than an iterator.
    let mut index = 0;
    while index < lowering.jobs.len() {
        let job = lowering.jobs[index].clone();
        index += 1;
        // A declaration whose mangled name was overwritten by a later one
        // is gone from the registry; its body must not reach the backend.
        if !lowering.ctx.prototypes.contains(&job.func) {
            continue;
        }
        lowering.lower_body(&job)?;
    }

    Ok(lowering.ctx)
}

/// All state threaded through registration and lowering
pub struct LoweringContext<'i> {
    interner: &'i Interner,
    file_name: String,
    source: String,
    ctx: AstContext,
    symbols: SymbolTable,
    current_ns: NamespaceId,
    templates: FxHashMap<(NamespaceId, Symbol), ClassTemplate>,
    instantiations: FxHashMap<(NamespaceId, Symbol, Vec<TypeId>), TypeId>,
    subst: Vec<FxHashMap<Symbol, TypeId>>,
    jobs: Vec<BodyJob>,
    sym_this: Symbol,
    sym_new: Symbol,
}

impl<'i> LoweringContext<'i> {
    fn new(interner: &'i Interner, file_name: &str, source: &str) -> Self {
        let ctx = AstContext::new(interner);
        let mut lowering = Self {
            interner,
            file_name: file_name.to_string(),
            source: source.to_string(),
            current_ns: ctx.namespaces.root(),
            ctx,
            symbols: SymbolTable::new(),
            templates: FxHashMap::default(),
            instantiations: FxHashMap::default(),
            subst: Vec::new(),
            jobs: Vec::new(),
            sym_this: interner.intern("this"),
            sym_new: interner.intern("new"),
        };
        lowering.register_builtin_names();
        lowering
    }

    /// Make the builtin scalars resolvable through the namespace chain
    fn register_builtin_names(&mut self) {
        let root = self.ctx.namespaces.root();
        for name in BUILTIN_NAMES {
            let sym = self.interner.intern(name);
            if let Some(ty) = self.ctx.types.lookup(sym, &[]) {
                self.ctx.namespaces.define_type(root, sym, ty);
            }
        }
    }

    // ---- diagnostics -----------------------------------------------------

    fn src(&self) -> miette::NamedSource<String> {
        miette::NamedSource::new(&self.file_name, self.source.clone())
    }

    fn sspan(span: Span) -> SourceSpan {
        (span.start as usize, span.len().max(1) as usize).into()
    }

    fn display_ty(&self, ty: TypeId) -> String {
        self.ctx.types.display(ty, self.interner)
    }

    fn render_args(&self, tys: &[TypeId]) -> String {
        tys.iter()
            .map(|&ty| self.display_ty(ty))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_type_name(&self, name: &ast::TypeName) -> String {
        let path = name
            .path
            .iter()
            .map(|segment| self.interner.resolve(segment))
            .collect::<Vec<_>>()
            .join("::");
        if name.args.is_empty() {
            return path;
        }
        let args = name
            .args
            .iter()
            .map(|arg| match arg {
                ast::TypeArg::Type(inner) => self.render_type_name(inner),
                ast::TypeArg::Literal(value) => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{path}<{args}>")
    }

    fn err_unknown_type(&self, name: &ast::TypeName) -> SemanticError {
        SemanticError::UnknownType {
            name: self.render_type_name(name),
            span: Self::sspan(name.span),
            src: self.src(),
        }
    }

    fn err_unknown_ident(&self, name: &str, span: Span) -> SemanticError {
        let mut candidates = self.symbols.visible_names();
        candidates.extend(
            self.ctx
                .namespaces
                .visible_function_names(self.current_ns),
        );
        SemanticError::UnknownIdentifier {
            name: name.to_string(),
            suggestion: SemanticError::suggest(name, self.interner, &candidates),
            span: Self::sspan(span),
            src: self.src(),
        }
    }

    fn err_mismatch(&self, expected: String, found: String, span: Span) -> SemanticError {
        SemanticError::TypeMismatch {
            expected,
            found,
            span: Self::sspan(span),
            src: self.src(),
        }
    }

    fn err_member(&self, ty: TypeId, member: Symbol, span: Span) -> SemanticError {
        SemanticError::InvalidMemberAccess {
            ty: self.display_ty(ty),
            member: self.interner.resolve(&member),
            span: Self::sspan(span),
            src: self.src(),
        }
    }

    fn err_overload(&self, name: &str, args: &[TypeId], span: Span) -> SemanticError {
        SemanticError::NoSuitableOverload {
            name: name.to_string(),
            args: self.render_args(args),
            span: Self::sspan(span),
            src: self.src(),
        }
    }

    fn err_not_assignable(&self, span: Span) -> SemanticError {
        SemanticError::InvalidAssignmentTarget {
            span: Self::sspan(span),
            src: self.src(),
        }
    }

    fn err_duplicate(&self, name: Symbol, span: Span) -> SemanticError {
        SemanticError::DuplicateDeclaration {
            name: self.interner.resolve(&name),
            span: Self::sspan(span),
            src: self.src(),
        }
    }

    // ---- pass 1a: class names and template definitions -------------------

    fn declare_classes(&mut self, decls: &[ast::Decl], ns: NamespaceId) {
        for decl in decls {
            match decl {
                ast::Decl::Class(class) if class.template_params.is_empty() => {
                    let ty = self.ctx.types.alloc_raw(
                        class.name,
                        Vec::new(),
                        TypeKind::Compound(CompoundType::default()),
                    );
                    self.ctx.namespaces.define_type(ns, class.name, ty);
                    self.ctx.classes.push(ty);
                }
                ast::Decl::Class(class) => {
                    self.templates.insert(
                        (ns, class.name),
                        ClassTemplate {
                            params: class.template_params.clone(),
                            decl: class.clone(),
                            ns,
                        },
                    );
                }
                ast::Decl::Namespace(inner) => {
                    let child = self.ctx.namespaces.child(ns, inner.name);
                    self.declare_classes(&inner.decls, child);
                }
                ast::Decl::Function(_) | ast::Decl::Alias(_) => {}
            }
        }
    }

    // ---- pass 1b: aliases, then member layouts ---------------------------

    fn register_aliases(&mut self, decls: &[ast::Decl], ns: NamespaceId) -> LowerResult<()> {
        for decl in decls {
            match decl {
                ast::Decl::Alias(alias) => {
                    self.current_ns = ns;
                    let target = self.resolve_type_name(&alias.target)?;
                    self.ctx.namespaces.define_alias(ns, alias.name, target);
                }
                ast::Decl::Namespace(inner) => {
                    let child = self.ctx.namespaces.child(ns, inner.name);
                    self.register_aliases(&inner.decls, child)?;
                }
                ast::Decl::Class(_) | ast::Decl::Function(_) => {}
            }
        }
        Ok(())
    }

    fn register_layouts(&mut self, decls: &[ast::Decl], ns: NamespaceId) -> LowerResult<()> {
        for decl in decls {
            match decl {
                ast::Decl::Class(class) if class.template_params.is_empty() => {
                    self.current_ns = ns;
                    let ty = self
                        .ctx
                        .namespaces
                        .type_in(ns, class.name)
                        .expect("declared in the first pass");
                    self.fill_class_layout(class, ty)?;
                }
                ast::Decl::Namespace(inner) => {
                    let child = self.ctx.namespaces.child(ns, inner.name);
                    self.register_layouts(&inner.decls, child)?;
                }
                ast::Decl::Class(_) | ast::Decl::Function(_) | ast::Decl::Alias(_) => {}
            }
        }
        Ok(())
    }

    /// Resolve and attach the member layout, then the implicit `new`
    ///
    /// Member order is the declaration order and never changes afterwards.
    fn fill_class_layout(&mut self, class: &ast::ClassDecl, ty: TypeId) -> LowerResult<()> {
        let mut members = Vec::with_capacity(class.members.len());
        for member in &class.members {
            members.push(Member {
                name: member.name,
                ty: self.resolve_type_name(&member.ty)?,
            });
        }
        if let TypeKind::Compound(compound) = &mut self.ctx.types.get_mut(ty).kind {
            compound.members = members;
        }
        self.register_implicit_new(ty);
        Ok(())
    }

    /// Every class gets a zero-argument `new` returning `__ptr<T>`; the
    /// backend implements it via the runtime allocator, so it appears in the
    /// prototype registry with no body
    fn register_implicit_new(&mut self, class: TypeId) {
        let ret = self.ctx.types.ptr_to(class);
        let func = self.ctx.types.alloc_function(
            self.sym_new,
            FunctionType {
                params: Vec::new(),
                ret,
                owner: Some(class),
                external: false,
            },
        );
        let replaced = self.attach_method(class, self.sym_new, func);
        self.push_prototype(func, replaced);
    }

    // ---- pass 2: function and method prototypes --------------------------

    fn register_prototypes(&mut self, decls: &[ast::Decl], ns: NamespaceId) -> LowerResult<()> {
        for decl in decls {
            match decl {
                ast::Decl::Function(func) => {
                    self.current_ns = ns;
                    self.register_free_function(func, ns)?;
                }
                ast::Decl::Class(class) if class.template_params.is_empty() => {
                    self.current_ns = ns;
                    let ty = self
                        .ctx
                        .namespaces
                        .type_in(ns, class.name)
                        .expect("declared in the first pass");
                    self.register_class_prototypes(class, ty, FxHashMap::default())?;
                }
                ast::Decl::Namespace(inner) => {
                    let child = self.ctx.namespaces.child(ns, inner.name);
                    self.register_prototypes(&inner.decls, child)?;
                }
                ast::Decl::Class(_) | ast::Decl::Alias(_) => {}
            }
        }
        Ok(())
    }

    fn register_free_function(&mut self, decl: &ast::FnDecl, ns: NamespaceId) -> LowerResult<()> {
        let func = self.build_signature(decl, None)?;
        let replaced =
            self.ctx
                .namespaces
                .add_function(ns, decl.name, func, &self.ctx.types, self.interner);
        self.push_prototype(func, replaced);
        self.queue_body(func, decl, None, ns, FxHashMap::default());
        Ok(())
    }

    fn register_class_prototypes(
        &mut self,
        class: &ast::ClassDecl,
        ty: TypeId,
        subst: FxHashMap<Symbol, TypeId>,
    ) -> LowerResult<()> {
        self.subst.push(subst.clone());
        let result = (|| -> LowerResult<()> {
            for method in &class.methods {
                self.register_method(ty, method, MethodRole::Method, subst.clone())?;
            }
            for ctor in &class.constructors {
                self.register_method(ty, ctor, MethodRole::Constructor, subst.clone())?;
            }
            if let Some(dtor) = &class.destructor {
                self.register_method(ty, dtor, MethodRole::Destructor, subst.clone())?;
            }
            Ok(())
        })();
        self.subst.pop();
        result
    }

    fn register_method(
        &mut self,
        class: TypeId,
        decl: &ast::FnDecl,
        role: MethodRole,
        subst: FxHashMap<Symbol, TypeId>,
    ) -> LowerResult<()> {
        let func = self.build_signature(decl, Some(class))?;
        let replaced = match role {
            MethodRole::Method => self.attach_method(class, decl.name, func),
            MethodRole::Constructor => self.attach_constructor(class, func),
            MethodRole::Destructor => self.set_destructor(class, func),
        };
        self.push_prototype(func, replaced);
        self.queue_body(func, decl, Some(class), self.current_ns, subst);
        Ok(())
    }

    fn build_signature(&mut self, decl: &ast::FnDecl, owner: Option<TypeId>) -> LowerResult<TypeId> {
        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            params.push(Param {
                name: param.name,
                ty: self.resolve_type_name(&param.ty)?,
            });
        }
        let ret = match &decl.ret {
            Some(name) => self.resolve_type_name(name)?,
            None => self.ctx.types.builtins().void,
        };
        Ok(self.ctx.types.alloc_function(
            decl.name,
            FunctionType {
                params,
                ret,
                owner,
                external: decl.external,
            },
        ))
    }

    fn queue_body(
        &mut self,
        func: TypeId,
        decl: &ast::FnDecl,
        owner: Option<TypeId>,
        ns: NamespaceId,
        subst: FxHashMap<Symbol, TypeId>,
    ) {
        if decl.body.is_some() {
            self.jobs.push(BodyJob {
                func,
                decl: decl.clone(),
                owner,
                ns,
                subst,
            });
        }
    }

    /// Attach a method to its overload-set, overwriting an entry whose
    /// mangled name collides (the later declaration wins)
    fn attach_method(&mut self, class: TypeId, name: Symbol, func: TypeId) -> Option<TypeId> {
        let mangled = mangle::mangled_name(&self.ctx.types, self.interner, func);
        let slot = self
            .ctx
            .types
            .as_compound(class)
            .and_then(|compound| compound.methods.get(&name))
            .and_then(|set| {
                set.iter().position(|&existing| {
                    mangle::mangled_name(&self.ctx.types, self.interner, existing) == mangled
                })
            });
        let TypeKind::Compound(compound) = &mut self.ctx.types.get_mut(class).kind else {
            return None;
        };
        let set = compound.methods.entry(name).or_default();
        if let Some(index) = slot {
            let replaced = set[index];
            set[index] = func;
            Some(replaced)
        } else {
            set.push(func);
            None
        }
    }

    fn attach_constructor(&mut self, class: TypeId, func: TypeId) -> Option<TypeId> {
        let mangled = mangle::mangled_name(&self.ctx.types, self.interner, func);
        let slot = self.ctx.types.as_compound(class).and_then(|compound| {
            compound.constructors.iter().position(|&existing| {
                mangle::mangled_name(&self.ctx.types, self.interner, existing) == mangled
            })
        });
        let TypeKind::Compound(compound) = &mut self.ctx.types.get_mut(class).kind else {
            return None;
        };
        if let Some(index) = slot {
            let replaced = compound.constructors[index];
            compound.constructors[index] = func;
            Some(replaced)
        } else {
            compound.constructors.push(func);
            None
        }
    }

    fn set_destructor(&mut self, class: TypeId, func: TypeId) -> Option<TypeId> {
        let TypeKind::Compound(compound) = &mut self.ctx.types.get_mut(class).kind else {
            return None;
        };
        compound.destructor.replace(func)
    }

    /// Keep the prototype registry free of colliding symbols: a replaced
    /// overload-set entry is replaced here too
    fn push_prototype(&mut self, func: TypeId, replaced: Option<TypeId>) {
        if let Some(old) = replaced {
            if let Some(slot) = self.ctx.prototypes.iter().position(|&p| p == old) {
                self.ctx.prototypes[slot] = func;
                return;
            }
        }
        self.ctx.prototypes.push(func);
    }

    // ---- type resolution -------------------------------------------------

    /// Resolve a written type name against substitutions, the namespace
    /// chain (aliases first), structural generics and class templates
    fn resolve_type_name(&mut self, name: &ast::TypeName) -> LowerResult<TypeId> {
        if name.path.len() == 1 && name.args.is_empty() {
            if let Some(&ty) = self.subst.last().and_then(|map| map.get(&name.path[0])) {
                return Ok(ty);
            }
        }

        let base = name.base();
        let ns_scope = if name.path.len() > 1 {
            let prefix = &name.path[..name.path.len() - 1];
            Some(
                self.ctx
                    .namespaces
                    .lookup_path(self.current_ns, prefix)
                    .ok_or_else(|| self.err_unknown_type(name))?,
            )
        } else {
            None
        };

        let mut args = Vec::with_capacity(name.args.len());
        for arg in &name.args {
            match arg {
                ast::TypeArg::Type(inner) => args.push(self.resolve_type_name(inner)?),
                ast::TypeArg::Literal(value) => {
                    args.push(self.ctx.types.literal(*value, self.interner));
                }
            }
        }

        // Unknown generic bases __ptr/__arr synthesize structurally.
        if self.ctx.types.is_structural_base(base) && !args.is_empty() {
            return Ok(self.ctx.types.intern(base, args, TypeKind::Builtin));
        }

        if args.is_empty() {
            let found = match ns_scope {
                Some(ns) => self.ctx.namespaces.type_in(ns, base),
                None => self.ctx.namespaces.lookup_type(self.current_ns, base),
            };
            return found.ok_or_else(|| self.err_unknown_type(name));
        }

        let template_ns = self
            .find_template(ns_scope, base)
            .ok_or_else(|| self.err_unknown_type(name))?;
        self.instantiate(template_ns, base, &args, name)
    }

    /// Find the namespace defining a template, searching outward unless an
    /// explicit namespace path was written
    fn find_template(&self, ns_scope: Option<NamespaceId>, base: Symbol) -> Option<NamespaceId> {
        if let Some(ns) = ns_scope {
            return self.templates.contains_key(&(ns, base)).then_some(ns);
        }
        let mut current = Some(self.current_ns);
        while let Some(ns) = current {
            if self.templates.contains_key(&(ns, base)) {
                return Some(ns);
            }
            current = self.ctx.namespaces.parent(ns);
        }
        None
    }

    /// Instantiate a class template for an argument list, or return the
    /// cached instantiation for a list already seen
    fn instantiate(
        &mut self,
        template_ns: NamespaceId,
        base: Symbol,
        args: &[TypeId],
        name: &ast::TypeName,
    ) -> LowerResult<TypeId> {
        let key = (template_ns, base, args.to_vec());
        if let Some(&cached) = self.instantiations.get(&key) {
            return Ok(cached);
        }

        let template = self.templates[&(template_ns, base)].clone();
        if template.params.len() != args.len() {
            return Err(self.err_unknown_type(name));
        }

        let ty = self.ctx.types.alloc_raw(
            base,
            args.to_vec(),
            TypeKind::Compound(CompoundType::default()),
        );
        self.instantiations.insert(key, ty);
        self.ctx.classes.push(ty);

        let subst: FxHashMap<Symbol, TypeId> = template
            .params
            .iter()
            .copied()
            .zip(args.iter().copied())
            .collect();

        // The template body re-registers under the substituted types, in
        // the namespace that declared it.
        let saved_ns = self.current_ns;
        self.current_ns = template.ns;
        self.subst.push(subst.clone());
        let result = self
            .fill_class_layout(&template.decl, ty)
            .and_then(|()| self.register_class_prototypes(&template.decl, ty, subst));
        self.subst.pop();
        self.current_ns = saved_ns;
        result?;

        Ok(ty)
    }

    // ---- pass 3: body lowering -------------------------------------------

    fn lower_body(&mut self, job: &BodyJob) -> LowerResult<()> {
        self.current_ns = job.ns;
        self.subst.push(job.subst.clone());

        self.symbols = SymbolTable::new();
        self.symbols.open_scope(ScopeKind::Function);

        // Methods, constructors and destructors see `this`.
        if let Some(owner) = job.owner {
            let this_ty = self.ctx.types.ptr_to(owner);
            let _ = self.symbols.declare(self.sym_this, this_ty, false);
        }

        let params = self
            .ctx
            .types
            .as_function(job.func)
            .map(|func| func.params.clone())
            .unwrap_or_default();
        for (param, decl) in params.iter().zip(&job.decl.params) {
            self.symbols
                .declare(param.name, param.ty, false)
                .map_err(|()| self.err_duplicate(param.name, decl.span))?;
        }

        let mut exprs = Arena::new();
        let body_stmt = job.decl.body.as_ref().expect("queued jobs carry bodies");
        let root = self.lower_block(&mut exprs, body_stmt)?;

        self.symbols.close_scope();
        self.subst.pop();

        let mangled = mangle::mangled_name(&self.ctx.types, self.interner, job.func);
        self.ctx.bodies.push(FunctionBody {
            func: job.func,
            mangled,
            body: Body { exprs, root },
        });
        Ok(())
    }

    /// Lower a braced block in a fresh scope; destructor calls for the
    /// scope's bindings are appended before the block closes
    fn lower_block(&mut self, exprs: &mut Arena<Expr>, stmt: &ast::Stmt) -> LowerResult<ExprId> {
        let ast::Stmt::Compound { stmts, .. } = stmt else {
            return self.lower_branch(exprs, stmt);
        };
        self.symbols.open_scope(ScopeKind::Block);
        let mut lowered = Vec::with_capacity(stmts.len());
        for inner in stmts {
            lowered.push(self.lower_stmt(exprs, inner)?);
        }
        self.append_scope_drops(exprs, &mut lowered);
        Ok(exprs.alloc(Expr::Block { stmts: lowered }))
    }

    /// Branch bodies get their own scope even without braces, so a
    /// definition in a single-statement branch still drops at branch exit
    fn lower_branch(&mut self, exprs: &mut Arena<Expr>, stmt: &ast::Stmt) -> LowerResult<ExprId> {
        if matches!(stmt, ast::Stmt::Compound { .. }) {
            return self.lower_block(exprs, stmt);
        }
        self.symbols.open_scope(ScopeKind::Block);
        let mut lowered = vec![self.lower_stmt(exprs, stmt)?];
        self.append_scope_drops(exprs, &mut lowered);
        Ok(exprs.alloc(Expr::Block { stmts: lowered }))
    }

    fn append_scope_drops(&mut self, exprs: &mut Arena<Expr>, out: &mut Vec<ExprId>) {
        for entry in self.symbols.close_scope() {
            if let Some(call) = self.drop_call(exprs, entry) {
                out.push(call);
            }
        }
    }

    /// The destructor call for one binding; `None` when its class has no
    /// destructor (builtins never reach here)
    fn drop_call(&mut self, exprs: &mut Arena<Expr>, entry: DropEntry) -> Option<ExprId> {
        let dtor = self.ctx.types.as_compound(entry.ty)?.destructor?;
        let mangled = mangle::mangled_name(&self.ctx.types, self.interner, dtor);
        let ret = self.ctx.types.as_function(dtor).map_or_else(
            || self.ctx.types.builtins().void,
            |func| func.ret,
        );
        let receiver = exprs.alloc(Expr::Variable {
            name: entry.name,
            ordinal: entry.ordinal,
            ty: entry.ty,
        });
        Some(exprs.alloc(Expr::Call {
            target: dtor,
            mangled,
            receiver: Some(receiver),
            args: Vec::new(),
            ty: ret,
        }))
    }

    fn lower_stmt(&mut self, exprs: &mut Arena<Expr>, stmt: &ast::Stmt) -> LowerResult<ExprId> {
        match stmt {
            ast::Stmt::Compound { .. } => self.lower_block(exprs, stmt),
            ast::Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.lower_expr(exprs, cond)?;
                let then_branch = self.lower_branch(exprs, then_branch)?;
                let else_branch = match else_branch {
                    Some(branch) => Some(self.lower_branch(exprs, branch)?),
                    None => None,
                };
                Ok(exprs.alloc(Expr::If {
                    cond,
                    then_branch,
                    else_branch,
                }))
            }
            ast::Stmt::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                // The loop header is its own scope: a definition in the
                // initializer lives exactly as long as the loop.
                self.symbols.open_scope(ScopeKind::Block);
                let init = match init {
                    Some(stmt) => Some(self.lower_stmt(exprs, stmt)?),
                    None => None,
                };
                let cond = match cond {
                    Some(stmt) => Some(self.lower_expr(exprs, stmt)?),
                    None => None,
                };
                let step = match step {
                    Some(stmt) => Some(self.lower_expr(exprs, stmt)?),
                    None => None,
                };
                let body = self.lower_branch(exprs, body)?;
                let for_node = exprs.alloc(Expr::For {
                    init,
                    cond,
                    step,
                    body,
                });
                let mut lowered = vec![for_node];
                self.append_scope_drops(exprs, &mut lowered);
                if lowered.len() == 1 {
                    Ok(for_node)
                } else {
                    Ok(exprs.alloc(Expr::Block { stmts: lowered }))
                }
            }
            ast::Stmt::Return { value, .. } => {
                let value = match value {
                    Some(stmt) => Some(self.lower_expr(exprs, stmt)?),
                    None => None,
                };
                // Destructors for everything alive inside the function run
                // before the return, innermost scope first.
                let mut lowered = Vec::new();
                for entry in self.symbols.drops_to_function() {
                    if let Some(call) = self.drop_call(exprs, entry) {
                        lowered.push(call);
                    }
                }
                let ret = exprs.alloc(Expr::Return { value });
                if lowered.is_empty() {
                    Ok(ret)
                } else {
                    lowered.push(ret);
                    Ok(exprs.alloc(Expr::Block { stmts: lowered }))
                }
            }
            ast::Stmt::VarDef {
                ty,
                name,
                init,
                span,
            } => {
                let ty = self.resolve_type_name(ty)?;
                let record_drop = self.ctx.types.is_compound(ty);
                let ordinal = self
                    .symbols
                    .declare(*name, ty, record_drop)
                    .map_err(|()| self.err_duplicate(*name, *span))?;
                // The initializer's type is deliberately not checked against
                // the declared type.
                let init = match init {
                    Some(stmt) => Some(self.lower_expr(exprs, stmt)?),
                    None => None,
                };
                Ok(exprs.alloc(Expr::VarDef {
                    name: *name,
                    ordinal,
                    ty,
                    init,
                }))
            }
            _ => self.lower_expr(exprs, stmt),
        }
    }

    fn lower_expr(&mut self, exprs: &mut Arena<Expr>, stmt: &ast::Stmt) -> LowerResult<ExprId> {
        match stmt {
            ast::Stmt::Integer { value, .. } => Ok(exprs.alloc(Expr::Integer {
                value: *value,
                ty: self.ctx.types.builtins().i32,
            })),
            ast::Stmt::Float { value, .. } => Ok(exprs.alloc(Expr::Float {
                value: *value,
                ty: self.ctx.types.builtins().float,
            })),
            ast::Stmt::Variable { path, span } => {
                if path.len() == 1 {
                    if let Some(local) = self.symbols.lookup(path[0]) {
                        return Ok(exprs.alloc(Expr::Variable {
                            name: path[0],
                            ordinal: local.ordinal,
                            ty: local.ty,
                        }));
                    }
                }
                let joined = path
                    .iter()
                    .map(|segment| self.interner.resolve(segment))
                    .collect::<Vec<_>>()
                    .join("::");
                Err(self.err_unknown_ident(&joined, *span))
            }
            ast::Stmt::Unary { op, operand, span } => self.lower_unary(exprs, *op, operand, *span),
            ast::Stmt::Binary {
                op,
                lhs,
                rhs,
                span,
            } => self.lower_binary(exprs, *op, lhs, rhs, *span),
            ast::Stmt::Member {
                base,
                field,
                arrow,
                span,
            } => {
                let (receiver, receiver_ty) =
                    self.lower_member_base(exprs, base, *arrow, *field, *span)?;
                let Some(compound) = self.ctx.types.as_compound(receiver_ty) else {
                    return Err(self.err_member(receiver_ty, *field, *span));
                };
                let Some(index) = compound.member_index(*field) else {
                    return Err(self.err_member(receiver_ty, *field, *span));
                };
                let ty = compound.members[index].ty;
                Ok(exprs.alloc(Expr::Member {
                    base: receiver,
                    index: index as u32,
                    ty,
                }))
            }
            ast::Stmt::Index { base, args, span } => {
                let base_id = self.lower_expr(exprs, base)?;
                let base_ty = self.expr_ty(exprs, base_id);
                let Some(element) = self.ctx.types.element(base_ty) else {
                    return Err(self.err_mismatch(
                        "__arr<_, _>".to_string(),
                        self.display_ty(base_ty),
                        *span,
                    ));
                };
                if args.len() != 1 {
                    return Err(self.err_mismatch(
                        "a single subscript argument".to_string(),
                        format!("{} arguments", args.len()),
                        *span,
                    ));
                }
                let index = self.lower_expr(exprs, &args[0])?;
                Ok(exprs.alloc(Expr::Index {
                    base: base_id,
                    index,
                    ty: element,
                }))
            }
            ast::Stmt::Call { callee, args, span } => {
                self.lower_call(exprs, callee, args, *span)
            }
            ast::Stmt::TypeRef { name, span } => {
                Err(self.err_unknown_ident(&self.render_type_name(name), *span))
            }
            _ => self.lower_stmt(exprs, stmt),
        }
    }

    fn expr_ty(&self, exprs: &Arena<Expr>, id: ExprId) -> TypeId {
        exprs[id].ty().unwrap_or(self.ctx.types.builtins().void)
    }

    fn lower_unary(
        &mut self,
        exprs: &mut Arena<Expr>,
        op: UnOp,
        operand: &ast::Stmt,
        span: Span,
    ) -> LowerResult<ExprId> {
        let operand_id = self.lower_expr(exprs, operand)?;
        let operand_ty = self.expr_ty(exprs, operand_id);
        let ty = match op {
            UnOp::Neg | UnOp::BitNot => operand_ty,
            UnOp::Not => self.ctx.types.builtins().bool,
            UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                if !exprs[operand_id].is_place() {
                    return Err(self.err_not_assignable(span));
                }
                operand_ty
            }
            UnOp::Deref => self.ctx.types.pointee(operand_ty).ok_or_else(|| {
                self.err_mismatch("__ptr<_>".to_string(), self.display_ty(operand_ty), span)
            })?,
            UnOp::AddrOf => {
                if !exprs[operand_id].is_place() {
                    return Err(self.err_not_assignable(span));
                }
                self.ctx.types.ptr_to(operand_ty)
            }
        };
        Ok(exprs.alloc(Expr::Unary {
            op,
            operand: operand_id,
            ty,
        }))
    }

    fn lower_binary(
        &mut self,
        exprs: &mut Arena<Expr>,
        op: BinOp,
        lhs: &ast::Stmt,
        rhs: &ast::Stmt,
        span: Span,
    ) -> LowerResult<ExprId> {
        let lhs_id = self.lower_expr(exprs, lhs)?;
        let rhs_id = self.lower_expr(exprs, rhs)?;
        let lhs_ty = self.expr_ty(exprs, lhs_id);
        let rhs_ty = self.expr_ty(exprs, rhs_id);

        if lhs_ty != rhs_ty {
            return Err(self.err_mismatch(
                self.display_ty(lhs_ty),
                self.display_ty(rhs_ty),
                span,
            ));
        }

        if op.is_assignment() {
            if !exprs[lhs_id].is_place() {
                return Err(self.err_not_assignable(span));
            }
            // Compound assignment desugars to the arithmetic operator
            // followed by a store into the target's storage location.
            let value = match op.compound_base() {
                Some(base) => exprs.alloc(Expr::Binary {
                    op: base,
                    lhs: lhs_id,
                    rhs: rhs_id,
                    ty: lhs_ty,
                }),
                None => rhs_id,
            };
            return Ok(exprs.alloc(Expr::Assign {
                target: lhs_id,
                value,
                ty: lhs_ty,
            }));
        }

        let ty = if op.is_comparison() {
            self.ctx.types.builtins().bool
        } else {
            lhs_ty
        };
        Ok(exprs.alloc(Expr::Binary {
            op,
            lhs: lhs_id,
            rhs: rhs_id,
            ty,
        }))
    }

    /// Lower the left side of a member access; `->` requires a pointer and
    /// rewrites as a dereference followed by a plain access
    fn lower_member_base(
        &mut self,
        exprs: &mut Arena<Expr>,
        base: &ast::Stmt,
        arrow: bool,
        field: Symbol,
        span: Span,
    ) -> LowerResult<(ExprId, TypeId)> {
        let base_id = self.lower_expr(exprs, base)?;
        let base_ty = self.expr_ty(exprs, base_id);
        if !arrow {
            return Ok((base_id, base_ty));
        }
        let Some(pointee) = self.ctx.types.pointee(base_ty) else {
            return Err(self.err_member(base_ty, field, span));
        };
        let deref = exprs.alloc(Expr::Unary {
            op: UnOp::Deref,
            operand: base_id,
            ty: pointee,
        });
        Ok((deref, pointee))
    }

    fn lower_call(
        &mut self,
        exprs: &mut Arena<Expr>,
        callee: &ast::Stmt,
        args: &[ast::Stmt],
        span: Span,
    ) -> LowerResult<ExprId> {
        let mut lowered_args = Vec::with_capacity(args.len());
        let mut arg_tys = Vec::with_capacity(args.len());
        for arg in args {
            let id = self.lower_expr(exprs, arg)?;
            arg_tys.push(self.expr_ty(exprs, id));
            lowered_args.push(id);
        }

        match callee {
            ast::Stmt::Member {
                base,
                field,
                arrow,
                span: member_span,
            } => {
                let (receiver, receiver_ty) =
                    self.lower_member_base(exprs, base, *arrow, *field, *member_span)?;
                let Some(compound) = self.ctx.types.as_compound(receiver_ty) else {
                    return Err(self.err_member(receiver_ty, *field, *member_span));
                };
                let Some(set) = compound.methods.get(field).cloned() else {
                    return Err(self.err_member(receiver_ty, *field, *member_span));
                };
                let name = self.interner.resolve(field);
                let target = self
                    .resolve_overload(&set, &arg_tys)
                    .ok_or_else(|| self.err_overload(&name, &arg_tys, span))?;
                Ok(self.finish_call(exprs, target, Some(receiver), lowered_args))
            }
            ast::Stmt::Variable { path, span: callee_span } => {
                self.lower_named_call(exprs, path, *callee_span, span, lowered_args, &arg_tys)
            }
            ast::Stmt::TypeRef { name, .. } => {
                let class = self.resolve_type_name(name)?;
                self.lower_construction(exprs, class, lowered_args, &arg_tys, span)
            }
            other => {
                Err(self.err_overload("<expression>", &arg_tys, other.span()))
            }
        }
    }

    /// Resolve a call written as a (possibly qualified) identifier path:
    /// a free-function overload-set, a type's method reached with `::`, or
    /// a constructor when the path names a type
    fn lower_named_call(
        &mut self,
        exprs: &mut Arena<Expr>,
        path: &[Symbol],
        callee_span: Span,
        span: Span,
        lowered_args: Vec<ExprId>,
        arg_tys: &[TypeId],
    ) -> LowerResult<ExprId> {
        let name = *path.last().expect("paths are never empty");
        let rendered = self.interner.resolve(&name);

        if path.len() == 1 {
            // A local binding shadows any function of the same name, and a
            // binding is never callable.
            if self.symbols.lookup(name).is_some() {
                return Err(self.err_overload(&rendered, arg_tys, span));
            }
            if let Some(set) = self
                .ctx
                .namespaces
                .lookup_function(self.current_ns, name)
                .map(<[TypeId]>::to_vec)
            {
                let target = self
                    .resolve_overload(&set, arg_tys)
                    .ok_or_else(|| self.err_overload(&rendered, arg_tys, span))?;
                return Ok(self.finish_call(exprs, target, None, lowered_args));
            }
            if let Some(class) = self.ctx.namespaces.lookup_type(self.current_ns, name) {
                return self.lower_construction(exprs, class, lowered_args, arg_tys, span);
            }
            return Err(self.err_unknown_ident(&rendered, callee_span));
        }

        let prefix = &path[..path.len() - 1];

        // ns::…::f — the prefix names a namespace.
        if let Some(ns) = self.ctx.namespaces.lookup_path(self.current_ns, prefix) {
            if let Some(set) = self.ctx.namespaces.functions_in(ns, name).map(<[TypeId]>::to_vec) {
                let target = self
                    .resolve_overload(&set, arg_tys)
                    .ok_or_else(|| self.err_overload(&rendered, arg_tys, span))?;
                return Ok(self.finish_call(exprs, target, None, lowered_args));
            }
            if let Some(class) = self.ctx.namespaces.type_in(ns, name) {
                return self.lower_construction(exprs, class, lowered_args, arg_tys, span);
            }
        }

        // Type::method — the prefix names a type (e.g. `Point::new`).
        let type_name = ast::TypeName {
            path: prefix.to_vec(),
            args: Vec::new(),
            span: callee_span,
        };
        if let Ok(class) = self.resolve_type_name(&type_name) {
            if let Some(set) = self
                .ctx
                .types
                .as_compound(class)
                .and_then(|compound| compound.methods.get(&name))
                .cloned()
            {
                let target = self
                    .resolve_overload(&set, arg_tys)
                    .ok_or_else(|| self.err_overload(&rendered, arg_tys, span))?;
                return Ok(self.finish_call(exprs, target, None, lowered_args));
            }
        }

        let joined = path
            .iter()
            .map(|segment| self.interner.resolve(segment))
            .collect::<Vec<_>>()
            .join("::");
        Err(self.err_unknown_ident(&joined, callee_span))
    }

    fn finish_call(
        &mut self,
        exprs: &mut Arena<Expr>,
        target: TypeId,
        receiver: Option<ExprId>,
        args: Vec<ExprId>,
    ) -> ExprId {
        let mangled = mangle::mangled_name(&self.ctx.types, self.interner, target);
        let ret = self
            .ctx
            .types
            .as_function(target)
            .map_or(self.ctx.types.builtins().void, |func| func.ret);
        exprs.alloc(Expr::Call {
            target,
            mangled,
            receiver,
            args,
            ty: ret,
        })
    }

    /// Anonymous construction `Type(args)`: allocate a nameless temporary,
    /// record it for destructor injection, and bind the constructor call to
    /// the temporary's storage
    fn lower_construction(
        &mut self,
        exprs: &mut Arena<Expr>,
        class: TypeId,
        args: Vec<ExprId>,
        arg_tys: &[TypeId],
        span: Span,
    ) -> LowerResult<ExprId> {
        let rendered = self.display_ty(class);
        let Some(compound) = self.ctx.types.as_compound(class) else {
            return Err(self.err_overload(&rendered, arg_tys, span));
        };
        let ctors = compound.constructors.clone();
        let ctor = self
            .resolve_overload(&ctors, arg_tys)
            .ok_or_else(|| self.err_overload(&rendered, arg_tys, span))?;

        let temp = self.ctx.fresh_temp(self.interner);
        self.symbols.declare_temp(temp, class);

        let mangled = mangle::mangled_name(&self.ctx.types, self.interner, ctor);
        Ok(exprs.alloc(Expr::Construct {
            temp,
            class,
            ctor,
            mangled,
            args,
        }))
    }

    /// Scan the whole candidate list: a candidate matches on exact arity
    /// and per-parameter structural type equality, and the last match wins
    fn resolve_overload(&self, candidates: &[TypeId], args: &[TypeId]) -> Option<TypeId> {
        let mut winner = None;
        for &candidate in candidates {
            let Some(func) = self.ctx.types.as_function(candidate) else {
                continue;
            };
            if func.params.len() == args.len()
                && func.params.iter().zip(args).all(|(param, &arg)| param.ty == arg)
            {
                winner = Some(candidate);
            }
        }
        winner
    }
}
