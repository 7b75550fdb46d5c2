//! Semantic resolver: untyped tree → typed, lowered AST
//!
//! Walks the parser's untyped tree against the type/symbol model, performs
//! type checking, member/overload resolution, name mangling, template
//! instantiation and destructor injection, and fills the [`ks_hir::AstContext`]
//! registries the backend consumes.

mod error;
mod lower;
mod symbols;

pub use error::SemanticError;
pub use lower::lower_unit;
pub use symbols::{DropEntry, LocalVar, ScopeKind, SymbolTable};

#[cfg(test)]
mod tests {
    use crate::lower_unit;
    use crate::SemanticError;
    use ks_hir::{AstContext, Body, Expr};
    use ks_intern::Interner;

    fn compile(source: &str) -> Result<AstContext, SemanticError> {
        let interner = Interner::new();
        let parsed = ks_parser::parse_source(source, "<test>", &interner);
        assert!(parsed.errors.is_empty(), "syntax errors: {:?}", parsed.errors);
        lower_unit(&parsed.unit, &interner, "<test>", source)
    }

    fn compile_ok(source: &str) -> AstContext {
        compile(source).expect("expected the unit to lower")
    }

    /// All calls in a body, as (mangled target, receiver present) pairs
    fn calls_of(body: &Body) -> Vec<(String, bool)> {
        body.exprs
            .iter()
            .filter_map(|(_, expr)| match expr {
                Expr::Call {
                    mangled, receiver, ..
                } => Some((mangled.clone(), receiver.is_some())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fib_lowers_with_a_recursive_self_call() {
        let ctx = compile_ok(
            "fn fib(i32 n) -> i32 { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }",
        );
        assert_eq!(ctx.bodies.len(), 1);
        let body = &ctx.bodies[0];
        assert_eq!(body.mangled, "_R3fibi32");
        let calls = calls_of(&body.body);
        assert_eq!(calls.len(), 2);
        for (mangled, has_receiver) in calls {
            assert_eq!(mangled, "_R3fibi32");
            assert!(!has_receiver);
        }
    }

    #[test]
    fn class_registration_fixes_member_order_and_adds_new() {
        let ctx = compile_ok("class Point { i32 x; i32 y; }");
        assert_eq!(ctx.classes.len(), 1);
        let class = ctx.classes[0];
        let compound = ctx.types.as_compound(class).unwrap();
        assert_eq!(compound.member_index(compound.members[0].name), Some(0));
        assert_eq!(compound.members.len(), 2);

        // The implicit zero-argument `new` returns __ptr<Point>.
        let new_fn = compound.methods.values().flatten().copied().next().unwrap();
        let sig = ctx.types.as_function(new_fn).unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(ctx.types.pointee(sig.ret), Some(class));
        assert!(ctx.prototypes.contains(&new_fn));
    }

    #[test]
    fn shadowing_is_scoped_to_the_inner_block() {
        compile_ok(
            "fn main() { i32 x; { float x; x = 1.5; } x = 1; }",
        );
    }

    #[test]
    fn loop_body_variables_do_not_escape() {
        let error = compile(
            "fn main() { for (i32 i = 0; i < 10; i++) { i32 t; t = i; } t = 1; }",
        )
        .unwrap_err();
        assert!(matches!(error, SemanticError::UnknownIdentifier { .. }));
    }

    #[test]
    fn destructors_run_in_reverse_declaration_order() {
        let ctx = compile_ok(
            "class R { i32 v; ~R() { } }
             fn main() { R a; R b; R c; }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        let Expr::Block { stmts } = body.get(body.root) else {
            panic!("expected a block root");
        };
        // Three definitions, then three destructor calls.
        assert_eq!(stmts.len(), 6);
        let receivers: Vec<u32> = stmts[3..]
            .iter()
            .map(|&id| {
                let Expr::Call { receiver: Some(receiver), mangled, .. } = body.get(id) else {
                    panic!("expected a destructor call");
                };
                assert_eq!(mangled, "_RR2~R");
                let Expr::Variable { ordinal, .. } = body.get(*receiver) else {
                    panic!("expected a variable receiver");
                };
                *ordinal
            })
            .collect();
        // Declared a(0), b(1), c(2); destroyed c, b, a.
        assert_eq!(receivers, vec![2, 1, 0]);
    }

    #[test]
    fn builtin_locals_are_never_destructed() {
        let ctx = compile_ok("fn main() { i32 a; i64 b; }");
        let body = &ctx.bodies[0].body;
        assert!(calls_of(body).is_empty());
    }

    #[test]
    fn overloads_select_on_exact_argument_types() {
        let ctx = compile_ok(
            "fn f(i32 x) -> i32 { return 0; }
             fn f(float x) -> i32 { return 1; }
             fn main() { f(1); f(1.5); }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        let calls = calls_of(body);
        assert_eq!(calls[0].0, "_R1fi32");
        assert_eq!(calls[1].0, "_R1ffloat");
    }

    #[test]
    fn later_identical_signature_wins() {
        let ctx = compile_ok(
            "fn g(i32 x) -> i32 { return 1; }
             fn g(i32 x) -> float { return 2; }
             fn main() { g(5); }",
        );
        // One prototype and one body survive for `g` (the only registered
        // function with a single parameter).
        let g_protos: Vec<_> = ctx
            .prototypes
            .iter()
            .filter(|&&p| {
                ctx.types
                    .as_function(p)
                    .is_some_and(|func| func.params.len() == 1)
            })
            .collect();
        assert_eq!(g_protos.len(), 1);
        let g_bodies: Vec<_> = ctx
            .bodies
            .iter()
            .filter(|b| b.mangled == "_R1gi32")
            .collect();
        assert_eq!(g_bodies.len(), 1);

        // The call's result type is the later declaration's return type.
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        let call_ty = body
            .exprs
            .iter()
            .find_map(|(_, expr)| match expr {
                Expr::Call { ty, .. } => Some(*ty),
                _ => None,
            })
            .unwrap();
        assert_eq!(call_ty, ctx.types.builtins().float);
    }

    #[test]
    fn initializer_type_is_not_checked() {
        compile_ok("fn main() { i32 x = 1.5; }");
    }

    #[test]
    fn construction_allocates_a_temporary_and_injects_its_destructor() {
        let ctx = compile_ok(
            "class Point {
                i32 x;
                i32 y;
                Point(i32 px, i32 py) { }
                ~Point() { }
            }
            fn main() { Point(1, 2); }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        let construct = body
            .exprs
            .iter()
            .find_map(|(_, expr)| match expr {
                Expr::Construct { mangled, args, .. } => Some((mangled.clone(), args.len())),
                _ => None,
            })
            .unwrap();
        assert_eq!(construct.0, "_RPoint5Pointi32i32");
        assert_eq!(construct.1, 2);

        // The temporary is destructed at scope exit.
        let calls = calls_of(body);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "_RPoint6~Point");
    }

    #[test]
    fn methods_resolve_through_member_access_and_this() {
        let ctx = compile_ok(
            "class Counter {
                i32 n;
                fn bump() -> i32 { this->n = this->n + 1; return this->n; }
            }
            fn main() { Counter c; c.bump(); }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        let calls = calls_of(body);
        assert_eq!(calls, vec![("_RCounter4bump".to_string(), true)]);
    }

    #[test]
    fn implicit_new_is_callable_through_the_class_name() {
        let ctx = compile_ok(
            "class Point { i32 x; i32 y; }
             fn main() { __ptr<Point> p = Point::new(); p->x = 1; }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        let calls = calls_of(body);
        assert_eq!(calls, vec![("_RPoint3new".to_string(), false)]);
    }

    #[test]
    fn external_call_requires_exact_types_and_keeps_plain_name() {
        let error = compile(
            "external:
             fn malloc(u64 size) -> __ptr<i32>;
             internal:
             fn main() { malloc(8); }",
        );
        // An i32 literal never matches a u64 parameter.
        assert!(matches!(
            error,
            Err(SemanticError::NoSuitableOverload { .. })
        ));

        let ctx = compile_ok(
            "external:
             fn getchar() -> i32;
             internal:
             fn main() { getchar(); }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        assert_eq!(calls_of(body), vec![("getchar".to_string(), false)]);
    }

    #[test]
    fn templates_instantiate_once_per_argument_list() {
        let ctx = compile_ok(
            "class Pair<T> { T a; T b; }
             fn main() { Pair<i32> p; Pair<i32> q; Pair<float> r; }",
        );
        // Two distinct instantiations, cached on repeat.
        assert_eq!(ctx.classes.len(), 2);
        let ints = ctx.types.as_compound(ctx.classes[0]).unwrap();
        assert_eq!(ints.members[0].ty, ctx.types.builtins().i32);
        let floats = ctx.types.as_compound(ctx.classes[1]).unwrap();
        assert_eq!(floats.members[0].ty, ctx.types.builtins().float);
    }

    #[test]
    fn namespace_functions_resolve_by_qualified_path() {
        let ctx = compile_ok(
            "namespace math { fn abs(i32 x) -> i32 { if (x < 0) return 0 - x; return x; } }
             fn main() { math::abs(0 - 3); }",
        );
        let body = &ctx.bodies.iter().find(|b| b.mangled == "main").unwrap().body;
        assert_eq!(calls_of(body), vec![("_R3absi32".to_string(), false)]);
    }

    #[test]
    fn aliases_resolve_before_named_types() {
        compile_ok("using Id = i32; fn main() { Id x; x = 1; }");
    }

    #[test]
    fn mismatched_operand_types_are_fatal() {
        let error = compile("fn main() { i32 x = 1; x + 1.5; }").unwrap_err();
        assert!(matches!(error, SemanticError::TypeMismatch { .. }));
    }

    #[test]
    fn literals_are_not_assignable() {
        let error = compile("fn main() { 1 = 2; }").unwrap_err();
        assert!(matches!(error, SemanticError::InvalidAssignmentTarget { .. }));
    }

    #[test]
    fn arrow_requires_a_pointer_operand() {
        let error = compile(
            "class Point { i32 x; i32 y; }
             fn main() { Point p; p->x = 1; }",
        )
        .unwrap_err();
        assert!(matches!(error, SemanticError::InvalidMemberAccess { .. }));
    }

    #[test]
    fn duplicate_declaration_in_one_scope_is_fatal() {
        let error = compile("fn main() { i32 x; float x; }").unwrap_err();
        assert!(matches!(error, SemanticError::DuplicateDeclaration { .. }));
    }

    #[test]
    fn unknown_types_are_fatal() {
        let error = compile("fn main() { Widget w; }").unwrap_err();
        assert!(matches!(error, SemanticError::UnknownType { .. }));
    }

    #[test]
    fn subscripts_demand_an_array() {
        let ctx = compile_ok("fn first(__arr<i32, 4> xs) -> i32 { return xs[0]; }");
        let body = &ctx.bodies[0].body;
        let index_ty = body
            .exprs
            .iter()
            .find_map(|(_, expr)| match expr {
                Expr::Index { ty, .. } => Some(*ty),
                _ => None,
            })
            .unwrap();
        assert_eq!(index_ty, ctx.types.builtins().i32);

        let error = compile("fn main() { i32 x; x[0]; }").unwrap_err();
        assert!(matches!(error, SemanticError::TypeMismatch { .. }));
    }

    #[test]
    fn compound_assignment_desugars_to_operator_plus_store() {
        let ctx = compile_ok("fn main() { i32 x = 0; x += 2; }");
        let body = &ctx.bodies[0].body;
        let has_assign_of_add = body.exprs.iter().any(|(_, expr)| {
            let Expr::Assign { value, .. } = expr else {
                return false;
            };
            matches!(
                body.get(*value),
                Expr::Binary {
                    op: ks_syntax::BinOp::Add,
                    ..
                }
            )
        });
        assert!(has_assign_of_add);
    }
}
