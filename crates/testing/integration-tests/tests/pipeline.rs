//! End-to-end tests over the whole front end
//!
//! Each test drives real source text through lex, parse, registration and
//! lowering, then inspects the registry the backend would receive.

use integration_tests::{body_named, call_targets, compile, compile_clean};
use ks_hir::Expr;
use ks_lower::SemanticError;
use ks_ty::mangle;

#[test]
fn a_small_program_compiles_front_to_back() {
    let result = compile_clean(
        "class Vec2 {
            i32 x;
            i32 y;
            Vec2(i32 px, i32 py) { this->x = px; this->y = py; }
            ~Vec2() { }
            fn dot(Vec2 other) -> i32 {
                return this->x * other.x + this->y * other.y;
            }
        }

        fn main() -> i32 {
            Vec2 a = Vec2(1, 2);
            Vec2 b = Vec2(3, 4);
            return a.dot(b);
        }",
    );

    let context = &result.context;
    assert_eq!(context.classes.len(), 1);

    // Prototypes: implicit new, constructor, destructor, dot, main.
    assert_eq!(context.prototypes.len(), 5);

    // Bodies: constructor, destructor, dot, main.
    assert_eq!(context.bodies.len(), 4);

    let main = body_named(&result, "main");
    let calls = call_targets(main);
    // Two constructions and one method call, then the two temporaries'
    // destructor calls before the return, then the named locals' at block
    // end; constructions are separate nodes, so calls here are dot + dtors.
    assert!(calls.contains(&"_RVec23dotVec2".to_string()));
    assert!(calls.iter().filter(|c| *c == "_RVec25~Vec2").count() >= 2);
}

#[test]
fn destructors_for_temporaries_and_locals_interleave_in_reverse() {
    let result = compile_clean(
        "class R {
            i32 v;
            R(i32 x) { }
            ~R() { }
        }
        fn main() {
            R a = R(1);
            R(2);
            R b = R(3);
        }",
    );
    let main = body_named(&result, "main");
    let Expr::Block { stmts } = main.get(main.root) else {
        panic!("expected a block root");
    };

    // Bindings in creation order: a, __tmp0 (its init), __tmp1 (bare
    // construction), __tmp2, b. Destruction order is the reverse.
    let mut dtor_receivers = Vec::new();
    for &stmt in stmts {
        if let Expr::Call {
            mangled,
            receiver: Some(receiver),
            ..
        } = main.get(stmt)
        {
            assert_eq!(mangled, "_RR2~R");
            if let Expr::Variable { ordinal, .. } = main.get(*receiver) {
                dtor_receivers.push(*ordinal);
            }
        }
    }
    let mut sorted = dtor_receivers.clone();
    sorted.sort_unstable();
    sorted.reverse();
    assert_eq!(dtor_receivers, sorted, "destruction must be reverse creation");
    assert_eq!(dtor_receivers.len(), 5);
}

#[test]
fn returns_drop_inner_scopes_but_not_parameters() {
    let result = compile_clean(
        "class Guard {
            i32 token;
            ~Guard() { }
        }
        fn leave(Guard g) -> i32 {
            Guard inner;
            if (1 < 2) {
                Guard deepest;
                return 1;
            }
            return 0;
        }",
    );
    let body = body_named(&result, "_R5leaveGuard");

    // The early return destructs `deepest` then `inner`, never `g`.
    let mut receivers = Vec::new();
    for (_, expr) in body.exprs.iter() {
        if let Expr::Call {
            receiver: Some(receiver),
            ..
        } = expr
        {
            if let Expr::Variable { ordinal, .. } = body.get(*receiver) {
                receivers.push(*ordinal);
            }
        }
    }
    // Ordinals: g = 0, inner = 1, deepest = 2. The parameter ordinal 0
    // must never appear as a destructor receiver.
    assert!(!receivers.contains(&0));
    assert!(receivers.contains(&1));
    assert!(receivers.contains(&2));
}

#[test]
fn namespaces_templates_and_aliases_compose() {
    let result = compile_clean(
        "namespace util {
            class Box<T> {
                T value;
            }
            fn id(i32 x) -> i32 { return x; }
        }

        using IntBox = util::Box<i32>;

        fn main() {
            IntBox b;
            util::id(4);
        }",
    );
    let context = &result.context;

    // The alias resolves to the cached instantiation.
    assert_eq!(context.classes.len(), 1);
    let boxed = context.types.as_compound(context.classes[0]).unwrap();
    assert_eq!(boxed.members.len(), 1);
    assert_eq!(boxed.members[0].ty, context.types.builtins().i32);

    let main = body_named(&result, "main");
    assert_eq!(call_targets(main), vec!["_R2idi32".to_string()]);
}

#[test]
fn prototype_symbols_are_unique_and_demangle_where_structural() {
    let result = compile_clean(
        "external:
         fn host_alloc(u64 size) -> __ptr<u64>;
         internal:
         fn sum(__arr<i32, 8> xs, i32 n) -> i32 { return n; }
         fn sum(__ptr<__arr<i32, 8>> xs, i32 n) -> i32 { return n; }
         fn main() { }",
    );
    let mut context = result.context;
    let interner = result.interner;

    let mut seen = std::collections::HashSet::new();
    let mangled: Vec<String> = context
        .prototypes
        .iter()
        .map(|&proto| mangle::mangled_name(&context.types, &interner, proto))
        .collect();
    for name in &mangled {
        assert!(seen.insert(name.clone()), "duplicate backend symbol {name}");
    }
    assert!(mangled.contains(&"host_alloc".to_string()));
    assert!(mangled.contains(&"_R3sum__arr_T3i32I8i32".to_string()));
    assert!(mangled.contains(&"_R3sum__ptr_T13__arr_T3i32I8i32".to_string()));

    // Structural parameter types round-trip through the demangler.
    let arr = mangle::demangle_type(&mut context.types, &interner, "__arr_T3i32I8");
    assert!(arr.is_some());
    let ptr_arr =
        mangle::demangle_type(&mut context.types, &interner, "__ptr_T13__arr_T3i32I8");
    assert_eq!(context.types.pointee(ptr_arr.unwrap()), arr);
}

#[test]
fn parse_recovery_still_lowers_the_healthy_declarations() {
    let result = compile(
        "fn broken( {
         class Ok { i32 v; }
         fn main() -> i32 { Ok o; return 0; }",
    )
    .unwrap();
    assert!(result.has_syntax_errors());
    assert_eq!(result.context.classes.len(), 1);
    assert_eq!(result.context.bodies.len(), 1);
}

#[test]
fn semantic_failures_carry_their_kind() {
    let cases: &[(&str, fn(&SemanticError) -> bool)] = &[
        ("fn main() { ghost(); }", |e| {
            matches!(e, SemanticError::UnknownIdentifier { .. })
        }),
        ("fn main() { Ghost g; }", |e| {
            matches!(e, SemanticError::UnknownType { .. })
        }),
        ("fn main() { i32 x; i32 x; }", |e| {
            matches!(e, SemanticError::DuplicateDeclaration { .. })
        }),
        ("fn f(i32 x) -> i32 { return x; } fn main() { f(1.5); }", |e| {
            matches!(e, SemanticError::NoSuitableOverload { .. })
        }),
        ("fn main() { 1 + 1.5; }", |e| {
            matches!(e, SemanticError::TypeMismatch { .. })
        }),
        ("class C { i32 v; } fn main() { C c; c.w; }", |e| {
            matches!(e, SemanticError::InvalidMemberAccess { .. })
        }),
        ("fn main() { 3 = 4; }", |e| {
            matches!(e, SemanticError::InvalidAssignmentTarget { .. })
        }),
    ];
    for (source, check) in cases {
        let error = compile(source).unwrap_err();
        assert!(check(&error), "wrong error kind for {source}: {error:?}");
    }
}

#[test]
fn backend_symbol_listing_is_stable() {
    let result = compile_clean(
        "class Point {
            i32 x;
            i32 y;
            Point(i32 px, i32 py) { }
            ~Point() { }
            fn norm2() -> i32 { return this->x * this->x + this->y * this->y; }
        }
        fn dist2(Point a, Point b) -> i32 { return 0; }
        fn main() -> i32 { return 0; }",
    );
    let listing = result
        .context
        .prototypes
        .iter()
        .map(|&proto| {
            ks_driver::mangled_name(&result.context, &result.interner, proto)
        })
        .collect::<Vec<_>>()
        .join("\n");
    expect_test::expect![[r#"
        _RPoint3new
        _RPoint5norm2
        _RPoint5Pointi32i32
        _RPoint6~Point
        _R5dist2PointPoint
        main"#]]
    .assert_eq(&listing);
}

#[test]
fn files_compile_through_the_driver() {
    use std::io::Write as _;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "class Point {{ i32 x; i32 y; }} fn main() -> i32 {{ return 0; }}"
    )
    .unwrap();
    let result = ks_driver::compile_file(file.path()).unwrap();
    assert_eq!(result.context.classes.len(), 1);
}

#[test]
fn heap_round_trip_through_implicit_new() {
    let result = compile_clean(
        "class Node {
            i32 value;
            fn set(i32 v) { this->value = v; }
        }
        fn main() -> i32 {
            __ptr<Node> n = Node::new();
            n->set(41);
            return n->value;
        }",
    );
    let main = body_named(&result, "main");
    let calls = call_targets(main);
    assert_eq!(
        calls,
        vec!["_RNode3new".to_string(), "_RNode3seti32".to_string()]
    );
}
