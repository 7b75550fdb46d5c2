//! Name mangling
//!
//! Mangled names are the wire format between the front end, the backend and
//! the linker: overload dispatch and backend symbol naming both key on them.
//!
//! Type rule: the base name alone when there are no template arguments;
//! otherwise base + `_` + per argument either `I` + mangled (when the
//! argument's mangled name starts with a digit, i.e. literal arguments) or
//! `T` + decimal length + mangled. The rule applies recursively.
//!
//! Function rule: `main` and `_start` pass through unchanged, as do
//! external-linkage functions; everything else is `_R` + the owning class's
//! mangled name (methods only) + decimal length of the plain name + the
//! plain name + each parameter type's mangled name in declaration order.
//! The return type is deliberately absent.

use crate::{TypeId, TypeKind, TypeTable};
use ks_intern::Interner;

/// Mangled name of any type id (function signatures included)
pub fn mangled_name(types: &TypeTable, interner: &Interner, id: TypeId) -> String {
    let ty = types.get(id);
    if let TypeKind::Function(func) = &ty.kind {
        let plain = interner.resolve(&ty.name);
        if plain == "main" || plain == "_start" || func.external {
            return plain;
        }
        let mut out = String::from("_R");
        if let Some(owner) = func.owner {
            out.push_str(&mangled_name(types, interner, owner));
        }
        out.push_str(&plain.len().to_string());
        out.push_str(&plain);
        for param in &func.params {
            out.push_str(&mangled_name(types, interner, param.ty));
        }
        return out;
    }

    let base = interner.resolve(&ty.name);
    if ty.args.is_empty() {
        return base;
    }
    let mut out = base;
    out.push('_');
    for &arg in &ty.args {
        let mangled = mangled_name(types, interner, arg);
        if mangled.starts_with(|c: char| c.is_ascii_digit()) {
            out.push('I');
        } else {
            out.push('T');
            out.push_str(&mangled.len().to_string());
        }
        out.push_str(&mangled);
    }
    out
}

/// Reconstruct a type from its mangled name
///
/// Structural generics (`__ptr`, `__arr`) and literal arguments are
/// synthesized; any other base must already be registered in the table.
/// Returns `None` for strings that are not valid type manglings.
pub fn demangle_type(
    types: &mut TypeTable,
    interner: &Interner,
    mangled: &str,
) -> Option<TypeId> {
    if mangled.is_empty() {
        return None;
    }

    // Digits-only strings are literal template arguments.
    if mangled.chars().all(|c| c.is_ascii_digit()) {
        let value = mangled.parse::<i64>().ok()?;
        return Some(types.literal(value, interner));
    }

    // Try the shortest base first: the earliest `_` split whose remainder
    // parses as a complete argument list wins.
    for (idx, _) in mangled.match_indices('_') {
        if idx == 0 {
            continue;
        }
        let base = &mangled[..idx];
        let rest = &mangled[idx + 1..];
        if let Some(args) = demangle_args(types, interner, rest) {
            let base_sym = interner.intern(base);
            if types.is_structural_base(base_sym) {
                return Some(types.intern(base_sym, args, TypeKind::Builtin));
            }
            return types.lookup(base_sym, &args);
        }
    }

    // No argument list: the whole string is a plain base name.
    let sym = interner.intern(mangled);
    types.lookup(sym, &[])
}

/// Parse a full argument sequence; `None` unless the input is consumed exactly
fn demangle_args(
    types: &mut TypeTable,
    interner: &Interner,
    mut input: &str,
) -> Option<Vec<TypeId>> {
    let mut args = Vec::new();
    while !input.is_empty() {
        let (head, rest) = input.split_at(1);
        match head {
            "T" => {
                let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
                if digits == 0 {
                    return None;
                }
                let len = rest[..digits].parse::<usize>().ok()?;
                let after = &rest[digits..];
                if after.len() < len {
                    return None;
                }
                args.push(demangle_type(types, interner, &after[..len])?);
                input = &after[len..];
            }
            "I" => {
                let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
                if digits == 0 {
                    return None;
                }
                let value = rest[..digits].parse::<i64>().ok()?;
                args.push(types.literal(value, interner));
                input = &rest[digits..];
            }
            _ => return None,
        }
    }
    if args.is_empty() { None } else { Some(args) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompoundType, FunctionType, Member, Param};
    use ks_intern::Interner;

    #[test]
    fn plain_types_mangle_to_their_name() {
        let interner = Interner::new();
        let types = TypeTable::new(&interner);
        let b = types.builtins();
        assert_eq!(mangled_name(&types, &interner, b.i32), "i32");
        assert_eq!(mangled_name(&types, &interner, b.void), "void");
    }

    #[test]
    fn structural_generics_mangle_recursively() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();

        let ptr = types.ptr_to(b.i32);
        assert_eq!(mangled_name(&types, &interner, ptr), "__ptr_T3i32");

        let four = types.literal(4, &interner);
        let arr = types.array_of(b.i32, four);
        assert_eq!(mangled_name(&types, &interner, arr), "__arr_T3i32I4");

        let ptr_arr = types.ptr_to(arr);
        assert_eq!(
            mangled_name(&types, &interner, ptr_arr),
            "__ptr_T13__arr_T3i32I4"
        );
    }

    #[test]
    fn round_trip_nested_structural_types() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();

        // Alternate pointer and array wrappers to depth 5.
        let four = types.literal(4, &interner);
        let mut ty = b.i32;
        for depth in 0..5 {
            ty = if depth % 2 == 0 {
                types.ptr_to(ty)
            } else {
                types.array_of(ty, four)
            };
            let mangled = mangled_name(&types, &interner, ty);
            let back = demangle_type(&mut types, &interner, &mangled);
            assert_eq!(back, Some(ty), "depth {depth}: {mangled}");
        }
    }

    #[test]
    fn round_trip_registered_compound() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();

        let name = interner.intern("Point");
        let x = interner.intern("x");
        let y = interner.intern("y");
        let point = types.intern(
            name,
            Vec::new(),
            TypeKind::Compound(CompoundType {
                members: vec![Member { name: x, ty: b.i32 }, Member { name: y, ty: b.i32 }],
                ..CompoundType::default()
            }),
        );

        let ptr = types.ptr_to(point);
        let mangled = mangled_name(&types, &interner, ptr);
        assert_eq!(mangled, "__ptr_T5Point");
        assert_eq!(demangle_type(&mut types, &interner, &mangled), Some(ptr));
    }

    #[test]
    fn function_mangling_encodes_owner_name_and_parameters() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();

        let point = types.intern(
            interner.intern("Point"),
            Vec::new(),
            TypeKind::Compound(CompoundType::default()),
        );

        let free = types.alloc_function(
            interner.intern("fib"),
            FunctionType {
                params: vec![Param {
                    name: interner.intern("n"),
                    ty: b.i32,
                }],
                ret: b.i32,
                owner: None,
                external: false,
            },
        );
        assert_eq!(mangled_name(&types, &interner, free), "_R3fibi32");

        let method = types.alloc_function(
            interner.intern("norm"),
            FunctionType {
                params: Vec::new(),
                ret: b.i32,
                owner: Some(point),
                external: false,
            },
        );
        assert_eq!(mangled_name(&types, &interner, method), "_RPoint4norm");
    }

    #[test]
    fn entry_points_and_externals_pass_through() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();

        let main = types.alloc_function(
            interner.intern("main"),
            FunctionType {
                params: Vec::new(),
                ret: b.i32,
                owner: None,
                external: false,
            },
        );
        assert_eq!(mangled_name(&types, &interner, main), "main");

        let malloc = types.alloc_function(
            interner.intern("malloc"),
            FunctionType {
                params: vec![Param {
                    name: interner.intern("size"),
                    ty: b.u64,
                }],
                ret: types.builtins().u64,
                owner: None,
                external: true,
            },
        );
        assert_eq!(mangled_name(&types, &interner, malloc), "malloc");
    }

    #[test]
    fn mangled_names_differ_per_parameter_sequence() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();
        let name = interner.intern("f");

        let sigs = [
            vec![],
            vec![b.i32],
            vec![b.float],
            vec![b.i32, b.i32],
            vec![b.i32, b.float],
            vec![b.float, b.i32],
        ];
        let mut mangled = Vec::new();
        for params in &sigs {
            let func = types.alloc_function(
                name,
                FunctionType {
                    params: params
                        .iter()
                        .map(|&ty| Param {
                            name: interner.intern("p"),
                            ty,
                        })
                        .collect(),
                    ret: b.void,
                    owner: None,
                    external: false,
                },
            );
            mangled.push(mangled_name(&types, &interner, func));
        }
        for (i, a) in mangled.iter().enumerate() {
            for (j, b) in mangled.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }

    #[test]
    fn return_type_is_not_encoded() {
        let interner = Interner::new();
        let mut types = TypeTable::new(&interner);
        let b = types.builtins();
        let name = interner.intern("f");

        let ret_i32 = types.alloc_function(
            name,
            FunctionType {
                params: vec![Param {
                    name: interner.intern("x"),
                    ty: b.i32,
                }],
                ret: b.i32,
                owner: None,
                external: false,
            },
        );
        let ret_void = types.alloc_function(
            name,
            FunctionType {
                params: vec![Param {
                    name: interner.intern("x"),
                    ty: b.i32,
                }],
                ret: b.void,
                owner: None,
                external: false,
            },
        );
        assert_eq!(
            mangled_name(&types, &interner, ret_i32),
            mangled_name(&types, &interner, ret_void)
        );
    }
}
