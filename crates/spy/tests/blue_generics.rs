//! Blue functions as generics: namespace synthesis, type construction and
//! call memoization.

mod support;

use pretty_assertions::assert_eq;
use spy::object::WObject;
use support::*;

/// The classic generic-struct factory:
///
/// ```text
/// @blue
/// def make_Point(T):
///     class Point:
///         x: T
///         y: T
///     return Point
/// Point_i32 = make_Point(i32)
/// ```
fn make_point_module() -> spy::ast::Module {
    use spy::ast::Stmt;
    module(
        "x",
        vec![
            dfn(blue_fn(
                "make_Point",
                vec![arg("T", name("type"))],
                name("dynamic"),
                vec![
                    Stmt::ClassDef(struct_class(
                        "Point",
                        vec![("x", name("T")), ("y", name("T"))],
                        vec![],
                    )),
                    ret(name("Point")),
                ],
            )),
            dconst("Point_i32", call(name("make_Point"), vec![name("i32")])),
        ],
    )
}

/// The instantiated type lives under the qualified namespace of the blue
/// call and carries the substituted field types.
#[test]
fn generic_instantiation_qualifies_namespace() {
    let vm = compile(make_point_module());
    let w_global = vm.lookup_global(&fqn("x::Point_i32")).cloned();
    let Some(WObject::Type(w_type)) = w_global else {
        panic!("Point_i32 is not a type: {w_global:?}");
    };
    let point = vm.type_(w_type);
    assert_eq!(
        point.fqn.to_string(),
        "x::make_Point[builtins::i32]::Point"
    );
    assert!(point.is_defined);
    let field_types: Vec<String> = point
        .fields_w
        .iter()
        .map(|(field, w_ftype)| format!("{field}: {}", vm.type_(*w_ftype).human_name()))
        .collect();
    assert_eq!(field_types, vec!["x: i32", "y: i32"]);
}

/// Calling the same blue function twice with the same type argument reuses
/// the first instantiation instead of minting `Point#1`.
#[test]
fn blue_calls_are_memoized() {
    use spy::ast::Stmt;
    let m = module(
        "x",
        vec![
            dfn(blue_fn(
                "make_Point",
                vec![arg("T", name("type"))],
                name("dynamic"),
                vec![
                    Stmt::ClassDef(struct_class("Point", vec![("x", name("T"))], vec![])),
                    ret(name("Point")),
                ],
            )),
            dconst("A", call(name("make_Point"), vec![name("i32")])),
            dconst("B", call(name("make_Point"), vec![name("i32")])),
        ],
    );
    let vm = compile(m);
    let w_a = vm.lookup_global(&fqn("x::A")).cloned().unwrap();
    let w_b = vm.lookup_global(&fqn("x::B")).cloned().unwrap();
    assert_eq!(w_a, w_b);
}

/// Different type arguments mint distinct types under distinct qualified
/// namespaces.
#[test]
fn distinct_type_arguments_mint_distinct_types() {
    use spy::ast::Stmt;
    let m = module(
        "x",
        vec![
            dfn(blue_fn(
                "make_Point",
                vec![arg("T", name("type"))],
                name("dynamic"),
                vec![
                    Stmt::ClassDef(struct_class("Point", vec![("x", name("T"))], vec![])),
                    ret(name("Point")),
                ],
            )),
            dconst("A", call(name("make_Point"), vec![name("i32")])),
            dconst("B", call(name("make_Point"), vec![name("f64")])),
        ],
    );
    let vm = compile(m);
    let get = |g: &str| match vm.lookup_global(&fqn(g)) {
        Some(WObject::Type(w_type)) => vm.type_(*w_type).fqn.to_string(),
        other => panic!("{g}: {other:?}"),
    };
    assert_eq!(get("x::A"), "x::make_Point[builtins::i32]::Point");
    assert_eq!(get("x::B"), "x::make_Point[builtins::f64]::Point");
}

/// A blue function called with red arguments is a type error.
#[test]
fn blue_call_with_red_argument_is_rejected() {
    let m = module(
        "x",
        vec![
            dfn(blue_fn(
                "twice",
                vec![arg("n", name("i32"))],
                name("i32"),
                vec![ret(bin(spy::ast::BinOpKind::Add, name("n"), name("n")))],
            )),
            dfn(red_fn(
                "f",
                vec![arg("n", name("i32"))],
                name("i32"),
                vec![ret(call(name("twice"), vec![name("n")]))],
            )),
        ],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, spy::ErrorKind::TypeError);
    assert_eq!(err.message, "cannot call blue function with red arguments");
}

/// Every value a module exports is the same object the flat global table
/// knows under that FQN.
#[test]
fn module_items_agree_with_globals() {
    let vm = compile(make_point_module());
    let module_id = vm.lookup_module("x").unwrap();
    for (item_fqn, w_item) in &vm.module(module_id).items {
        assert_eq!(
            vm.lookup_global(item_fqn),
            Some(w_item),
            "mismatch for `{item_fqn}`"
        );
    }
}
