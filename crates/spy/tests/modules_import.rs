//! The driver: multi-module loading, import resolution and cycle
//! detection.

mod support;

use pretty_assertions::assert_eq;
use spy::ast::BinOpKind;
use spy::errors::ErrorKind;
use spy::ErrorMode;
use support::*;

/// `from a import n` makes `n` usable in the importing module.
#[test]
fn import_const_resolves() {
    let lib = module("a", vec![dconst("n", cint(40))]);
    let main = module(
        "b",
        vec![
            dimport("a", "n", "n"),
            dfn(red_fn(
                "f",
                vec![],
                name("i32"),
                vec![ret(bin(BinOpKind::Add, name("n"), cint(2)))],
            )),
        ],
    );
    let vm = try_compile_many(vec![lib, main], "b", ErrorMode::Eager).unwrap();
    // the imported const is blue, so it folds into the residual
    assert_eq!(residual_body(&vm, "b::f"), vec![ret(cint(42))]);
}

/// Importing a function from another module and calling it.
#[test]
fn import_function_resolves() {
    let lib = module(
        "a",
        vec![dfn(red_fn(
            "double",
            vec![arg("n", name("i32"))],
            name("i32"),
            vec![ret(bin(BinOpKind::Mul, name("n"), cint(2)))],
        ))],
    );
    let main = module(
        "b",
        vec![
            dimport("a", "double", "double"),
            dfn(red_fn(
                "f",
                vec![arg("n", name("i32"))],
                name("i32"),
                vec![ret(call(name("double"), vec![name("n")]))],
            )),
        ],
    );
    let vm = try_compile_many(vec![lib, main], "b", ErrorMode::Eager).unwrap();
    assert_eq!(
        residual_body(&vm, "b::f"),
        vec![ret(call_fqn("a::double", vec![name_local("n")]))]
    );
}

/// Import cycles are detected and reported with the full chain.
#[test]
fn import_cycle_is_detected() {
    let a = module("a", vec![dimport("b", "x", "x"), dconst("y", cint(1))]);
    let b = module("b", vec![dimport("a", "y", "y"), dconst("x", cint(2))]);
    let err = try_compile_many(vec![a, b], "a", ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
    assert_eq!(err.message, "circular import: a -> b -> a");
}

/// A missing module is an ImportError.
#[test]
fn missing_module_is_import_error() {
    let main = module("b", vec![dimport("nope", "x", "x")]);
    let err = try_compile_many(vec![main], "b", ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ImportError);
    assert_eq!(err.message, "cannot import `nope`: module not found");
}

/// A diamond (`d` imported twice) executes each module body exactly once.
#[test]
fn shared_dependency_loads_once() {
    let d = module("d", vec![dvar("hits", name("i32"), cint(0)), dconst("k", cint(1))]);
    let left = module("l", vec![dimport("d", "k", "k"), dconst("lk", name("k"))]);
    let right = module("r", vec![dimport("d", "k", "k"), dconst("rk", name("k"))]);
    let main = module(
        "m",
        vec![dimport("l", "lk", "lk"), dimport("r", "rk", "rk")],
    );
    let vm = try_compile_many(vec![d, left, right, main], "m", ErrorMode::Eager).unwrap();
    // one module entry each, and the importers observed the same const
    assert!(vm.lookup_module("d").is_some());
    assert_eq!(
        vm.lookup_global(&fqn("l::lk")),
        vm.lookup_global(&fqn("r::rk"))
    );
}

/// Every object a module exports is registered under its FQN in the flat
/// global table.
#[test]
fn globals_registry_is_consistent() {
    let lib = module("a", vec![dconst("n", cint(40))]);
    let main = module(
        "b",
        vec![
            dimport("a", "n", "n"),
            dfn(red_fn("f", vec![], name("i32"), vec![ret(name("n"))])),
        ],
    );
    let vm = try_compile_many(vec![lib, main], "b", ErrorMode::Eager).unwrap();
    for modname in ["a", "b"] {
        let module_id = vm.lookup_module(modname).unwrap();
        for (item_fqn, w_item) in &vm.module(module_id).items {
            assert_eq!(vm.lookup_global(item_fqn), Some(w_item));
        }
    }
}

/// Accessing a module attribute through the module object itself.
#[test]
fn module_attribute_access() {
    let lib = module("a", vec![dconst("n", cint(7))]);
    let main = module(
        "b",
        vec![
            spy::ast::Decl::Import {
                loc: lc(),
                modname: "a".to_owned(),
                attr: None,
                asname: "a".to_owned(),
            },
            dfn(red_fn(
                "f",
                vec![],
                name("i32"),
                vec![ret(getattr(name("a"), "n"))],
            )),
        ],
    );
    let vm = try_compile_many(vec![lib, main], "b", ErrorMode::Eager).unwrap();
    assert_eq!(residual_body(&vm, "b::f"), vec![ret(cint(7))]);
}
