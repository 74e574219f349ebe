//! Eager vs lazy redshift error modes.

mod support;

use pretty_assertions::assert_eq;
use spy::ast::{BinOpKind, Stmt};
use spy::{ErrorKind, ErrorMode};
use support::*;

fn bad_add_module() -> spy::ast::Module {
    // def foo() -> i32: return 1 + "hello"
    module(
        "x",
        vec![dfn(red_fn(
            "foo",
            vec![],
            name("i32"),
            vec![ret(bin(BinOpKind::Add, cint(1), cstr("hello")))],
        ))],
    )
}

/// Under eager mode the type error aborts compilation.
#[test]
fn eager_mode_aborts() {
    let err = try_compile(bad_add_module(), ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "cannot do `i32` + `str`");
}

/// Under lazy mode redshift succeeds, the body becomes a residual raise,
/// and a warning is recorded.
#[test]
fn lazy_mode_downgrades_to_raise() {
    let mut vm = try_compile(bad_add_module(), ErrorMode::Lazy).unwrap();

    let warnings = vm.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "cannot do `i32` + `str`");

    let body = residual_body(&vm, "x::foo");
    assert_eq!(body.len(), 1);
    let Stmt::StmtExpr { value, .. } = &body[0] else {
        panic!("expected a raise call, got {:?}", body[0]);
    };
    assert_eq!(
        *value,
        call_fqn(
            "operator::raise",
            vec![
                cstr("TypeError"),
                cstr("cannot do `i32` + `str`"),
                cstr("<fake>"),
                cint(1),
            ]
        )
    );
    assert_residual_body(&body);
}

/// The residual raise actually raises when the function runs.
#[test]
fn lazy_raise_fires_at_run_time() {
    let mut vm = try_compile(bad_add_module(), ErrorMode::Lazy).unwrap();
    let err = call_global(&mut vm, "x::foo", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "cannot do `i32` + `str`");
}

/// Non-static errors are never downgraded, even under lazy mode.
#[test]
fn lazy_mode_keeps_non_static_errors_eager() {
    // tuple arity mismatch is a ValueError, which is not static
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![],
            name("i32"),
            vec![
                unpack(&["a", "b", "c"], tuple_(vec![cint(1), cint(2)])),
                ret(cint(0)),
            ],
        ))],
    );
    let err = try_compile(m, ErrorMode::Lazy).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);
    assert_eq!(
        err.message,
        "Wrong number of values to unpack: expected 3, got 2"
    );
}

/// An unbound name is a static NameError and downgrades under lazy mode.
#[test]
fn lazy_mode_downgrades_name_errors() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![],
            name("i32"),
            vec![ret(name("no_such_thing"))],
        ))],
    );
    let mut vm = try_compile(m, ErrorMode::Lazy).unwrap();
    let warnings = vm.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, ErrorKind::NameError);

    let body = residual_body(&vm, "x::f");
    let Stmt::StmtExpr { value, .. } = &body[0] else {
        panic!("expected a raise call, got {:?}", body[0]);
    };
    assert_eq!(
        *value,
        call_fqn(
            "operator::raise",
            vec![
                cstr("NameError"),
                cstr("name `no_such_thing` is not defined"),
                cstr("<fake>"),
                cint(1),
            ]
        )
    );
}
