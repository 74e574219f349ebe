//! Compile-time execution of function bodies: the evaluator run by blue
//! functions and by tests calling red functions directly.

mod support;

use pretty_assertions::assert_eq;
use spy::ast::{BinOpKind, CmpOpKind};
use spy::errors::ErrorKind;
use spy::object::WObject;
use support::*;

/// Plain arithmetic through the dispatch pipeline.
#[test]
fn add_executes() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "add",
            vec![arg("x", name("i32")), arg("y", name("i32"))],
            name("i32"),
            vec![ret(bin(BinOpKind::Add, name("x"), name("y")))],
        ))],
    );
    let mut vm = load(m);
    let w_res = call_global(&mut vm, "x::add", &[WObject::I32(4), WObject::I32(5)]).unwrap();
    assert_eq!(w_res, WObject::I32(9));
}

/// Loops, locals and comparisons: sum of 0..n.
#[test]
fn while_loop_executes() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "triangle",
            vec![arg("n", name("i32"))],
            name("i32"),
            vec![
                local_var("total", name("i32"), Some(cint(0))),
                local_var("i", name("i32"), Some(cint(0))),
                while_(
                    cmp(CmpOpKind::Lt, name("i"), name("n")),
                    vec![
                        assign("total", bin(BinOpKind::Add, name("total"), name("i"))),
                        assign("i", bin(BinOpKind::Add, name("i"), cint(1))),
                    ],
                ),
                ret(name("total")),
            ],
        ))],
    );
    let mut vm = load(m);
    let w_res = call_global(&mut vm, "x::triangle", &[WObject::I32(5)]).unwrap();
    assert_eq!(w_res, WObject::I32(10));
}

/// Branches take the right arm.
#[test]
fn if_executes_both_arms() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "absval",
            vec![arg("n", name("i32"))],
            name("i32"),
            vec![
                if_(
                    cmp(CmpOpKind::Lt, name("n"), cint(0)),
                    vec![ret(neg(name("n")))],
                    vec![ret(name("n"))],
                ),
                ret(cint(0)),
            ],
        ))],
    );
    let mut vm = load(m);
    assert_eq!(
        call_global(&mut vm, "x::absval", &[WObject::I32(-7)]).unwrap(),
        WObject::I32(7)
    );
    assert_eq!(
        call_global(&mut vm, "x::absval", &[WObject::I32(3)]).unwrap(),
        WObject::I32(3)
    );
}

/// Mutable module globals are cells: updates persist across calls.
#[test]
fn module_cells_persist_across_calls() {
    let m = module(
        "x",
        vec![
            dvar("counter", name("i32"), cint(0)),
            dfn(red_fn(
                "bump",
                vec![],
                name("i32"),
                vec![
                    assign("counter", bin(BinOpKind::Add, name("counter"), cint(1))),
                    ret(name("counter")),
                ],
            )),
        ],
    );
    let mut vm = load(m);
    assert_eq!(call_global(&mut vm, "x::bump", &[]).unwrap(), WObject::I32(1));
    assert_eq!(call_global(&mut vm, "x::bump", &[]).unwrap(), WObject::I32(2));
}

/// Assigning a blue module const is rejected with the `var` hint.
#[test]
fn assigning_a_const_global_is_rejected() {
    let m = module(
        "x",
        vec![
            dconst("limit", cint(10)),
            dfn(red_fn(
                "f",
                vec![],
                name("NoneType"),
                vec![assign("limit", cint(3)), ret(cnone())],
            )),
        ],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "invalid assignment target");
    assert!(err
        .annotations
        .iter()
        .any(|ann| ann.message == "help: declare it as variable: `var limit ...`"));
}

/// Tuple unpacking assigns element by element.
#[test]
fn unpack_assign_executes() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "swapsum",
            vec![],
            name("i32"),
            vec![
                unpack(&["a", "b"], tuple_(vec![cint(30), cint(12)])),
                ret(bin(BinOpKind::Add, name("a"), name("b"))),
            ],
        ))],
    );
    let mut vm = load(m);
    assert_eq!(
        call_global(&mut vm, "x::swapsum", &[]).unwrap(),
        WObject::I32(42)
    );
}

/// Unpacking a non-tuple is a TypeError, not a crash.
#[test]
fn unpack_of_non_tuple_is_type_error() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![],
            name("i32"),
            vec![unpack(&["a", "b"], cint(5)), ret(cint(0))],
        ))],
    );
    let mut vm = load(m);
    let err = call_global(&mut vm, "x::f", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "`i32` does not support unpacking");
}

/// Raise aborts execution with the right error kind and message.
#[test]
fn raise_executes() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "boom",
            vec![],
            name("NoneType"),
            vec![raise_(call(name("ValueError"), vec![cstr("nope")]))],
        ))],
    );
    let mut vm = load(m);
    let err = call_global(&mut vm, "x::boom", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ValueError);
    assert_eq!(err.message, "nope");
}

/// A failed assert raises AssertionError with its message.
#[test]
fn assert_failure_executes() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "t",
            vec![arg("ok", name("bool"))],
            name("NoneType"),
            vec![assert_(name("ok"), Some(cstr("bang"))), ret(cnone())],
        ))],
    );
    let mut vm = load(m);
    assert_eq!(
        call_global(&mut vm, "x::t", &[WObject::Bool(true)]).unwrap(),
        WObject::None
    );
    let err = call_global(&mut vm, "x::t", &[WObject::Bool(false)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::AssertionError);
    assert_eq!(err.message, "bang");
}

/// Duplicate declarations carry both locations.
#[test]
fn duplicate_declaration_is_scope_error() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![],
            name("i32"),
            vec![
                local_var("a", name("i32"), Some(cint(1))),
                local_var("a", name("i32"), Some(cint(2))),
                ret(name("a")),
            ],
        ))],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ScopeError);
    assert_eq!(err.message, "variable `a` already declared");
    assert_eq!(err.annotations.len(), 2);
}

/// Boolean short-circuit operators evaluate to bools.
#[test]
fn and_or_execute() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "both",
            vec![arg("a", name("bool")), arg("b", name("bool"))],
            name("bool"),
            vec![ret(and_(name("a"), or_(name("b"), cbool(false))))],
        ))],
    );
    let mut vm = load(m);
    assert_eq!(
        call_global(&mut vm, "x::both", &[WObject::Bool(true), WObject::Bool(true)]).unwrap(),
        WObject::Bool(true)
    );
    assert_eq!(
        call_global(&mut vm, "x::both", &[WObject::Bool(true), WObject::Bool(false)]).unwrap(),
        WObject::Bool(false)
    );
}

/// Downcasting a `dynamic` value checks the actual type at run time.
#[test]
fn dynamic_downcast_checks_at_run_time() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![arg("x", name("dynamic"))],
            name("i32"),
            vec![ret(name("x"))],
        ))],
    );
    let mut vm = load(m);
    assert_eq!(
        call_global(&mut vm, "x::f", &[WObject::I32(5)]).unwrap(),
        WObject::I32(5)
    );
    let err = call_global(&mut vm, "x::f", &[WObject::str("oops")]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "Invalid cast. Expected `i32`, got `str`");
}

/// Integer division by zero is a runtime ZeroDivisionError.
#[test]
fn division_by_zero_raises() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "div",
            vec![arg("a", name("i32")), arg("b", name("i32"))],
            name("i32"),
            vec![ret(bin(BinOpKind::Div, name("a"), name("b")))],
        ))],
    );
    let mut vm = load(m);
    assert_eq!(
        call_global(&mut vm, "x::div", &[WObject::I32(7), WObject::I32(2)]).unwrap(),
        WObject::I32(3)
    );
    let err = call_global(&mut vm, "x::div", &[WObject::I32(1), WObject::I32(0)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
}
