//! End-to-end redshift tests: the residual AST produced for simple red
//! functions.

mod support;

use pretty_assertions::assert_eq;
use spy::ast::{BinOpKind, Stmt};
use spy::object::WObject;
use support::*;

// =============================================================================
// 1. operator resolution
// =============================================================================

/// `def add(x: i32, y: i32) -> i32: return x + y` lowers the `+` to a
/// direct call of `operator::i32_add` on the two locals.
#[test]
fn add_becomes_direct_call() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "add",
            vec![arg("x", name("i32")), arg("y", name("i32"))],
            name("i32"),
            vec![ret(bin(BinOpKind::Add, name("x"), name("y")))],
        ))],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::add");
    assert_eq!(
        body,
        vec![ret(call_fqn(
            "operator::i32_add",
            vec![name_local("x"), name_local("y")]
        ))]
    );
    assert_residual_body(&body);
}

/// Blue subexpressions fold away: `return 1 + 2` becomes `return 3`.
#[test]
fn blue_arithmetic_folds() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "three",
            vec![],
            name("i32"),
            vec![ret(bin(BinOpKind::Add, cint(1), cint(2)))],
        ))],
    );
    let vm = compile(m);
    assert_eq!(residual_body(&vm, "x::three"), vec![ret(cint(3))]);
}

/// A mixed `i32 + f64` resolves through the multimethod table to the f64
/// implementation, with the integer side explicitly converted.
#[test]
fn mixed_arithmetic_inserts_conversion() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "mix",
            vec![arg("a", name("i32")), arg("b", name("f64"))],
            name("f64"),
            vec![ret(bin(BinOpKind::Add, name("a"), name("b")))],
        ))],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::mix"),
        vec![ret(call_fqn(
            "operator::f64_add",
            vec![
                call_fqn("operator::i32_to_f64", vec![name_local("a")]),
                name_local("b"),
            ]
        ))]
    );
}

// =============================================================================
// 2. implicit conversions at typecheck anchors
// =============================================================================

/// `def f(x: i32) -> f64: return x` wraps the return value in the
/// `i32_to_f64` conversion.
#[test]
fn return_conversion_is_made_explicit() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![arg("x", name("i32"))],
            name("f64"),
            vec![ret(name("x"))],
        ))],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::f"),
        vec![ret(call_fqn(
            "operator::i32_to_f64",
            vec![name_local("x")]
        ))]
    );
}

/// Returning a `dynamic` value from an `i32` function inserts the
/// run-time downcast.
#[test]
fn dynamic_return_inserts_downcast() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![arg("x", name("dynamic"))],
            name("i32"),
            vec![ret(name("x"))],
        ))],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::f"),
        vec![ret(call_fqn(
            "operator::downcast[builtins::i32]",
            vec![name_local("x")]
        ))]
    );
}

/// A local declaration with an incompatible initializer is a TypeError
/// pointing at the declaration.
#[test]
fn declaration_mismatch_is_type_error() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![],
            name("i32"),
            vec![
                local_var("s", name("str"), Some(cint(42))),
                ret(cint(0)),
            ],
        ))],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, spy::ErrorKind::TypeError);
    assert_eq!(err.message, "mismatched types");
    assert!(err
        .annotations
        .iter()
        .any(|ann| ann.message == "expected `str`, got `i32`"));
    assert!(err
        .annotations
        .iter()
        .any(|ann| ann.message == "expected `str` because of type declaration"));
}

// =============================================================================
// 3. statements
// =============================================================================

/// Control flow survives redshift with conditions shifted in place.
#[test]
fn while_loop_keeps_shape() {
    use spy::ast::CmpOpKind;
    let m = module(
        "x",
        vec![dfn(red_fn(
            "count",
            vec![arg("n", name("i32"))],
            name("i32"),
            vec![
                local_var("i", name("i32"), Some(cint(0))),
                while_(
                    cmp(CmpOpKind::Lt, name("i"), name("n")),
                    vec![assign("i", bin(BinOpKind::Add, name("i"), cint(1)))],
                ),
                ret(name("i")),
            ],
        ))],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::count");
    assert_residual_body(&body);
    assert_eq!(body.len(), 3);
    let Stmt::While { test, body: loop_body, .. } = &body[1] else {
        panic!("expected a while loop, got {:?}", body[1]);
    };
    assert_eq!(
        *test,
        call_fqn("operator::i32_lt", vec![name_local("i"), name_local("n")])
    );
    assert_eq!(
        loop_body,
        &vec![Stmt::AssignLocal {
            loc: lc(),
            target: ident("i"),
            value: call_fqn("operator::i32_add", vec![name_local("i"), cint(1)]),
        }]
    );
}

/// Assignments to red module globals become cell stores; reads become FQN
/// references.
#[test]
fn global_var_assignment_goes_through_cell() {
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
    let vm = compile(m);
    let body = residual_body(&vm, "x::bump");
    assert_eq!(
        body,
        vec![
            Stmt::AssignCell {
                loc: lc(),
                fqn: fqn("x::counter"),
                value: call_fqn(
                    "operator::i32_add",
                    vec![fqnconst("x::counter"), cint(1)]
                ),
            },
            ret(fqnconst("x::counter")),
        ]
    );
}

/// `assert False, "bang"` keeps its message and a folded test.
#[test]
fn assert_keeps_blue_test_and_message() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "t",
            vec![],
            name("NoneType"),
            vec![assert_(cbool(false), Some(cstr("bang"))), ret(cnone())],
        ))],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::t");
    assert_eq!(body[0], assert_(cbool(false), Some(cstr("bang"))));
}

/// An assert message which is not a string is rejected during redshift.
#[test]
fn assert_message_must_be_str() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "t",
            vec![],
            name("NoneType"),
            vec![assert_(cbool(true), Some(cint(3))), ret(cnone())],
        ))],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, spy::ErrorKind::TypeError);
    assert!(err
        .annotations
        .iter()
        .any(|ann| ann.message == "expected `str`, got `i32`"));
}

/// `raise ValueError("nope")` lowers to the 4-argument `operator::raise`
/// call carrying the message and the source position.
#[test]
fn raise_lowers_to_operator_raise() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "boom",
            vec![],
            name("NoneType"),
            vec![raise_(call(name("ValueError"), vec![cstr("nope")]))],
        ))],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::boom");
    assert_eq!(
        body,
        vec![stmt_expr(call_fqn(
            "operator::raise",
            vec![cstr("ValueError"), cstr("nope"), cstr("<fake>"), cint(1)]
        ))]
    );
}

/// `x += 1` desugars to `x = x + 1` before shifting.
#[test]
fn augassign_desugars() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![arg("a", name("i32"))],
            name("i32"),
            vec![aug_assign("a", BinOpKind::Add, cint(1)), ret(name("a"))],
        ))],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::f");
    assert_eq!(
        body[0],
        Stmt::AssignLocal {
            loc: lc(),
            target: ident("a"),
            value: call_fqn("operator::i32_add", vec![name_local("a"), cint(1)]),
        }
    );
}

// =============================================================================
// 4. redshifted functions stay runnable
// =============================================================================

/// The residual of `add` still computes: every kept node kind is
/// executable by the evaluator.
#[test]
fn residual_function_still_executes() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "add",
            vec![arg("x", name("i32")), arg("y", name("i32"))],
            name("i32"),
            vec![ret(bin(BinOpKind::Add, name("x"), name("y")))],
        ))],
    );
    let mut vm = compile(m);
    let w_res = call_global(&mut vm, "x::add", &[WObject::I32(40), WObject::I32(2)]).unwrap();
    assert_eq!(w_res, WObject::I32(42));
}

/// Falling off the end of a non-void body is a TypeError when the
/// function runs.
#[test]
fn missing_return_is_type_error() {
    let m = module(
        "x",
        vec![dfn(red_fn("f", vec![], name("i32"), vec![pass_()]))],
    );
    let mut vm = load(m);
    let err = call_global(&mut vm, "x::f", &[]).unwrap_err();
    assert_eq!(err.kind, spy::ErrorKind::TypeError);
    assert_eq!(
        err.message,
        "reached the end of the function without a `return`"
    );
}
