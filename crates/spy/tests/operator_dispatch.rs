//! Operator dispatch through the MetaArg / OpSpec / OpImpl protocol:
//! UPPERCASE metafunction hooks, struct field access, method calls, and
//! the reference-equality fallback.

mod support;

use std::rc::Rc;

use pretty_assertions::assert_eq;
use spy::ast::{CmpOpKind, FuncKind};
use spy::errors::{ErrorKind, SpyResult};
use spy::function::{BuiltinFunc, BuiltinImpl, FuncData, FuncParam, FuncType};
use spy::location::Loc;
use spy::object::WObject;
use spy::opspec::{MetaArg, OpSpec};
use spy::symtable::Color;
use spy::vm::Vm;
use support::*;

// =============================================================================
// 1. __GETITEM__ metafunction hook
// =============================================================================

/// The blue `__GETITEM__` hook of `MyInt`: it selects `my_getitem` as the
/// implementation, whatever the argument shapes.
fn my_int_getitem(vm: &mut Vm, _loc: &Loc, _args_wm: &[MetaArg]) -> SpyResult<OpSpec> {
    let w_func = global_func(vm, "x::MyInt::my_getitem");
    Ok(OpSpec::simple(w_func))
}

fn my_getitem_impl(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    // ignore the receiver, add one to the index
    match &args[1] {
        WObject::I32(i) => Ok(WObject::I32(i + 1)),
        _ => unreachable!("typechecked"),
    }
}

/// `m[y]` on a type with a blue `__GETITEM__` resolves to a direct call of
/// the function the metafunction picked.
#[test]
fn getitem_dispatches_through_metafunc() {
    let m = module(
        "x",
        vec![
            dclass(struct_class("MyInt", vec![("__ll__", name("i32"))], vec![])),
            dfn(red_fn(
                "f",
                vec![arg("m", name("MyInt")), arg("y", name("i32"))],
                name("i32"),
                vec![ret(getitem(name("m"), vec![name("y")]))],
            )),
        ],
    );
    let mut vm = load(m);

    // attach the hook and its implementation to the type, the way builtin
    // types register their metafunctions
    let w_myint = vm.lookup_type(&fqn("x::MyInt")).unwrap();
    let impl_functype = Rc::new(FuncType::new(
        vec![
            FuncParam::simple(w_myint),
            FuncParam::simple(vm.b.w_i32),
        ],
        vm.b.w_i32,
        Color::Red,
        FuncKind::Plain,
    ));
    let w_impl = vm.add_func(FuncData::Builtin(BuiltinFunc {
        fqn: fqn("x::MyInt::my_getitem"),
        functype: impl_functype,
        pure: true,
        imp: BuiltinImpl::Host(my_getitem_impl),
        def_loc: None,
    }));
    vm.add_global(fqn("x::MyInt::my_getitem"), WObject::Func(w_impl));
    let meta_functype = Rc::new(FuncType::new(
        vec![],
        vm.b.w_opspec,
        Color::Blue,
        FuncKind::Metafunc,
    ));
    let w_meta = vm.add_func(FuncData::Builtin(BuiltinFunc {
        fqn: fqn("x::MyInt::__GETITEM__"),
        functype: meta_functype,
        pure: false,
        imp: BuiltinImpl::Meta(my_int_getitem),
        def_loc: None,
    }));
    vm.type_mut(w_myint)
        .dict_w
        .insert("__GETITEM__".to_owned(), WObject::Func(w_meta));

    vm.redshift(spy::ErrorMode::Eager).unwrap();
    let body = residual_body(&vm, "x::f");
    assert_eq!(
        body,
        vec![ret(call_fqn(
            "x::MyInt::my_getitem",
            vec![name_local("m"), name_local("y")]
        ))]
    );
    assert_residual_body(&body);
}

// =============================================================================
// 2. struct fields
// =============================================================================

/// Reading a struct field goes through the minted accessor.
#[test]
fn struct_field_read_uses_accessor() {
    let m = module(
        "x",
        vec![
            dclass(struct_class(
                "Point",
                vec![("x", name("i32")), ("y", name("i32"))],
                vec![],
            )),
            dfn(red_fn(
                "get_x",
                vec![arg("p", name("Point"))],
                name("i32"),
                vec![ret(getattr(name("p"), "x"))],
            )),
        ],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::get_x"),
        vec![ret(call_fqn("x::Point::__get_x__", vec![name_local("p")]))]
    );
}

/// Writing a struct field goes through the minted setter.
#[test]
fn struct_field_write_uses_accessor() {
    let m = module(
        "x",
        vec![
            dclass(struct_class("Point", vec![("x", name("i32"))], vec![])),
            dfn(red_fn(
                "set_x",
                vec![arg("p", name("Point")), arg("v", name("i32"))],
                name("NoneType"),
                vec![setattr_(name("p"), "x", name("v")), ret(cnone())],
            )),
        ],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::set_x");
    assert_eq!(
        body[0],
        stmt_expr(call_fqn(
            "x::Point::__set_x__",
            vec![name_local("p"), name_local("v")]
        ))
    );
}

/// An unknown attribute reports the receiver type.
#[test]
fn unknown_attribute_is_type_error() {
    let m = module(
        "x",
        vec![
            dclass(struct_class("Point", vec![("x", name("i32"))], vec![])),
            dfn(red_fn(
                "f",
                vec![arg("p", name("Point"))],
                name("i32"),
                vec![ret(getattr(name("p"), "z"))],
            )),
        ],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "type `x::Point` has no attribute 'z'");
}

/// Instantiating a struct and reading a field back, at compile time.
#[test]
fn struct_construction_executes() {
    let m = module(
        "x",
        vec![
            dclass(struct_class(
                "Point",
                vec![("x", name("i32")), ("y", name("i32"))],
                vec![],
            )),
            dfn(red_fn(
                "mk",
                vec![],
                name("i32"),
                vec![ret(getattr(
                    call(name("Point"), vec![cint(7), cint(9)]),
                    "y",
                ))],
            )),
        ],
    );
    let mut vm = load(m);
    let w_res = call_global(&mut vm, "x::mk", &[]).unwrap();
    assert_eq!(w_res, WObject::I32(9));
}

// =============================================================================
// 3. method calls
// =============================================================================

/// `obj.method(...)` passes the receiver as the implicit self.
#[test]
fn method_call_passes_self() {
    use spy::ast::BinOpKind;
    let m = module(
        "x",
        vec![
            dclass(struct_class(
                "Point",
                vec![("x", name("i32"))],
                vec![spy::ast::Stmt::FuncDef(red_fn(
                    "shifted",
                    vec![arg("self", name("Point")), arg("d", name("i32"))],
                    name("i32"),
                    vec![ret(bin(
                        BinOpKind::Add,
                        getattr(name("self"), "x"),
                        name("d"),
                    ))],
                ))],
            )),
            dfn(red_fn(
                "f",
                vec![arg("p", name("Point"))],
                name("i32"),
                vec![ret(callmethod(name("p"), "shifted", vec![cint(3)]))],
            )),
        ],
    );
    let vm = compile(m);
    let body = residual_body(&vm, "x::f");
    assert_eq!(
        body,
        vec![ret(call_fqn(
            "x::Point::shifted",
            vec![name_local("p"), cint(3)]
        ))]
    );
}

/// Calling a missing method names the receiver type and the method.
#[test]
fn missing_method_is_type_error() {
    let m = module(
        "x",
        vec![
            dclass(struct_class("Point", vec![("x", name("i32"))], vec![])),
            dfn(red_fn(
                "f",
                vec![arg("p", name("Point"))],
                name("i32"),
                vec![ret(callmethod(name("p"), "nope", vec![]))],
            )),
        ],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "method `x::Point::nope` does not exist");
}

// =============================================================================
// 4. reference-equality fallback
// =============================================================================

/// Two operands of the same typelift (reference) type with no `__eq__`
/// fall back to identity comparison.
#[test]
fn eq_falls_back_to_identity_for_reference_types() {
    let m = module(
        "x",
        vec![
            dclass(lifted_class("Handle", name("i32"), vec![])),
            dfn(red_fn(
                "same",
                vec![arg("a", name("Handle")), arg("b", name("Handle"))],
                name("bool"),
                vec![ret(cmp(CmpOpKind::Eq, name("a"), name("b")))],
            )),
        ],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::same"),
        vec![ret(call_fqn(
            "operator::is",
            vec![name_local("a"), name_local("b")]
        ))]
    );
}

/// `!=` uses the negated identity comparison.
#[test]
fn ne_falls_back_to_negated_identity() {
    let m = module(
        "x",
        vec![
            dclass(lifted_class("Handle", name("i32"), vec![])),
            dfn(red_fn(
                "differ",
                vec![arg("a", name("Handle")), arg("b", name("Handle"))],
                name("bool"),
                vec![ret(cmp(CmpOpKind::Ne, name("a"), name("b")))],
            )),
        ],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::differ"),
        vec![ret(call_fqn(
            "operator::isnot",
            vec![name_local("a"), name_local("b")]
        ))]
    );
}

/// Structs are value types: no identity fallback, so `==` on a struct
/// without `__eq__` is a type error.
#[test]
fn eq_on_value_types_has_no_fallback() {
    let m = module(
        "x",
        vec![
            dclass(struct_class("Point", vec![("x", name("i32"))], vec![])),
            dfn(red_fn(
                "same",
                vec![arg("a", name("Point")), arg("b", name("Point"))],
                name("bool"),
                vec![ret(cmp(CmpOpKind::Eq, name("a"), name("b")))],
            )),
        ],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "cannot do `x::Point` == `x::Point`");
}

/// Operands of two different reference types unify to `object`, which
/// blocks the fallback.
#[test]
fn eq_across_different_reference_types_has_no_fallback() {
    let m = module(
        "x",
        vec![
            dclass(lifted_class("A", name("i32"), vec![])),
            dclass(lifted_class("B", name("i32"), vec![])),
            dfn(red_fn(
                "same",
                vec![arg("a", name("A")), arg("b", name("B"))],
                name("bool"),
                vec![ret(cmp(CmpOpKind::Eq, name("a"), name("b")))],
            )),
        ],
    );
    let err = try_compile(m, spy::ErrorMode::Eager).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "cannot do `x::A` == `x::B`");
}

// =============================================================================
// 5. unary operators
// =============================================================================

/// Unary minus resolves through the unary multimethod table.
#[test]
fn unary_neg_resolves() {
    let m = module(
        "x",
        vec![dfn(red_fn(
            "f",
            vec![arg("n", name("i32"))],
            name("i32"),
            vec![ret(neg(name("n")))],
        ))],
    );
    let vm = compile(m);
    assert_eq!(
        residual_body(&vm, "x::f"),
        vec![ret(call_fqn("operator::i32_neg", vec![name_local("n")]))]
    );
}
