//! Binary arithmetic, bitwise and comparison operators.

use crate::ast::{BinOpKind, CmpOpKind};
use crate::errors::SpyResult;
use crate::location::Loc;
use crate::object::TypeId;
use crate::opimpl::OpImpl;
use crate::opspec::{MetaArg, OpSpec};
use crate::typecheck::{typecheck_opspec, DispatchKind};
use crate::vm::Vm;

fn binop_dunder(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Add => "__add__",
        BinOpKind::Sub => "__sub__",
        BinOpKind::Mul => "__mul__",
        BinOpKind::Div => "__div__",
        BinOpKind::FloorDiv => "__floordiv__",
        BinOpKind::Mod => "__mod__",
        BinOpKind::LShift => "__lshift__",
        BinOpKind::RShift => "__rshift__",
        BinOpKind::BitAnd => "__and__",
        BinOpKind::BitOr => "__or__",
        BinOpKind::BitXor => "__xor__",
    }
}

fn cmpop_dunder(op: CmpOpKind) -> &'static str {
    match op {
        CmpOpKind::Eq => "__eq__",
        CmpOpKind::Ne => "__ne__",
        CmpOpKind::Lt => "__lt__",
        CmpOpKind::Le => "__le__",
        CmpOpKind::Gt => "__gt__",
        CmpOpKind::Ge => "__ge__",
    }
}

/// We can use identity to implement `==` if the two types have a common
/// ancestor and that ancestor is a reference type (not `object` or
/// `dynamic`).
fn can_use_reference_eq(vm: &Vm, w_ltype: TypeId, w_rtype: TypeId) -> bool {
    let w_common = vm.union_type(w_ltype, w_rtype);
    w_common != vm.b.w_object
        && w_common != vm.b.w_dynamic
        && vm.type_(w_common).is_reference_type()
}

/// The shared body of every binary OPERATOR: multimethod table first, then
/// the left type's dunder metafunction, then (for `==`/`!=`) the
/// reference-identity fallback.
fn dispatch_binary(
    vm: &mut Vm,
    loc: &Loc,
    token: &'static str,
    dunder: &'static str,
    args_wm: &[MetaArg],
    reference_eq: Option<bool>,
) -> SpyResult<OpImpl> {
    debug_assert_eq!(args_wm.len(), 2);
    let wm_l = &args_wm[0];
    let wm_r = &args_wm[1];
    let w_ltype = wm_l.w_static_type;
    let w_rtype = wm_r.w_static_type;

    let w_opspec = if let Some(w_impl) = vm.mm.lookup(token, w_ltype, w_rtype) {
        OpSpec::simple(w_impl)
    } else if let Some(w_meta) = vm.type_(w_ltype).lookup_func(dunder) {
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else if let Some(negated) = reference_eq {
        if can_use_reference_eq(vm, w_ltype, w_rtype) {
            let w_impl = if negated {
                vm.b.w_object_isnot
            } else {
                vm.b.w_object_is
            };
            OpSpec::simple(w_impl)
        } else {
            OpSpec::NULL
        }
    } else {
        OpSpec::NULL
    };

    let errmsg = format!("cannot do `{{0}}` {token} `{{1}}`");
    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Multi, &errmsg)
}

pub fn op_binary(
    vm: &mut Vm,
    loc: &Loc,
    op: BinOpKind,
    args_wm: &[MetaArg],
) -> SpyResult<OpImpl> {
    dispatch_binary(vm, loc, op.token(), binop_dunder(op), args_wm, None)
}

pub fn op_cmp(vm: &mut Vm, loc: &Loc, op: CmpOpKind, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let reference_eq = match op {
        CmpOpKind::Eq => Some(false),
        CmpOpKind::Ne => Some(true),
        _ => None,
    };
    dispatch_binary(vm, loc, op.token(), cmpop_dunder(op), args_wm, reference_eq)
}
