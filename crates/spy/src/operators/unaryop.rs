//! Unary operators.

use crate::ast::UnaryOpKind;
use crate::errors::SpyResult;
use crate::location::Loc;
use crate::opimpl::OpImpl;
use crate::opspec::{MetaArg, OpSpec};
use crate::typecheck::{typecheck_opspec, DispatchKind};
use crate::vm::Vm;

pub fn op_unary(
    vm: &mut Vm,
    loc: &Loc,
    op: UnaryOpKind,
    args_wm: &[MetaArg],
) -> SpyResult<OpImpl> {
    debug_assert_eq!(args_wm.len(), 1);
    let wm_v = &args_wm[0];
    let w_vtype = wm_v.w_static_type;
    let token = op.token();

    let dunder = match op {
        UnaryOpKind::Neg => "__NEG__",
    };
    let w_opspec = if let Some(w_meta) = vm.type_(w_vtype).lookup_func(dunder) {
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else if let Some(w_impl) = vm.mm.lookup_unary(token, w_vtype) {
        OpSpec::simple(w_impl)
    } else {
        OpSpec::NULL
    };

    let errmsg = format!("cannot do {token}`{{0}}`");
    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Single, &errmsg)
}
