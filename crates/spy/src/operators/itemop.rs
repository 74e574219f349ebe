//! The `GETITEM` and `SETITEM` operators.

use crate::ast::FuncKind;
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::location::Loc;
use crate::object::WObject;
use crate::opimpl::OpImpl;
use crate::opspec::{MetaArg, OpSpec};
use crate::typecheck::{typecheck_opspec, DispatchKind};
use crate::vm::Vm;

/// Blue tuple indexing: both the tuple and the index must be known, and
/// the item folds to a constant.
fn tuple_getitem(vm: &Vm, wm_obj: &MetaArg, args: &[MetaArg]) -> SpyResult<OpSpec> {
    if args.len() != 1 {
        return Ok(OpSpec::NULL);
    }
    let (Ok(w_tup), Ok(w_idx)) = (wm_obj.blue_val(), args[0].blue_val()) else {
        return Ok(OpSpec::NULL);
    };
    let WObject::Tuple(items_w) = w_tup else {
        return Ok(OpSpec::NULL);
    };
    let i = vm.unwrap_i32(w_idx)?;
    let Ok(i) = usize::try_from(i) else {
        return Err(tuple_index_error(i as i64, items_w.len(), &args[0].loc));
    };
    match items_w.get(i) {
        Some(w_item) => Ok(OpSpec::constant(w_item.clone())),
        None => Err(tuple_index_error(i as i64, items_w.len(), &args[0].loc)),
    }
}

fn tuple_index_error(i: i64, len: usize, loc: &Loc) -> SpyError {
    SpyError::simple(
        ErrorKind::IndexError,
        format!("tuple index out of range: {i} (length {len})"),
        "out of range",
        loc.clone(),
    )
}

pub fn op_getitem(vm: &mut Vm, loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_obj = &args_wm[0];
    let rest = &args_wm[1..];
    let w_type = vm.type_(wm_obj.w_static_type).clone();

    let w_opspec = if matches!(&w_type.functype, Some(ft) if ft.kind == FuncKind::Generic) {
        // for generic functions, `[]` means "call"
        let w_val = wm_obj.blue_val()?;
        let w_func = w_val.as_func().ok_or_else(|| {
            SpyError::new(ErrorKind::PanicError, "generic value is not a function")
        })?;
        OpSpec::with_args(w_func, rest.to_vec()).direct_call()
    } else if wm_obj.w_static_type == vm.b.w_tuple {
        tuple_getitem(vm, wm_obj, rest)?
    } else if let Some(w_meta) = w_type.lookup_func("__GETITEM__") {
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else if let Some(w_getitem) = w_type.lookup_func("__getitem__") {
        OpSpec::with_args(w_getitem, args_wm.to_vec())
    } else {
        OpSpec::NULL
    };

    typecheck_opspec(
        vm,
        &w_opspec,
        args_wm,
        DispatchKind::Single,
        "cannot do `{0}`[...]",
    )
}

pub fn op_setitem(vm: &mut Vm, loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_obj = &args_wm[0];
    let w_type = vm.type_(wm_obj.w_static_type).clone();

    let w_opspec = if let Some(w_meta) = w_type.lookup_func("__SETITEM__") {
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else if let Some(w_setitem) = w_type.lookup_func("__setitem__") {
        OpSpec::with_args(w_setitem, args_wm.to_vec())
    } else {
        OpSpec::NULL
    };

    typecheck_opspec(
        vm,
        &w_opspec,
        args_wm,
        DispatchKind::Single,
        "cannot do `{0}`[...] = ...",
    )
}
