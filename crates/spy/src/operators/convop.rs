//! The implicit-conversion lattice.
//!
//! `convert_maybe` answers the question "does this argument already satisfy
//! the expected type, and if not, which unary conversion fixes it?".
//! Conversions are limited to a fixed lattice (integer widening,
//! integer-to-float, typelift wrap/unwrap, and `dynamic` downcasts whose
//! type check runs at run time); they are never implicit across
//! reference-kind boundaries.

use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::object::{FuncId, TypeId};
use crate::opspec::MetaArg;
use crate::vm::Vm;

/// `Ok(None)` if the argument is already assignable to `w_exp_type`
/// without loss, `Ok(Some(conv))` if a lattice conversion applies, a
/// `TypeError` otherwise.
pub fn convert_maybe(
    vm: &mut Vm,
    w_exp_type: TypeId,
    wm_arg: &MetaArg,
) -> SpyResult<Option<FuncId>> {
    let w_got_type = wm_arg.w_static_type;
    if is_assignable(vm, w_exp_type, w_got_type) {
        return Ok(None);
    }
    if let Some(w_conv) = vm.conv_table.get(&(w_got_type, w_exp_type)) {
        return Ok(Some(*w_conv));
    }
    if w_got_type == vm.b.w_dynamic {
        // downcast: the concrete type is only checkable at run time
        let w_conv = crate::builtins::dynamic_downcast_func(vm, w_exp_type);
        return Ok(Some(w_conv));
    }
    let exp = vm.type_(w_exp_type).human_name();
    let got = vm.type_(w_got_type).human_name();
    Err(SpyError::simple(
        ErrorKind::TypeError,
        "mismatched types",
        format!("expected `{exp}`, got `{got}`"),
        wm_arg.loc.clone(),
    ))
}

/// Static assignability, conversion-free: same type, or the target is at
/// the top of the lattice (`object`, `dynamic`).
pub fn is_assignable(vm: &Vm, w_exp_type: TypeId, w_got_type: TypeId) -> bool {
    if w_exp_type == w_got_type {
        return true;
    }
    if w_exp_type == vm.b.w_object || w_exp_type == vm.b.w_dynamic {
        return true;
    }
    // the empty list literal is assignable to every list type
    if w_got_type == vm.b.w_empty_list && vm.type_(w_exp_type).pyclass == crate::types::PyClass::List
    {
        return true;
    }
    false
}
