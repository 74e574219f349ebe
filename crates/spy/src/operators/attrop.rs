//! The `GETATTR` and `SETATTR` operators.

use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::location::Loc;
use crate::object::WObject;
use crate::opimpl::OpImpl;
use crate::opspec::{MetaArg, OpSpec};
use crate::typecheck::{typecheck_opspec, DispatchKind};
use crate::vm::Vm;

fn attr_name_maybe(wm_attr: &MetaArg) -> String {
    wm_attr
        .blue_str()
        .map_or_else(|_| "<unknown>".to_owned(), str::to_owned)
}

/// Attribute access on a module object: a blue lookup in its item table.
fn module_getattr(vm: &Vm, wm_obj: &MetaArg, attr: &str) -> SpyResult<OpSpec> {
    let Some(module_id) = wm_obj.blue_val()?.as_module() else {
        return Ok(OpSpec::NULL);
    };
    let module = vm.module(module_id);
    let fqn = Fqn::from_parts([module.name.as_str(), attr]);
    match module.items.get(&fqn) {
        Some(w_val) => Ok(OpSpec::constant(deref_cell(vm, w_val))),
        None => Err(SpyError::simple(
            ErrorKind::ImportError,
            format!("cannot import `{attr}` from `{}`", module.name),
            "not found",
            wm_obj.loc.clone(),
        )),
    }
}

fn deref_cell(vm: &Vm, w_val: &WObject) -> WObject {
    match w_val {
        WObject::Cell(cell_id) => vm.cell(*cell_id).w_val.clone(),
        other => other.clone(),
    }
}

fn check_defined(vm: &Vm, wm_obj: &MetaArg) -> SpyResult<()> {
    let w_type = vm.type_(wm_obj.w_static_type);
    if w_type.is_defined {
        Ok(())
    } else {
        Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("type `{}` is not defined yet", w_type.human_name()),
            "forward-declared here",
            wm_obj.loc.clone(),
        ))
    }
}

pub fn op_getattr(vm: &mut Vm, loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_obj = &args_wm[0];
    let wm_attr = &args_wm[1];
    let attr = attr_name_maybe(wm_attr);
    let w_type_id = wm_obj.w_static_type;
    let w_type = vm.type_(w_type_id).clone();

    let w_opspec = if w_type_id == vm.b.w_module {
        module_getattr(vm, wm_obj, &attr)?
    } else if w_type_id == vm.b.w_dynamic {
        return Err(SpyError::wip("dynamic attribute access", loc.clone()));
    } else if w_type_id == vm.b.w_type {
        // attribute on a type object: a blue lookup in its dict
        match wm_obj
            .blue_val()?
            .as_type()
            .and_then(|cls| vm.type_(cls).lookup_attr(&attr).cloned())
        {
            Some(w_val) => OpSpec::constant(w_val),
            None => OpSpec::NULL,
        }
    } else if w_type.fields_w.contains_key(&attr) {
        check_defined(vm, wm_obj)?;
        let w_getter = w_type
            .lookup_func(&format!("__get_{attr}__"))
            .expect("field accessor minted at type definition");
        OpSpec::with_args(w_getter, vec![wm_obj.clone()])
    } else if let Some(w_meta) = w_type.lookup_func("__GETATTR__") {
        check_defined(vm, wm_obj)?;
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else {
        OpSpec::NULL
    };

    let errmsg = format!("type `{{0}}` has no attribute '{attr}'");
    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Single, &errmsg)
}

pub fn op_setattr(vm: &mut Vm, loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_obj = &args_wm[0];
    let wm_attr = &args_wm[1];
    let wm_value = &args_wm[2];
    let attr = attr_name_maybe(wm_attr);
    let w_type_id = wm_obj.w_static_type;
    let w_type = vm.type_(w_type_id).clone();

    let w_opspec = if w_type_id == vm.b.w_dynamic {
        return Err(SpyError::wip("dynamic attribute assignment", loc.clone()));
    } else if w_type.fields_w.contains_key(&attr) {
        check_defined(vm, wm_obj)?;
        let w_setter = w_type
            .lookup_func(&format!("__set_{attr}__"))
            .expect("field accessor minted at type definition");
        OpSpec::with_args(w_setter, vec![wm_obj.clone(), wm_value.clone()])
    } else if let Some(w_meta) = w_type.lookup_func("__SETATTR__") {
        check_defined(vm, wm_obj)?;
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else {
        OpSpec::NULL
    };

    let errmsg = format!("type `{{0}}` does not support assignment to attribute '{attr}'");
    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Single, &errmsg)
}
