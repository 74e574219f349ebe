//! The `CALL` and `CALL_METHOD` operators.

use crate::ast::FuncKind;
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::location::Loc;
use crate::object::WObject;
use crate::opimpl::OpImpl;
use crate::opspec::{MetaArg, OpSpec, OpSpecKind};
use crate::typecheck::{typecheck_opspec, DispatchKind};
use crate::vm::Vm;

/// The default call protocol of function values: the callee must be blue
/// (we have to know *which* function we are calling), the remaining
/// MetaArgs become its arguments.
fn func_op_call(wm_func: &MetaArg, rest: &[MetaArg]) -> SpyResult<OpSpec> {
    let Ok(w_val) = wm_func.blue_val() else {
        return Err(SpyError::simple(
            ErrorKind::Wip,
            "indirect calls not supported",
            "the callee is red",
            wm_func.loc.clone(),
        ));
    };
    let w_func = w_val.as_func().ok_or_else(|| {
        SpyError::new(ErrorKind::PanicError, "function-typed value is not a function")
    })?;
    Ok(OpSpec::with_args(w_func, rest.to_vec()).direct_call())
}

/// Instantiation: calling a type object dispatches to its `__NEW__`
/// metafunction or `__new__` constructor.
fn type_op_call(
    vm: &mut Vm,
    loc: &Loc,
    wm_cls: &MetaArg,
    rest: &[MetaArg],
) -> SpyResult<OpSpec> {
    let w_cls = wm_cls.blue_val()?.as_type().ok_or_else(|| {
        SpyError::new(ErrorKind::PanicError, "type-typed value is not a type")
    })?;
    let cls = vm.type_(w_cls).clone();
    if !cls.is_defined {
        return Err(SpyError::simple(
            ErrorKind::TypeError,
            format!("cannot instantiate `{}`", cls.human_name()),
            "type not defined yet",
            loc.clone(),
        ));
    }
    if cls.pyclass == crate::types::PyClass::Exception {
        // `ValueError()` defaults the message to the empty string
        let w_new = cls
            .lookup_func("__new__")
            .expect("exception types always carry __new__");
        let mut args = vec![wm_cls.clone()];
        if rest.is_empty() {
            args.push(MetaArg::blue(vm.b.w_str, WObject::str(""), loc.clone()));
        } else {
            args.extend(rest.iter().cloned());
        }
        return Ok(OpSpec::with_args(w_new, args));
    }
    if let Some(w_meta) = cls.lookup_func("__NEW__") {
        let mut args = vec![wm_cls.clone()];
        args.extend(rest.iter().cloned());
        return vm.fast_metacall(w_meta, loc, &args);
    }
    if let Some(w_new) = cls.lookup_func("__new__") {
        return Ok(OpSpec::with_args(w_new, rest.to_vec()).direct_call());
    }
    Ok(OpSpec::NULL)
}

pub fn op_call(vm: &mut Vm, loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_func = &args_wm[0];
    let rest = &args_wm[1..];
    let w_type_id = wm_func.w_static_type;
    let w_type = vm.type_(w_type_id).clone();

    let mut errmsg = "cannot call objects of type `{0}`".to_owned();
    let w_opspec = if let Some(functype) = &w_type.functype {
        match functype.kind {
            FuncKind::Plain => func_op_call(wm_func, rest)?,
            FuncKind::Metafunc => {
                // metafunctions expand at dispatch time; the default
                // calling convention passes only the non-function args
                let w_val = wm_func.blue_val()?;
                let w_meta = w_val.as_func().ok_or_else(|| {
                    SpyError::new(ErrorKind::PanicError, "metafunc value is not a function")
                })?;
                let spec = vm.fast_metacall(w_meta, loc, rest)?;
                match spec.kind {
                    OpSpecKind::Simple(w_func) => OpSpec::with_args(w_func, rest.to_vec()),
                    _ => spec,
                }
            }
            FuncKind::Generic => {
                errmsg = "generic functions must be called via `[...]`".to_owned();
                OpSpec::NULL
            }
        }
    } else if w_type_id == vm.b.w_type {
        type_op_call(vm, loc, wm_func, rest)?
    } else if w_type_id == vm.b.w_dynamic {
        return Err(SpyError::wip("dynamic calls", loc.clone()));
    } else if let Some(w_call) = w_type.lookup_func("__CALL__") {
        vm.fast_metacall(w_call, loc, args_wm)?
    } else {
        OpSpec::NULL
    };

    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Single, &errmsg)
}

pub fn op_call_method(vm: &mut Vm, loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_obj = &args_wm[0];
    let wm_method = &args_wm[1];
    let rest = &args_wm[2..];
    let w_type = vm.type_(wm_obj.w_static_type).clone();

    // if the type provides __CALL_METHOD__, it takes over entirely
    let meth = wm_method.blue_str()?.to_owned();
    let w_opspec = if let Some(w_meta) = w_type.lookup_func("__CALL_METHOD__") {
        vm.fast_metacall(w_meta, loc, args_wm)?
    } else if let Some(w_func) = w_type.lookup_func(&meth) {
        // the default implementation looks into the type dict and passes
        // the receiver as the implicit self
        let mut newargs = vec![wm_obj.clone()];
        newargs.extend(rest.iter().cloned());
        let functype = vm.func_data(w_func).functype();
        if functype.kind == FuncKind::Metafunc {
            vm.fast_metacall(w_func, loc, &newargs)?
        } else {
            OpSpec::with_args(w_func, newargs)
        }
    } else {
        OpSpec::NULL
    };

    let errmsg = format!("method `{{0}}::{meth}` does not exist");
    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Single, &errmsg)
}
