//! The `RAISE` operator.
//!
//! `raise` only accepts blue values: either an exception type (an
//! empty-message instance is synthesized) or an exception instance. Both
//! lower to a call of the `operator::raise` builtin carrying the message
//! and the source location, so every residual raise site keeps its
//! metadata.

use std::str::FromStr;

use crate::errors::{ErrorKind, Level, SpyError, SpyResult};
use crate::location::Loc;
use crate::object::WObject;
use crate::opimpl::OpImpl;
use crate::opspec::{MetaArg, OpSpec};
use crate::typecheck::{typecheck_opspec, DispatchKind};
use crate::types::PyClass;
use crate::vm::Vm;

pub fn op_raise(vm: &mut Vm, _loc: &Loc, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    let wm_exc = &args_wm[0];
    if !wm_exc.is_blue() {
        let mut err = SpyError::new(
            ErrorKind::TypeError,
            "`raise` only accepts blue values for now",
        );
        err.add(Level::Error, "this is red", wm_exc.loc.clone());
        return Err(err);
    }

    // two syntaxes: `raise IndexError` raises a type (empty message),
    // `raise IndexError("hello")` raises an instance
    let w_exc = wm_exc.blue_val()?;
    let (etype, message) = match w_exc {
        WObject::Type(w_cls) if vm.type_(*w_cls).pyclass == PyClass::Exception => {
            (vm.type_(*w_cls).fqn.symbol_name().to_owned(), String::new())
        }
        WObject::Exception(exc) => (exc.kind.to_string(), exc.message.clone()),
        _ => {
            let w_opspec = OpSpec::NULL;
            return typecheck_opspec(
                vm,
                &w_opspec,
                args_wm,
                DispatchKind::Single,
                "cannot raise `{0}`",
            );
        }
    };

    let args = vec![
        MetaArg::blue(vm.b.w_str, WObject::str(&etype), wm_exc.loc.clone()),
        MetaArg::blue(vm.b.w_str, WObject::str(&message), wm_exc.loc.clone()),
        MetaArg::blue(
            vm.b.w_str,
            WObject::str(&wm_exc.loc.filename),
            wm_exc.loc.clone(),
        ),
        MetaArg::blue(
            vm.b.w_i32,
            WObject::I32(wm_exc.loc.line_start as i32),
            wm_exc.loc.clone(),
        ),
    ];
    let w_opspec = OpSpec::with_args(vm.b.w_raise, args);
    typecheck_opspec(vm, &w_opspec, args_wm, DispatchKind::Single, "cannot raise `{0}`")
}

/// The runtime `operator::raise(etype, message, filename, lineno)` builtin.
pub fn raise_builtin(vm: &mut Vm, args_w: &[WObject]) -> SpyResult<WObject> {
    let etype = vm.unwrap_str(&args_w[0])?;
    let message = vm.unwrap_str(&args_w[1])?;
    let filename = vm.unwrap_str(&args_w[2])?;
    let lineno = vm.unwrap_i32(&args_w[3])?;
    let kind = ErrorKind::from_str(&etype).unwrap_or(ErrorKind::Exception);
    let loc = Loc::whole_line(&*filename, lineno as u32);
    Err(SpyError::simple(kind, message.to_string(), "", loc))
}
