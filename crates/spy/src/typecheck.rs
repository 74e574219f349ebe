//! Turning an [`OpSpec`] into a typechecked [`OpImpl`].

use std::rc::Rc;

use crate::errors::{ErrorKind, Level, SpyError, SpyResult};
use crate::function::{ArgSpec, FuncParam, FuncType};
use crate::location::Loc;
use crate::object::FuncId;
use crate::opimpl::{OpImpl, OpImplTarget};
use crate::operators::convop::convert_maybe;
use crate::opspec::{MetaArg, OpSpec, OpSpecKind};
use crate::symtable::Color;
use crate::vm::Vm;

/// How an OPERATOR selects its implementation, used only for diagnostics:
/// single dispatch blames the receiver, multi dispatch lists every operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Single,
    Multi,
}

fn maybe_plural(n: usize, singular: &str) -> String {
    if n == 1 {
        singular.to_owned()
    } else {
        format!("{singular}s")
    }
}

/// Substitutes `{0}`, `{1}`, ... in `errmsg` with the human names of the
/// operand types.
fn format_errmsg(vm: &Vm, errmsg: &str, in_args: &[MetaArg]) -> String {
    let mut msg = errmsg.to_owned();
    for (i, wm_arg) in in_args.iter().enumerate() {
        let name = vm.type_(wm_arg.w_static_type).human_name();
        msg = msg.replace(&format!("{{{i}}}"), &name);
    }
    msg
}

/// The facade signature of an OpImpl: the incoming static types as
/// parameters, the target's result type and color.
pub fn functype_from_opargs(
    args_wm: &[MetaArg],
    w_restype: crate::object::TypeId,
    color: Color,
) -> Rc<FuncType> {
    let params = args_wm
        .iter()
        .map(|wm| FuncParam::simple(wm.w_static_type))
        .collect();
    Rc::new(FuncType::new(
        params,
        w_restype,
        color,
        crate::ast::FuncKind::Plain,
    ))
}

/// Verifies arity, inserts implicit conversions, and produces the final
/// [`OpImpl`] ready to be executed.
pub fn typecheck_opspec(
    vm: &mut Vm,
    w_opspec: &OpSpec,
    in_args_wm: &[MetaArg],
    dispatch: DispatchKind,
    errmsg: &str,
) -> SpyResult<OpImpl> {
    let (w_func, out_args_wm): (FuncId, Vec<MetaArg>) = match &w_opspec.kind {
        OpSpecKind::Null => {
            return Err(opspec_null_error(vm, in_args_wm, dispatch, errmsg));
        }
        OpSpecKind::Const(w_val) => {
            let w_restype = vm.dynamic_type(w_val);
            return Ok(OpImpl {
                w_in_functype: functype_from_opargs(in_args_wm, w_restype, Color::Blue),
                target: OpImplTarget::Const(w_val.clone()),
                pure: true,
            });
        }
        OpSpecKind::Simple(w_func) => (*w_func, in_args_wm.to_vec()),
        OpSpecKind::Args(w_func, args_wm) => (*w_func, args_wm.clone()),
    };

    let func = vm.func_data(w_func).clone();
    let w_out_functype = func.functype();
    let w_in_functype =
        functype_from_opargs(in_args_wm, w_out_functype.w_restype, w_out_functype.color);

    // if it's a direct call, we can point extra info at the call location
    let def_loc = func.def_loc();
    let call_loc = if w_opspec.is_direct_call {
        Some(in_args_wm[0].loc.clone())
    } else {
        None
    };

    let got_nargs = out_args_wm.len();
    if !w_out_functype.is_argcount_ok(got_nargs) {
        return Err(call_error_wrong_argcount(
            got_nargs,
            w_out_functype.fixed_argcount(),
            &out_args_wm,
            def_loc.as_ref(),
            call_loc.as_ref(),
        ));
    }

    let mut args: Vec<ArgSpec> = Vec::with_capacity(out_args_wm.len());
    for (i, wm_out_arg) in out_args_wm.iter().enumerate() {
        let param = w_out_functype.param_at(i);

        if w_out_functype.color == Color::Blue && wm_out_arg.color == Color::Red {
            let mut err = SpyError::new(
                ErrorKind::TypeError,
                "cannot call blue function with red arguments",
            );
            if let Some(loc) = &call_loc {
                err.add(Level::Error, "this is blue", loc.clone());
            }
            err.add(Level::Error, "this is red", wm_out_arg.loc.clone());
            if let Some(loc) = &def_loc {
                err.add(Level::Note, "function defined here", loc.clone());
            }
            return Err(err);
        }

        // add a converter if needed (this can raise TypeError)
        let w_conv = get_w_conv(vm, param.w_type, wm_out_arg, def_loc.as_ref())?;
        let mut arg = if wm_out_arg.is_blue() {
            ArgSpec::Const(wm_out_arg.blue_val()?.clone(), wm_out_arg.loc.clone())
        } else {
            // red MetaArgs MUST come from the incoming argument list
            let i = in_args_wm
                .iter()
                .position(|wm| wm.same_arg(wm_out_arg))
                .ok_or_else(|| {
                    SpyError::new(
                        ErrorKind::PanicError,
                        "OpSpec returned a red argument not present in the input",
                    )
                })?;
            ArgSpec::Arg(i)
        };
        if let Some(w_conv) = w_conv {
            arg = ArgSpec::Convert {
                w_conv,
                arg: Box::new(arg),
            };
        }
        args.push(arg);
    }

    Ok(OpImpl {
        w_in_functype,
        target: OpImplTarget::Call { w_func, args },
        pure: func.is_pure(),
    })
}

/// Like [`convert_maybe`], but improves the error with the callee's
/// definition site when known.
fn get_w_conv(
    vm: &mut Vm,
    w_type: crate::object::TypeId,
    wm_arg: &MetaArg,
    def_loc: Option<&Loc>,
) -> SpyResult<Option<FuncId>> {
    convert_maybe(vm, w_type, wm_arg).map_err(|mut err| {
        if err.matches(ErrorKind::TypeError) {
            if let Some(loc) = def_loc {
                err.add(Level::Note, "function defined here", loc.clone());
            }
        }
        err
    })
}

/// No OpSpec matched: build the type error, blaming the receiver (single
/// dispatch) or every operand (multi dispatch).
fn opspec_null_error(
    vm: &Vm,
    in_args_wm: &[MetaArg],
    dispatch: DispatchKind,
    errmsg: &str,
) -> SpyError {
    let mut err = SpyError::new(ErrorKind::TypeError, format_errmsg(vm, errmsg, in_args_wm));
    match dispatch {
        DispatchKind::Single => {
            let wm_target = &in_args_wm[0];
            let t = vm.type_(wm_target.w_static_type).human_name();
            err.add(Level::Error, format!("this is `{t}`"), wm_target.loc.clone());
            if let Some(sym) = &wm_target.sym {
                err.add(
                    Level::Note,
                    format!("`{}` defined here", sym.name),
                    sym.loc.clone(),
                );
            }
        }
        DispatchKind::Multi => {
            for wm_arg in in_args_wm {
                let t = vm.type_(wm_arg.w_static_type).human_name();
                err.add(Level::Error, format!("this is `{t}`"), wm_arg.loc.clone());
            }
        }
    }
    err
}

fn call_error_wrong_argcount(
    got: usize,
    exp: usize,
    args_wm: &[MetaArg],
    def_loc: Option<&Loc>,
    call_loc: Option<&Loc>,
) -> SpyError {
    debug_assert_ne!(got, exp);
    let takes = maybe_plural(exp, &format!("takes {exp} argument"));
    let supplied = if got == 1 {
        "1 argument was supplied".to_owned()
    } else {
        format!("{got} arguments were supplied")
    };
    let mut err = SpyError::new(
        ErrorKind::TypeError,
        format!("this function {takes} but {supplied}"),
    );
    if let Some(call_loc) = call_loc {
        if got < exp {
            let diff = exp - got;
            let arguments = maybe_plural(diff, "argument");
            err.add(
                Level::Error,
                format!("{diff} {arguments} missing"),
                call_loc.clone(),
            );
        } else {
            let diff = got - exp;
            let arguments = maybe_plural(diff, "argument");
            // this assumes all extra arguments sit on the same line
            let first_extra = &args_wm[exp].loc;
            let last_extra = &args_wm[args_wm.len() - 1].loc;
            let loc = first_extra.with_col_end(last_extra.col_end);
            err.add(Level::Error, format!("{diff} extra {arguments}"), loc);
        }
    }
    if let Some(def_loc) = def_loc {
        err.add(Level::Note, "function defined here", def_loc.clone());
    }
    err
}
