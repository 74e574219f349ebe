//! The typechecked output of dispatch: a concrete call template.

use std::rc::Rc;

use crate::errors::SpyResult;
use crate::function::{ArgSpec, FuncType};
use crate::object::{FuncId, TypeId, WObject};
use crate::symtable::Color;
use crate::vm::Vm;

#[derive(Debug, Clone)]
pub enum OpImplTarget {
    /// The operation folds to a compile-time constant.
    Const(WObject),
    /// Call `w_func`, building its real arguments from `args`.
    Call { w_func: FuncId, args: Vec<ArgSpec> },
}

/// A concrete, typechecked call template produced from an
/// [`crate::opspec::OpSpec`].
///
/// `w_in_functype` is the facade signature: its parameters are the static
/// types of the *incoming* arguments, its result and color those of the
/// target function.
#[derive(Debug, Clone)]
pub struct OpImpl {
    pub w_in_functype: Rc<FuncType>,
    pub target: OpImplTarget,
    pub pure: bool,
}

impl OpImpl {
    pub fn is_const(&self) -> bool {
        matches!(self.target, OpImplTarget::Const(_))
    }

    pub fn w_const(&self) -> Option<&WObject> {
        match &self.target {
            OpImplTarget::Const(w_val) => Some(w_val),
            OpImplTarget::Call { .. } => None,
        }
    }

    pub fn w_func(&self) -> Option<FuncId> {
        match &self.target {
            OpImplTarget::Call { w_func, .. } => Some(*w_func),
            OpImplTarget::Const(_) => None,
        }
    }

    pub fn color(&self) -> Color {
        self.w_in_functype.color
    }

    pub fn w_restype(&self) -> TypeId {
        self.w_in_functype.w_restype
    }

    /// Runs the template: realizes each [`ArgSpec`] against the runtime
    /// arguments, then calls the target function.
    pub fn execute(&self, vm: &mut Vm, args_w: &[WObject]) -> SpyResult<WObject> {
        match &self.target {
            OpImplTarget::Const(w_val) => Ok(w_val.clone()),
            OpImplTarget::Call { w_func, args } => {
                let mut real_args_w = Vec::with_capacity(args.len());
                for spec in args {
                    real_args_w.push(realize_argspec(vm, spec, args_w)?);
                }
                vm.fast_call(*w_func, &real_args_w)
            }
        }
    }
}

fn realize_argspec(vm: &mut Vm, spec: &ArgSpec, args_w: &[WObject]) -> SpyResult<WObject> {
    match spec {
        ArgSpec::Arg(i) => Ok(args_w[*i].clone()),
        ArgSpec::Const(w_val, _loc) => Ok(w_val.clone()),
        ArgSpec::Convert { w_conv, arg } => {
            let w_arg = realize_argspec(vm, arg, args_w)?;
            vm.fast_call(*w_conv, &[w_arg])
        }
    }
}
