//! The redshift pass.
//!
//! A [`DopplerFrame`] drives a [`Frame`] in redshift mode over the body of
//! a red function: every statement is replaced by a list of residual
//! statements, every expression by a residual expression in which all blue
//! computation has been folded away and every operator resolved to a
//! direct call of a concrete function.

use std::rc::Rc;

use ahash::AHashMap;
use tracing::trace;

use crate::ast::{Expr, Stmt, TypeAnn};
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::frame::{
    declare_arguments, desugar_augassign, AssignKind, Frame,
};
use crate::function::{ArgSpec, AstFunc, Closure};
use crate::location::Loc;
use crate::object::{ExceptionValue, FuncId, WObject};
use crate::operators::{call_op, Operator};
use crate::opimpl::{OpImpl, OpImplTarget};
use crate::symtable::Color;
use crate::vm::{ErrorMode, Vm};

/// Redshifts `w_func`, producing the residual function; the original is
/// invalidated with a forward pointer.
pub fn redshift(
    vm: &mut Vm,
    w_func: &AstFunc,
    w_old_func: FuncId,
    error_mode: ErrorMode,
) -> SpyResult<FuncId> {
    let mut dop = DopplerFrame::new(vm, w_func, error_mode)?;
    dop.redshift(vm, w_func, w_old_func)
}

/// Creates an AST node representing a constant with the given value.
///
/// Primitives reuse the literal node kinds; everything else gets a unique
/// FQN via `make_fqn_const` and becomes an `FQNConst`.
pub fn make_const(vm: &mut Vm, loc: &Loc, w_val: &WObject) -> Expr {
    match w_val {
        WObject::None => Expr::Constant {
            loc: loc.clone(),
            value: crate::ast::ConstValue::None,
        },
        WObject::Bool(b) => Expr::Constant {
            loc: loc.clone(),
            value: crate::ast::ConstValue::Bool(*b),
        },
        WObject::I32(x) => Expr::Constant {
            loc: loc.clone(),
            value: crate::ast::ConstValue::I32(*x),
        },
        WObject::F64(x) => Expr::Constant {
            loc: loc.clone(),
            value: crate::ast::ConstValue::F64(*x),
        },
        WObject::Str(s) => Expr::StrConst {
            loc: loc.clone(),
            value: s.to_string(),
        },
        WObject::LocVal(l) => Expr::LocConst {
            loc: loc.clone(),
            value: (**l).clone(),
        },
        WObject::Tuple(items_w) => Expr::Tuple {
            loc: loc.clone(),
            items: items_w.iter().map(|w| make_const(vm, loc, w)).collect(),
        },
        other => Expr::FQNConst {
            loc: loc.clone(),
            fqn: vm.make_fqn_const(other),
        },
    }
}

/// Turns a resolved [`OpImpl`] into the residual call expression.
pub fn shift_opimpl(
    vm: &mut Vm,
    loc: &Loc,
    w_opimpl: &OpImpl,
    orig_args: &[Expr],
) -> SpyResult<Expr> {
    match &w_opimpl.target {
        OpImplTarget::Const(w_const) => Ok(make_const(vm, loc, w_const)),
        OpImplTarget::Call { w_func, args } => {
            let func = make_const(vm, loc, &WObject::Func(*w_func));
            let mut real_args = Vec::with_capacity(args.len());
            for spec in args {
                real_args.push(shift_argspec(vm, spec, orig_args)?);
            }
            Ok(Expr::Call {
                loc: loc.clone(),
                func: Box::new(func),
                args: real_args,
            })
        }
    }
}

fn shift_argspec(vm: &mut Vm, spec: &ArgSpec, orig_args: &[Expr]) -> SpyResult<Expr> {
    match spec {
        ArgSpec::Arg(i) => Ok(orig_args[*i].clone()),
        ArgSpec::Const(w_const, loc) => Ok(make_const(vm, loc, w_const)),
        ArgSpec::Convert { w_conv, arg } => {
            let inner = shift_argspec(vm, arg, orig_args)?;
            let loc = inner.loc().clone();
            let conv_fqn = vm.func_data(*w_conv).fqn();
            Ok(Expr::Call {
                loc: loc.clone(),
                func: Box::new(Expr::FQNConst { loc, fqn: conv_fqn }),
                args: vec![inner],
            })
        }
    }
}

/// Performs redshift on one red AST function.
pub struct DopplerFrame {
    frame: Frame,
    error_mode: ErrorMode,
}

impl DopplerFrame {
    pub fn new(vm: &mut Vm, w_func: &AstFunc, error_mode: ErrorMode) -> SpyResult<Self> {
        debug_assert_eq!(w_func.color(), Color::Red);
        let mut frame = Frame::new(
            w_func.fqn.clone(),
            w_func.funcdef.symtable.clone(),
            w_func.closure.clone(),
            true,
        );
        declare_arguments(vm, &mut frame, w_func)?;
        Ok(Self { frame, error_mode })
    }

    pub fn redshift(
        &mut self,
        vm: &mut Vm,
        w_func: &AstFunc,
        w_old_func: FuncId,
    ) -> SpyResult<FuncId> {
        assert!(!w_func.redshifted, "cannot redshift twice");
        let funcdef = Rc::clone(&w_func.funcdef);

        // forward declaration of types
        for stmt in &funcdef.body {
            if let Stmt::ClassDef(classdef) = stmt {
                self.frame.fwdecl_classdef(vm, classdef)?;
            }
        }

        let new_body = self.shift_body(vm, &funcdef.body)?;
        let new_funcdef = funcdef.replace_body(new_body);

        // all the non-local lookups were shifted into constants, so the
        // residual function closes over nothing
        let locals_types_w: AHashMap<String, crate::object::TypeId> =
            self.frame.locals_types_w.clone();
        let w_newfunc = vm.add_func(crate::function::FuncData::Ast(AstFunc {
            fqn: w_func.fqn.clone(),
            functype: Rc::clone(&w_func.functype),
            funcdef: Rc::new(new_funcdef),
            closure: Closure::empty(),
            locals_types_w,
            redshifted: true,
            redshifted_into: None,
        }));

        // mark the original function as invalid
        if let crate::function::FuncData::Ast(old) = vm.func_data_mut(w_old_func) {
            old.redshifted_into = Some(w_newfunc);
        }
        trace!(fqn = %w_func.fqn, "redshift complete");
        Ok(w_newfunc)
    }

    fn shift_body(&mut self, vm: &mut Vm, body: &[Stmt]) -> SpyResult<Vec<Stmt>> {
        let mut new_body = Vec::with_capacity(body.len());
        for stmt in body {
            new_body.extend(self.shift_stmt(vm, stmt)?);
        }
        Ok(new_body)
    }

    /// Shifts one statement into its residual replacement list.
    ///
    /// Under lazy error mode, static errors raised while shifting become a
    /// residual `raise` plus a warning; everything else propagates.
    pub fn shift_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Vec<Stmt>> {
        match self.shift_stmt_inner(vm, stmt) {
            Ok(stmts) => Ok(stmts),
            Err(err) if self.error_mode == ErrorMode::Lazy && err.kind.is_static() => {
                vm.emit_warning(err.clone());
                self.make_raise_from_error(vm, stmt, &err)
            }
            Err(mut err) => {
                err.add_location_maybe(stmt.loc().clone());
                Err(err)
            }
        }
    }

    /// Turns the failing statement into a residual `raise` of the error.
    fn make_raise_from_error(
        &mut self,
        vm: &mut Vm,
        stmt: &Stmt,
        err: &SpyError,
    ) -> SpyResult<Vec<Stmt>> {
        let w_exc = WObject::Exception(Rc::new(ExceptionValue {
            kind: err.kind,
            message: err.message.clone(),
        }));
        let fqn = vm.make_fqn_const(&w_exc);
        let raise = Stmt::Raise {
            loc: stmt.loc().clone(),
            exc: Expr::FQNConst {
                loc: stmt.loc().clone(),
                fqn,
            },
        };
        self.shift_stmt(vm, &raise)
    }

    fn eval_and_shift(
        &mut self,
        vm: &mut Vm,
        expr: &Expr,
        varname: Option<&str>,
    ) -> SpyResult<Expr> {
        let out = self.frame.eval_expr(vm, expr, varname)?;
        Ok(out.residual())
    }

    fn shift_stmt_inner(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Vec<Stmt>> {
        match stmt {
            Stmt::Pass { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {
                Ok(vec![stmt.clone()])
            }
            Stmt::Return { loc, value } => {
                let newvalue = self.eval_and_shift(vm, value, Some("@return"))?;
                Ok(vec![Stmt::Return {
                    loc: loc.clone(),
                    value: newvalue,
                }])
            }
            Stmt::VarDef(vardef) => {
                let out = self.frame.exec_vardef(vm, vardef)?;
                if self.frame.local_color(&vardef.name) == Color::Blue {
                    // redshift away declarations of blue locals
                    return Ok(vec![]);
                }
                // use the type computed during inference; it is blue either
                // way, so it shifts to a constant
                let newtype = make_const(vm, vardef.type_.loc(), &WObject::Type(out.w_type));
                let newvalue = out
                    .value_out
                    .map(crate::frame::EvalOut::residual);
                Ok(vec![Stmt::VarDef(crate::ast::VarDef {
                    loc: vardef.loc.clone(),
                    name: vardef.name.clone(),
                    kind: vardef.kind,
                    type_: TypeAnn::Expr(newtype),
                    value: newvalue,
                })])
            }
            Stmt::Assign { loc, target, value } => {
                let out = self.frame.exec_assign(vm, target, value)?;
                match out.kind {
                    AssignKind::Local {
                        color: Color::Blue, ..
                    } => {
                        // redshift away assignments to blue locals
                        Ok(vec![])
                    }
                    AssignKind::Local { name, .. } => Ok(vec![Stmt::AssignLocal {
                        loc: loc.clone(),
                        target: crate::ast::Ident {
                            loc: target.loc.clone(),
                            name,
                        },
                        value: out.value_out.residual(),
                    }]),
                    AssignKind::Global { fqn } => Ok(vec![Stmt::AssignCell {
                        loc: loc.clone(),
                        fqn,
                        value: out.value_out.residual(),
                    }]),
                }
            }
            Stmt::AssignLocal { .. } | Stmt::AssignCell { .. } => {
                // specialized assignments exist only inside redshifted
                // ASTs, so we should never see them here
                Err(SpyError::new(
                    ErrorKind::PanicError,
                    "residual assignment in input AST",
                ))
            }
            Stmt::AugAssign {
                loc,
                op,
                target,
                value,
            } => {
                let assign = desugar_augassign(loc, *op, target, value);
                self.shift_stmt_inner(vm, &assign)
            }
            Stmt::UnpackAssign { loc, targets, value } => {
                let out = self.frame.exec_unpack(vm, targets, value)?;
                Ok(vec![Stmt::UnpackAssign {
                    loc: loc.clone(),
                    targets: targets.clone(),
                    value: out.residual(),
                }])
            }
            Stmt::SetAttr {
                loc,
                target,
                attr,
                value,
            } => {
                let t = self.frame.eval_expr(vm, target, None)?;
                let a = self.frame.eval_expr(vm, attr, None)?;
                let v = self.frame.eval_expr(vm, value, None)?;
                let args_wam = [t.wam.clone(), a.wam.clone(), v.wam.clone()];
                let w_opimpl = call_op(vm, loc, Operator::SetAttr, &args_wam)?;
                self.frame.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
                let orig_args = [t.residual(), a.residual(), v.residual()];
                let call = shift_opimpl(vm, loc, &w_opimpl, &orig_args)?;
                Ok(vec![Stmt::StmtExpr {
                    loc: loc.clone(),
                    value: call,
                }])
            }
            Stmt::SetItem {
                loc,
                target,
                args,
                value,
            } => {
                let mut outs = vec![self.frame.eval_expr(vm, target, None)?];
                for arg in args {
                    outs.push(self.frame.eval_expr(vm, arg, None)?);
                }
                outs.push(self.frame.eval_expr(vm, value, None)?);
                let args_wam: Vec<_> = outs.iter().map(|out| out.wam.clone()).collect();
                let w_opimpl = call_op(vm, loc, Operator::SetItem, &args_wam)?;
                self.frame.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
                let orig_args: Vec<Expr> = outs
                    .into_iter()
                    .map(crate::frame::EvalOut::residual)
                    .collect();
                let call = shift_opimpl(vm, loc, &w_opimpl, &orig_args)?;
                Ok(vec![Stmt::StmtExpr {
                    loc: loc.clone(),
                    value: call,
                }])
            }
            Stmt::StmtExpr { loc, value } => {
                let newvalue = self.eval_and_shift(vm, value, None)?;
                Ok(vec![Stmt::StmtExpr {
                    loc: loc.clone(),
                    value: newvalue,
                }])
            }
            Stmt::If {
                loc,
                test,
                then_body,
                else_body,
            } => {
                let newtest = self.eval_and_shift(vm, test, Some("@if"))?;
                let newthen = self.shift_body(vm, then_body)?;
                let newelse = self.shift_body(vm, else_body)?;
                Ok(vec![Stmt::If {
                    loc: loc.clone(),
                    test: newtest,
                    then_body: newthen,
                    else_body: newelse,
                }])
            }
            Stmt::While { loc, test, body } => {
                let newtest = self.eval_and_shift(vm, test, Some("@while"))?;
                let newbody = self.shift_body(vm, body)?;
                Ok(vec![Stmt::While {
                    loc: loc.clone(),
                    test: newtest,
                    body: newbody,
                }])
            }
            Stmt::For { loc, .. } => Err(SpyError::wip(
                "`for` loops need the iterator runtime",
                loc.clone(),
            )),
            Stmt::Raise { loc, exc } => {
                let out_exc = self.frame.eval_expr(vm, exc, None)?;
                let args_wam = [out_exc.wam.clone()];
                let w_opimpl = call_op(vm, loc, Operator::Raise, &args_wam)?;
                self.frame.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
                let orig_args = [out_exc.residual()];
                let call = shift_opimpl(vm, loc, &w_opimpl, &orig_args)?;
                Ok(vec![Stmt::StmtExpr {
                    loc: loc.clone(),
                    value: call,
                }])
            }
            Stmt::Assert { loc, test, msg } => {
                let new_test = self.eval_and_shift(vm, test, Some("@assert"))?;
                let new_msg = match msg {
                    None => None,
                    Some(msg_expr) => {
                        let out = self.frame.eval_expr(vm, msg_expr, None)?;
                        if out.wam.w_static_type != vm.b.w_str {
                            let got = vm.type_(out.wam.w_static_type).human_name();
                            return Err(SpyError::simple(
                                ErrorKind::TypeError,
                                "mismatched types",
                                format!("expected `str`, got `{got}`"),
                                out.wam.loc.clone(),
                            ));
                        }
                        Some(out.residual())
                    }
                };
                Ok(vec![Stmt::Assert {
                    loc: loc.clone(),
                    test: new_test,
                    msg: new_msg,
                }])
            }
            Stmt::FuncDef(funcdef) => {
                if funcdef.color == Color::Red {
                    return Err(SpyError::wip(
                        "nested red functions cannot be redshifted",
                        funcdef.loc.clone(),
                    ));
                }
                // a blue inner definition is a compile-time artifact
                self.frame.exec_funcdef(vm, funcdef)?;
                Ok(vec![])
            }
            Stmt::ClassDef(classdef) => {
                self.frame.exec_classdef(vm, classdef)?;
                Ok(vec![])
            }
        }
    }
}
