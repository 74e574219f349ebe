//! The evaluator: one [`Frame`] per lexical scope.
//!
//! A frame executes statements and evaluates expressions to [`MetaArg`]s.
//! The same code runs in two modes: plain evaluation (blue functions,
//! module and class bodies, compile-time calls of red functions) and
//! redshift mode, where every evaluated expression also yields its
//! residual replacement ([`EvalOut::residual`]) and red results are not
//! executed.

use ahash::AHashMap;
use std::rc::Rc;

use crate::ast::{self, Expr, Stmt};
use crate::doppler::{make_const, shift_opimpl};
use crate::errors::{ErrorKind, Level, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::function::{AstFunc, Closure, FuncData, FuncParam, FuncType, NamespaceRef};
use crate::location::Loc;
use crate::object::{FuncId, TypeId, WObject};
use crate::operators::{call_op, Operator};
use crate::opimpl::OpImpl;
use crate::opspec::MetaArg;
use crate::symtable::{Color, SymTable, Symbol, VarStorage};
use crate::types::{ClassBody, PyClass, WType};
use crate::vm::Vm;

/// How a statement finished: the control-flow escape channel.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(WObject),
    Break,
    Continue,
}

/// The result of evaluating one expression: the MetaArg, plus the residual
/// replacement when the frame is redshifting.
#[derive(Debug)]
pub struct EvalOut {
    pub wam: MetaArg,
    pub residual: Option<Expr>,
}

impl EvalOut {
    /// The residual expression; only legal in redshift mode.
    pub fn residual(self) -> Expr {
        self.residual.expect("not redshifting")
    }
}

/// The outcome of [`Frame::exec_vardef`], rich enough for the doppler to
/// rebuild the statement.
pub struct VarDefOut {
    pub w_type: TypeId,
    pub is_auto: bool,
    pub value_out: Option<EvalOut>,
}

/// Where an assignment landed.
pub enum AssignKind {
    Local { name: String, color: Color },
    Global { fqn: Fqn },
}

pub struct AssignOut {
    pub kind: AssignKind,
    pub value_out: EvalOut,
}

pub struct Frame {
    /// Namespace under which artifacts generated by this frame are named.
    pub ns: Fqn,
    pub symtable: SymTable,
    pub closure: Closure,
    pub locals: NamespaceRef,
    pub locals_types_w: AHashMap<String, TypeId>,
    pub locals_colors: AHashMap<String, Color>,
    pub locals_decl_loc: AHashMap<String, Loc>,
    pub redshifting: bool,
    /// Set when running an already-redshifted function, where implicit
    /// conversions must all have been made explicit by the doppler.
    pub redshifted_func: bool,
}

impl Frame {
    pub fn new(ns: Fqn, symtable: SymTable, closure: Closure, redshifting: bool) -> Self {
        Self {
            ns,
            symtable,
            closure,
            locals: NamespaceRef::default(),
            locals_types_w: AHashMap::new(),
            locals_colors: AHashMap::new(),
            locals_decl_loc: AHashMap::new(),
            redshifting,
            redshifted_func: false,
        }
    }

    // ==== locals ====

    pub fn declare_local(
        &mut self,
        vm: &mut Vm,
        name: &str,
        w_type: TypeId,
        color: Color,
        loc: Loc,
    ) -> SpyResult<()> {
        if let Some(old_loc) = self.locals_decl_loc.get(name) {
            // for red frames the analyzer raises this eagerly; blue frames
            // only find out here
            let mut err = SpyError::new(
                ErrorKind::ScopeError,
                format!("variable `{name}` already declared"),
            );
            err.add(Level::Error, "this is the new declaration", loc);
            err.add(Level::Note, "this is the previous declaration", old_loc.clone());
            return Err(err);
        }
        if vm.type_(w_type).pyclass != PyClass::Func {
            vm.make_fqn_const(&WObject::Type(w_type));
        }
        self.locals_types_w.insert(name.to_owned(), w_type);
        self.locals_colors.insert(name.to_owned(), color);
        self.locals_decl_loc.insert(name.to_owned(), loc);
        Ok(())
    }

    pub fn store_local(&mut self, name: &str, w_value: WObject) {
        self.locals.borrow_mut().insert(name.to_owned(), w_value);
    }

    pub fn load_local(&self, name: &str) -> SpyResult<WObject> {
        self.locals.borrow().get(name).cloned().ok_or_else(|| {
            SpyError::new(
                ErrorKind::Exception,
                format!("read from uninitialized local `{name}`"),
            )
        })
    }

    pub fn local_color(&self, name: &str) -> Color {
        self.locals_colors
            .get(name)
            .copied()
            .unwrap_or(self.symtable.color)
    }

    // ==== statements ====

    pub fn exec_body(&mut self, vm: &mut Vm, body: &[Stmt]) -> SpyResult<Flow> {
        for stmt in body {
            match self.exec_stmt(vm, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    pub fn exec_stmt(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Flow> {
        self.exec_stmt_inner(vm, stmt).map_err(|mut err| {
            err.add_location_maybe(stmt.loc().clone());
            err
        })
    }

    fn exec_stmt_inner(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Flow> {
        match stmt {
            Stmt::Pass { .. } => Ok(Flow::Normal),
            Stmt::Return { value, .. } => {
                let out = self.eval_expr(vm, value, Some("@return"))?;
                let w_val = self.expect_value(&out.wam)?;
                Ok(Flow::Return(w_val))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::VarDef(vardef) => {
                self.exec_vardef(vm, vardef)?;
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value, .. } => {
                self.exec_assign(vm, target, value)?;
                Ok(Flow::Normal)
            }
            Stmt::AugAssign {
                loc,
                op,
                target,
                value,
            } => {
                let assign = desugar_augassign(loc, *op, target, value);
                self.exec_stmt_inner(vm, &assign)
            }
            Stmt::UnpackAssign { targets, value, .. } => {
                self.exec_unpack(vm, targets, value)?;
                Ok(Flow::Normal)
            }
            Stmt::AssignLocal { .. } | Stmt::AssignCell { .. } => {
                // specialized assignments exist only inside redshifted ASTs
                self.exec_residual_assign(vm, stmt)
            }
            Stmt::SetAttr {
                loc,
                target,
                attr,
                value,
            } => {
                let wm_obj = self.eval_expr(vm, target, None)?;
                let wm_attr = self.eval_expr(vm, attr, None)?;
                let wm_value = self.eval_expr(vm, value, None)?;
                let args_wam = [wm_obj.wam, wm_attr.wam, wm_value.wam];
                let w_opimpl = call_op(vm, loc, Operator::SetAttr, &args_wam)?;
                self.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
                Ok(Flow::Normal)
            }
            Stmt::SetItem {
                loc,
                target,
                args,
                value,
            } => {
                let mut args_wam = vec![self.eval_expr(vm, target, None)?.wam];
                for arg in args {
                    args_wam.push(self.eval_expr(vm, arg, None)?.wam);
                }
                args_wam.push(self.eval_expr(vm, value, None)?.wam);
                let w_opimpl = call_op(vm, loc, Operator::SetItem, &args_wam)?;
                self.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
                Ok(Flow::Normal)
            }
            Stmt::StmtExpr { value, .. } => {
                self.eval_expr(vm, value, None)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                ..
            } => {
                let out = self.eval_expr(vm, test, Some("@if"))?;
                let w_cond = self.expect_value(&out.wam)?;
                if vm.is_true(&w_cond)? {
                    self.exec_body(vm, then_body)
                } else {
                    self.exec_body(vm, else_body)
                }
            }
            Stmt::While { test, body, .. } => {
                loop {
                    let out = self.eval_expr(vm, test, Some("@while"))?;
                    let w_cond = self.expect_value(&out.wam)?;
                    if !vm.is_true(&w_cond)? {
                        break;
                    }
                    match self.exec_body(vm, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { loc, .. } => Err(SpyError::wip(
                "`for` loops need the iterator runtime",
                loc.clone(),
            )),
            Stmt::Raise { loc, exc } => {
                let wm_exc = self.eval_expr(vm, exc, None)?;
                let args_wam = [wm_exc.wam];
                let w_opimpl = call_op(vm, loc, Operator::Raise, &args_wam)?;
                self.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
                Ok(Flow::Normal)
            }
            Stmt::Assert { loc, test, msg } => {
                let out = self.eval_expr(vm, test, Some("@assert"))?;
                let msg_text = match msg {
                    None => String::new(),
                    Some(msg_expr) => {
                        let wm_msg = self.eval_expr(vm, msg_expr, None)?;
                        if wm_msg.wam.w_static_type != vm.b.w_str {
                            let got = vm.type_(wm_msg.wam.w_static_type).human_name();
                            return Err(SpyError::simple(
                                ErrorKind::TypeError,
                                "mismatched types",
                                format!("expected `str`, got `{got}`"),
                                wm_msg.wam.loc.clone(),
                            ));
                        }
                        match &wm_msg.wam.w_val {
                            Some(w_msg) => vm.unwrap_str(w_msg)?.to_string(),
                            None => String::new(),
                        }
                    }
                };
                let w_cond = self.expect_value(&out.wam)?;
                if vm.is_true(&w_cond)? {
                    Ok(Flow::Normal)
                } else {
                    Err(SpyError::simple(
                        ErrorKind::AssertionError,
                        msg_text,
                        "assertion failed",
                        loc.clone(),
                    ))
                }
            }
            Stmt::FuncDef(funcdef) => {
                self.exec_funcdef(vm, funcdef)?;
                Ok(Flow::Normal)
            }
            Stmt::ClassDef(classdef) => {
                self.exec_classdef(vm, classdef)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// Executes the residual-only assignment forms, which show up when a
    /// redshifted function is run at compile time (e.g. in tests).
    fn exec_residual_assign(&mut self, vm: &mut Vm, stmt: &Stmt) -> SpyResult<Flow> {
        match stmt {
            Stmt::AssignLocal { target, value, .. } => {
                let out = self.eval_expr(vm, value, None)?;
                let w_val = self.expect_value(&out.wam)?;
                if !self.locals_types_w.contains_key(&target.name) {
                    self.declare_local(
                        vm,
                        &target.name,
                        out.wam.w_static_type,
                        Color::Red,
                        target.loc.clone(),
                    )?;
                }
                self.store_local(&target.name, w_val);
                Ok(Flow::Normal)
            }
            Stmt::AssignCell { fqn, value, .. } => {
                let out = self.eval_expr(vm, value, None)?;
                let w_val = self.expect_value(&out.wam)?;
                vm.store_global(fqn, w_val)?;
                Ok(Flow::Normal)
            }
            _ => unreachable!("not a residual assignment"),
        }
    }

    // ==== declarations ====

    pub fn exec_vardef(&mut self, vm: &mut Vm, vardef: &ast::VarDef) -> SpyResult<VarDefOut> {
        let sym_color = self
            .symtable
            .lookup_definition_maybe(&vardef.name)
            .map_or(self.symtable.color, |sym| sym.color);
        match &vardef.type_ {
            ast::TypeAnn::Auto { loc } => {
                let Some(value) = &vardef.value else {
                    return Err(SpyError::simple(
                        ErrorKind::TypeError,
                        format!("cannot infer the type of `{}`", vardef.name),
                        "no initializer",
                        loc.clone(),
                    ));
                };
                let value_out = self.eval_expr(vm, value, None)?;
                let w_type = value_out.wam.w_static_type;
                self.declare_local(vm, &vardef.name, w_type, sym_color, vardef.loc.clone())?;
                self.store_vardef_value(&vardef.name, &value_out)?;
                Ok(VarDefOut {
                    w_type,
                    is_auto: true,
                    value_out: Some(value_out),
                })
            }
            ast::TypeAnn::Expr(type_expr) => {
                let w_type = self.eval_expr_type(vm, type_expr)?;
                self.declare_local(vm, &vardef.name, w_type, sym_color, vardef.loc.clone())?;
                let value_out = match &vardef.value {
                    None => None,
                    Some(value) => {
                        let out = self.eval_expr(vm, value, Some(&vardef.name))?;
                        self.store_vardef_value(&vardef.name, &out)?;
                        Some(out)
                    }
                };
                Ok(VarDefOut {
                    w_type,
                    is_auto: false,
                    value_out,
                })
            }
        }
    }

    /// Stores an initializer into its local: always outside redshift, and
    /// for blue locals (whose values must stay observable) inside it too.
    fn store_vardef_value(&mut self, name: &str, value_out: &EvalOut) -> SpyResult<()> {
        if !self.redshifting {
            let w_val = self.expect_value(&value_out.wam)?;
            self.store_local(name, w_val);
        } else if self.local_color(name) == Color::Blue {
            if let Some(w_val) = value_out.wam.w_val.clone() {
                self.store_local(name, w_val);
            }
        }
        Ok(())
    }

    pub fn exec_assign(
        &mut self,
        vm: &mut Vm,
        target: &ast::Ident,
        value: &Expr,
    ) -> SpyResult<AssignOut> {
        let sym = self.symtable.lookup_maybe(&target.name).cloned();
        match sym {
            Some(sym) if !sym.is_local() && sym.fqn.is_some() => {
                self.exec_assign_global(vm, target, value, &sym)
            }
            Some(sym) if !sym.is_local() => Err(SpyError::wip(
                format!("assignment to outer variable `{}`", sym.name),
                target.loc.clone(),
            )),
            _ => self.exec_assign_local(vm, target, value),
        }
    }

    fn exec_assign_local(
        &mut self,
        vm: &mut Vm,
        target: &ast::Ident,
        value: &Expr,
    ) -> SpyResult<AssignOut> {
        let name = &target.name;
        let is_declared = self.locals_types_w.contains_key(name);
        let value_out = if is_declared {
            self.eval_expr(vm, value, Some(name))?
        } else {
            // first assignment is an implicit declaration
            let out = self.eval_expr(vm, value, None)?;
            let color = self
                .symtable
                .lookup_definition_maybe(name)
                .map_or(self.symtable.color, |sym| sym.color);
            self.declare_local(vm, name, out.wam.w_static_type, color, target.loc.clone())?;
            out
        };
        if !self.redshifting {
            let w_val = self.expect_value(&value_out.wam)?;
            self.store_local(name, w_val);
        } else if self.local_color(name) == Color::Blue {
            // blue locals keep their values during redshift
            if let Some(w_val) = value_out.wam.w_val.clone() {
                self.store_local(name, w_val);
            }
        }
        Ok(AssignOut {
            kind: AssignKind::Local {
                name: name.clone(),
                color: self.local_color(name),
            },
            value_out,
        })
    }

    fn exec_assign_global(
        &mut self,
        vm: &mut Vm,
        target: &ast::Ident,
        value: &Expr,
        sym: &Symbol,
    ) -> SpyResult<AssignOut> {
        if sym.color == Color::Blue {
            let mut err = SpyError::new(ErrorKind::TypeError, "invalid assignment target");
            err.add(
                Level::Error,
                format!("{} is const", sym.name),
                target.loc.clone(),
            );
            err.add(Level::Note, "const declared here", sym.loc.clone());
            err.add(
                Level::Note,
                format!("help: declare it as variable: `var {} ...`", sym.name),
                sym.loc.clone(),
            );
            return Err(err);
        }
        let value_out = self.eval_expr(vm, value, None)?;
        let fqn = sym.fqn.clone().expect("global symbol has an FQN");
        if !self.redshifting {
            let w_val = self.expect_value(&value_out.wam)?;
            vm.store_global(&fqn, w_val)?;
        }
        Ok(AssignOut {
            kind: AssignKind::Global { fqn },
            value_out,
        })
    }

    pub fn exec_unpack(
        &mut self,
        vm: &mut Vm,
        targets: &[ast::Ident],
        value: &Expr,
    ) -> SpyResult<EvalOut> {
        let value_out = self.eval_expr(vm, value, None)?;
        if value_out.wam.w_static_type != vm.b.w_tuple {
            let t = vm.type_(value_out.wam.w_static_type).human_name();
            let mut err = SpyError::new(
                ErrorKind::TypeError,
                format!("`{t}` does not support unpacking"),
            );
            err.add(Level::Error, format!("this is `{t}`"), value.loc().clone());
            return Err(err);
        }
        let Some(WObject::Tuple(items_w)) = &value_out.wam.w_val else {
            return Err(SpyError::wip(
                "unpacking of red tuples",
                value.loc().clone(),
            ));
        };
        let exp = targets.len();
        let got = items_w.len();
        if exp != got {
            return Err(SpyError::new(
                ErrorKind::ValueError,
                format!("Wrong number of values to unpack: expected {exp}, got {got}"),
            ));
        }
        for (i, target) in targets.iter().enumerate() {
            // fabricate an expression reading the i-th element
            let item_expr = Expr::GetItem {
                loc: value.loc().clone(),
                value: Box::new(value.clone()),
                args: vec![Expr::Constant {
                    loc: value.loc().clone(),
                    value: ast::ConstValue::I32(i as i32),
                }],
            };
            self.exec_assign(vm, target, &item_expr)?;
        }
        Ok(value_out)
    }

    pub fn exec_funcdef(&mut self, vm: &mut Vm, funcdef: &ast::FuncDef) -> SpyResult<FuncId> {
        let mut params = Vec::with_capacity(funcdef.args.len());
        for arg in &funcdef.args {
            let w_param_type = self.eval_expr_type(vm, &arg.type_)?;
            params.push(FuncParam::simple(w_param_type));
        }
        let w_restype = self.eval_expr_type(vm, &funcdef.return_type)?;
        let functype = Rc::new(FuncType::new(
            params,
            w_restype,
            funcdef.color,
            funcdef.kind,
        ));
        let w_functype_T = vm.functype_type(&functype);

        let base = self.ns.join(&funcdef.name);
        let fqn = vm.get_unique_fqn(&base);
        // XXX we should capture only the names actually used in the inner
        // function
        let closure = self.closure.extend(Rc::clone(&self.locals));
        let w_func = vm.add_func(FuncData::Ast(AstFunc {
            fqn: fqn.clone(),
            functype,
            funcdef: Rc::new(funcdef.clone()),
            closure,
            locals_types_w: AHashMap::new(),
            redshifted: false,
            redshifted_into: None,
        }));
        self.declare_local(
            vm,
            &funcdef.name,
            w_functype_T,
            Color::Blue,
            funcdef.prototype_loc.clone(),
        )?;
        self.store_local(&funcdef.name, WObject::Func(w_func));
        vm.add_global(fqn, WObject::Func(w_func));
        Ok(w_func)
    }

    fn pyclass_for_classdef(classdef: &ast::ClassDef) -> PyClass {
        match classdef.kind {
            ast::ClassKind::Struct => PyClass::Struct,
            ast::ClassKind::Lifted => PyClass::Lifted,
        }
    }

    /// Creates the forward declaration of a classdef: the name becomes
    /// visible immediately, the layout arrives when the body executes.
    pub fn fwdecl_classdef(&mut self, vm: &mut Vm, classdef: &ast::ClassDef) -> SpyResult<TypeId> {
        let base = self.ns.join(&classdef.name);
        let fqn = vm.get_unique_fqn(&base);
        let pyclass = Self::pyclass_for_classdef(classdef);
        let w_typedecl = vm.add_type(WType::declare(fqn.clone(), pyclass));
        self.declare_local(
            vm,
            &classdef.name,
            vm.b.w_type,
            Color::Blue,
            classdef.loc.clone(),
        )?;
        self.store_local(&classdef.name, WObject::Type(w_typedecl));
        vm.add_global(fqn, WObject::Type(w_typedecl));
        Ok(w_typedecl)
    }

    /// Runs the class body and finalizes the forward-declared type.
    pub fn exec_classdef(&mut self, vm: &mut Vm, classdef: &ast::ClassDef) -> SpyResult<TypeId> {
        let w_obj = self.load_local(&classdef.name)?;
        let w_type = w_obj.as_type().ok_or_else(|| {
            SpyError::new(ErrorKind::PanicError, "classdef name is not bound to a type")
        })?;
        debug_assert_eq!(
            vm.type_(w_type).fqn.symbol_name(),
            classdef.name,
            "forward declaration mismatch"
        );
        debug_assert!(!vm.type_(w_type).is_defined);

        // XXX we should capture only the names actually used in the body
        let closure = self.closure.extend(Rc::clone(&self.locals));
        let class_ns = vm.type_(w_type).fqn.clone();
        let mut classframe = Frame::new(class_ns, classdef.symtable.clone(), closure, false);
        let body = classframe.run_classbody(vm, classdef)?;
        vm.type_mut(w_type).define_from_classbody(body);
        match classdef.kind {
            ast::ClassKind::Struct => crate::builtins::define_struct_methods(vm, w_type),
            ast::ClassKind::Lifted => crate::builtins::define_lifted_methods(vm, w_type),
        }
        Ok(w_type)
    }

    /// Executes a class body, collecting field declarations and everything
    /// else bound in the class scope.
    pub fn run_classbody(&mut self, vm: &mut Vm, classdef: &ast::ClassDef) -> SpyResult<ClassBody> {
        self.declare_local(vm, "@if", vm.b.w_bool, Color::Blue, Loc::fake())?;
        let mut body = ClassBody::default();
        for vardef in &classdef.fields {
            let out = self.exec_vardef(vm, vardef)?;
            body.fields_w
                .insert(vardef.name.clone(), (out.w_type, vardef.loc.clone()));
        }
        for stmt in &classdef.body {
            if let Stmt::ClassDef(inner) = stmt {
                self.fwdecl_classdef(vm, inner)?;
            }
        }
        for stmt in &classdef.body {
            self.exec_stmt(vm, stmt)?;
        }
        // bind methods and class-level constants, in source order
        for stmt in &classdef.body {
            let name = match stmt {
                Stmt::FuncDef(funcdef) => Some(&funcdef.name),
                Stmt::Assign { target, .. } => Some(&target.name),
                _ => None,
            };
            if let Some(name) = name {
                body.dict_w.insert(name.clone(), self.load_local(name)?);
            }
        }
        Ok(body)
    }

    // ==== expressions ====

    fn expect_value(&self, wam: &MetaArg) -> SpyResult<WObject> {
        wam.w_val.clone().ok_or_else(|| {
            SpyError::new(
                ErrorKind::PanicError,
                "value unexpectedly unknown at compile time",
            )
        })
    }

    /// Evaluates a type annotation expression.
    pub fn eval_expr_type(&mut self, vm: &mut Vm, expr: &Expr) -> SpyResult<TypeId> {
        let out = self.eval_expr(vm, expr, None)?;
        let w_val = self.expect_value(&out.wam)?;
        match &w_val {
            WObject::Type(w_type) => {
                vm.make_fqn_const(&w_val);
                Ok(*w_type)
            }
            WObject::None => Ok(vm.b.w_none_type),
            other => {
                let got = vm.type_(vm.dynamic_type(other)).human_name();
                Err(SpyError::simple(
                    ErrorKind::TypeError,
                    format!("expected `type`, got `{got}`"),
                    "expected `type`",
                    expr.loc().clone(),
                ))
            }
        }
    }

    /// Finds the conversion required to store `wam` into the local named
    /// `varname`, annotating failures with the declaration site.
    pub fn typecheck_maybe(
        &mut self,
        vm: &mut Vm,
        wam: &MetaArg,
        varname: Option<&str>,
    ) -> SpyResult<Option<FuncId>> {
        let Some(varname) = varname else {
            return Ok(None);
        };
        let w_exp_type = self.locals_types_w[varname];
        crate::operators::convop::convert_maybe(vm, w_exp_type, wam).map_err(|mut err| {
            if err.matches(ErrorKind::TypeError) {
                let exp = vm.type_(w_exp_type).human_name();
                let because = match varname {
                    "@return" => " because of return type",
                    "@if" | "@while" | "@assert" => "",
                    _ => " because of type declaration",
                };
                let exp_loc = self
                    .locals_decl_loc
                    .get(varname)
                    .cloned()
                    .unwrap_or_else(Loc::fake);
                err.add(Level::Note, format!("expected `{exp}`{because}"), exp_loc);
            }
            err
        })
    }

    pub fn eval_expr(
        &mut self,
        vm: &mut Vm,
        expr: &Expr,
        varname: Option<&str>,
    ) -> SpyResult<EvalOut> {
        let mut out = self.eval_expr_inner(vm, expr).map_err(|mut err| {
            err.add_location_maybe(expr.loc().clone());
            err
        })?;

        let w_typeconv = self.typecheck_maybe(vm, &out.wam, varname)?;
        // after redshift every conversion must already be explicit
        debug_assert!(!(self.redshifted_func && w_typeconv.is_some()));

        let Some(w_typeconv) = w_typeconv else {
            return Ok(out);
        };
        if self.redshifting {
            // wrap the residual; the conversion runs at run time
            let conv_fqn = vm.func_data(w_typeconv).fqn();
            let residual = out.residual.take().expect("redshifting yields residuals");
            out.residual = Some(Expr::Call {
                loc: expr.loc().clone(),
                func: Box::new(Expr::FQNConst {
                    loc: expr.loc().clone(),
                    fqn: conv_fqn,
                }),
                args: vec![residual],
            });
            Ok(out)
        } else {
            // apply the conversion immediately
            let w_val = self.expect_value(&out.wam)?;
            let w_converted = vm.fast_call(w_typeconv, &[w_val])?;
            let w_restype = vm.func_data(w_typeconv).functype().w_restype;
            let wam = MetaArg::new(
                out.wam.color,
                w_restype,
                Some(w_converted),
                out.wam.loc.clone(),
            );
            Ok(EvalOut {
                wam,
                residual: out.residual,
            })
        }
    }

    /// Builds the residual of an expression: blue results become constants,
    /// red ones are produced by `make_red`.
    fn make_residual(
        &self,
        vm: &mut Vm,
        loc: &Loc,
        wam: &MetaArg,
        make_red: impl FnOnce(&mut Vm) -> SpyResult<Expr>,
    ) -> SpyResult<Option<Expr>> {
        if !self.redshifting {
            return Ok(None);
        }
        if wam.color == Color::Blue {
            let w_val = self.expect_value(wam)?;
            Ok(Some(make_const(vm, loc, &w_val)))
        } else {
            Ok(Some(make_red(vm)?))
        }
    }

    pub fn eval_opimpl(
        &mut self,
        vm: &mut Vm,
        loc: &Loc,
        w_opimpl: &OpImpl,
        args_wam: &[MetaArg],
    ) -> SpyResult<MetaArg> {
        // result color: pure function with blue arguments folds to blue,
        // anything else takes the function's color
        let color = if w_opimpl.pure {
            Color::maybe_blue(args_wam.iter().map(|wm| wm.color))
        } else {
            w_opimpl.color()
        };
        let w_res = if color == Color::Red && self.redshifting {
            None
        } else {
            let mut args_w = Vec::with_capacity(args_wam.len());
            for wm in args_wam {
                args_w.push(self.expect_value(wm)?);
            }
            Some(w_opimpl.execute(vm, &args_w)?)
        };
        Ok(MetaArg::new(color, w_opimpl.w_restype(), w_res, loc.clone()))
    }

    /// Evaluates an operator expression and builds its residual from the
    /// already-shifted children.
    fn eval_op_expr(
        &mut self,
        vm: &mut Vm,
        loc: &Loc,
        op: Operator,
        children: Vec<EvalOut>,
    ) -> SpyResult<EvalOut> {
        let args_wam: Vec<MetaArg> = children.iter().map(|out| out.wam.clone()).collect();
        let w_opimpl = call_op(vm, loc, op, &args_wam)?;
        let wam = self.eval_opimpl(vm, loc, &w_opimpl, &args_wam)?;
        let residual = self.make_residual(vm, loc, &wam, |vm| {
            let orig_args: Vec<Expr> = children.into_iter().map(EvalOut::residual).collect();
            shift_opimpl(vm, loc, &w_opimpl, &orig_args)
        })?;
        Ok(EvalOut { wam, residual })
    }

    fn eval_expr_inner(&mut self, vm: &mut Vm, expr: &Expr) -> SpyResult<EvalOut> {
        match expr {
            Expr::Constant { loc, value } => {
                let w_val = vm.wrap_const_value(value);
                let w_type = vm.dynamic_type(&w_val);
                let wam = MetaArg::blue(w_type, w_val, loc.clone());
                let residual = self.make_residual(vm, loc, &wam, |_| unreachable!())?;
                Ok(EvalOut { wam, residual })
            }
            Expr::StrConst { loc, value } => {
                let wam = MetaArg::blue(vm.b.w_str, WObject::str(value), loc.clone());
                let residual = self.make_residual(vm, loc, &wam, |_| unreachable!())?;
                Ok(EvalOut { wam, residual })
            }
            Expr::LocConst { loc, value } => {
                let wam = MetaArg::blue(
                    vm.b.w_loc,
                    WObject::LocVal(Rc::new(value.clone())),
                    loc.clone(),
                );
                let residual = self.make_residual(vm, loc, &wam, |_| unreachable!())?;
                Ok(EvalOut { wam, residual })
            }
            Expr::FQNConst { loc, fqn } => {
                let w_val = vm.lookup_global(fqn).cloned().ok_or_else(|| {
                    SpyError::new(ErrorKind::NameError, format!("unknown FQN `{fqn}`"))
                })?;
                let w_type = vm.dynamic_type(&w_val);
                let wam = MetaArg::blue(w_type, w_val, loc.clone());
                Ok(EvalOut {
                    wam,
                    residual: self.redshifting.then(|| expr.clone()),
                })
            }
            Expr::Name { loc, id } => self.eval_name(vm, loc, id),
            Expr::NameLocal { loc, name } => {
                let w_type = self.locals_types_w.get(name).copied().ok_or_else(|| {
                    SpyError::new(ErrorKind::NameError, format!("name `{name}` is not defined"))
                })?;
                let w_val = self.load_local(name)?;
                let wam = MetaArg::red(w_type, Some(w_val), loc.clone());
                Ok(EvalOut {
                    wam,
                    residual: self.redshifting.then(|| expr.clone()),
                })
            }
            Expr::NameOuterCell { loc, level, name } => {
                let namespace = self.closure.get(*level).ok_or_else(|| {
                    SpyError::new(ErrorKind::PanicError, "closure level out of range")
                })?;
                let w_val = namespace.borrow().get(name).cloned().ok_or_else(|| {
                    SpyError::new(
                        ErrorKind::Exception,
                        format!("read from uninitialized outer `{name}`"),
                    )
                })?;
                let w_type = vm.dynamic_type(&w_val);
                let wam = MetaArg::blue(w_type, w_val, loc.clone());
                Ok(EvalOut {
                    wam,
                    residual: self.redshifting.then(|| expr.clone()),
                })
            }
            Expr::BinOp {
                loc,
                op,
                left,
                right,
            } => {
                let l = self.eval_expr(vm, left, None)?;
                let r = self.eval_expr(vm, right, None)?;
                self.eval_op_expr(vm, loc, Operator::Binary(*op), vec![l, r])
            }
            Expr::CmpOp {
                loc,
                op,
                left,
                right,
            } => {
                let l = self.eval_expr(vm, left, None)?;
                let r = self.eval_expr(vm, right, None)?;
                self.eval_op_expr(vm, loc, Operator::Cmp(*op), vec![l, r])
            }
            Expr::UnaryOp { loc, op, value } => {
                let v = self.eval_expr(vm, value, None)?;
                self.eval_op_expr(vm, loc, Operator::Unary(*op), vec![v])
            }
            Expr::Call { loc, func, args } => {
                let mut children = vec![self.eval_expr(vm, func, None)?];
                for arg in args {
                    children.push(self.eval_expr(vm, arg, None)?);
                }
                self.eval_op_expr(vm, loc, Operator::Call, children)
            }
            Expr::CallMethod {
                loc,
                target,
                method,
                args,
            } => {
                let mut children = vec![
                    self.eval_expr(vm, target, None)?,
                    self.eval_expr(vm, method, None)?,
                ];
                for arg in args {
                    children.push(self.eval_expr(vm, arg, None)?);
                }
                self.eval_op_expr(vm, loc, Operator::CallMethod, children)
            }
            Expr::GetItem { loc, value, args } => {
                let mut children = vec![self.eval_expr(vm, value, None)?];
                for arg in args {
                    children.push(self.eval_expr(vm, arg, None)?);
                }
                self.eval_op_expr(vm, loc, Operator::GetItem, children)
            }
            Expr::GetAttr { loc, value, attr } => {
                let children = vec![
                    self.eval_expr(vm, value, None)?,
                    self.eval_expr(vm, attr, None)?,
                ];
                self.eval_op_expr(vm, loc, Operator::GetAttr, children)
            }
            Expr::List { loc, items } => self.eval_list(vm, loc, items),
            Expr::Tuple { loc, items } => {
                let mut outs = Vec::with_capacity(items.len());
                for item in items {
                    outs.push(self.eval_expr(vm, item, None)?);
                }
                let color = Color::maybe_blue(outs.iter().map(|out| out.wam.color));
                let w_val = if color == Color::Red && self.redshifting {
                    None
                } else {
                    let mut items_w = Vec::with_capacity(outs.len());
                    for out in &outs {
                        items_w.push(self.expect_value(&out.wam)?);
                    }
                    Some(WObject::tuple(items_w))
                };
                let wam = MetaArg::new(color, vm.b.w_tuple, w_val, loc.clone());
                let residual = self.make_residual(vm, loc, &wam, |_| {
                    Ok(Expr::Tuple {
                        loc: loc.clone(),
                        items: outs.into_iter().map(EvalOut::residual).collect(),
                    })
                })?;
                Ok(EvalOut { wam, residual })
            }
            Expr::And { loc, left, right } => self.eval_bool_op(vm, loc, left, right, true),
            Expr::Or { loc, left, right } => self.eval_bool_op(vm, loc, left, right, false),
            Expr::AssignExpr { loc, target, value } => {
                let out = self.exec_assign(vm, target, value)?;
                if self.redshifting && out.value_out.wam.color == Color::Red {
                    return Err(SpyError::wip(
                        "red walrus assignments cannot be redshifted",
                        loc.clone(),
                    ));
                }
                Ok(out.value_out)
            }
        }
    }

    fn eval_name(&mut self, vm: &mut Vm, loc: &Loc, id: &str) -> SpyResult<EvalOut> {
        let Some(sym) = self.symtable.lookup_maybe(id).cloned() else {
            return Err(SpyError::simple(
                ErrorKind::NameError,
                format!("name `{id}` is not defined"),
                "not found in this scope",
                loc.clone(),
            ));
        };
        if sym.storage == VarStorage::NameError {
            return Err(SpyError::simple(
                ErrorKind::NameError,
                format!("name `{id}` is not defined"),
                "not found in this scope",
                loc.clone(),
            ));
        }
        if let Some(fqn) = &sym.fqn {
            return self.eval_name_global(vm, loc, &sym, fqn.clone());
        }
        if sym.is_local() {
            return self.eval_name_local(vm, loc, &sym);
        }
        self.eval_name_outer(vm, loc, &sym)
    }

    fn eval_name_global(
        &mut self,
        vm: &mut Vm,
        loc: &Loc,
        sym: &Symbol,
        fqn: Fqn,
    ) -> SpyResult<EvalOut> {
        let w_raw = vm.lookup_global(&fqn).cloned().ok_or_else(|| {
            SpyError::simple(
                ErrorKind::NameError,
                format!("name `{}` is not defined", sym.name),
                "not found in this scope",
                loc.clone(),
            )
        })?;
        // red globals live behind a cell
        let w_val = match &w_raw {
            WObject::Cell(cell_id) => vm.cell(*cell_id).w_val.clone(),
            other => other.clone(),
        };
        let w_type = vm.dynamic_type(&w_val);
        let wam =
            MetaArg::new(sym.color, w_type, Some(w_val), loc.clone()).with_sym(sym.clone());
        let residual = self.make_residual(vm, loc, &wam, |_| {
            Ok(Expr::FQNConst {
                loc: loc.clone(),
                fqn,
            })
        })?;
        Ok(EvalOut { wam, residual })
    }

    fn eval_name_local(&mut self, vm: &mut Vm, loc: &Loc, sym: &Symbol) -> SpyResult<EvalOut> {
        let w_type = self.locals_types_w.get(&sym.name).copied().ok_or_else(|| {
            SpyError::simple(
                ErrorKind::NameError,
                format!("name `{}` is not defined", sym.name),
                "declared below?",
                loc.clone(),
            )
        })?;
        let w_val = if sym.color == Color::Red && self.redshifting {
            None
        } else {
            Some(self.load_local(&sym.name)?)
        };
        let wam = MetaArg::new(sym.color, w_type, w_val, loc.clone()).with_sym(sym.clone());
        let name = sym.name.clone();
        let residual = self.make_residual(vm, loc, &wam, |_| {
            Ok(Expr::NameLocal {
                loc: loc.clone(),
                name,
            })
        })?;
        Ok(EvalOut { wam, residual })
    }

    fn eval_name_outer(&mut self, vm: &mut Vm, loc: &Loc, sym: &Symbol) -> SpyResult<EvalOut> {
        // closed-over variables are always blue
        let namespace = self.closure.get(sym.level).ok_or_else(|| {
            SpyError::new(ErrorKind::PanicError, "closure level out of range")
        })?;
        let w_val = namespace.borrow().get(&sym.name).cloned().ok_or_else(|| {
            SpyError::new(
                ErrorKind::Exception,
                format!("read from uninitialized outer `{}`", sym.name),
            )
        })?;
        let w_type = vm.dynamic_type(&w_val);
        let wam =
            MetaArg::new(Color::Blue, w_type, Some(w_val), loc.clone()).with_sym(sym.clone());
        let residual = self.make_residual(vm, loc, &wam, |_| unreachable!("outer names are blue"))?;
        Ok(EvalOut { wam, residual })
    }

    fn eval_list(&mut self, vm: &mut Vm, loc: &Loc, items: &[Expr]) -> SpyResult<EvalOut> {
        if items.is_empty() {
            let wam = MetaArg::blue(vm.b.w_empty_list, WObject::EmptyList, loc.clone());
            let residual = self.make_residual(vm, loc, &wam, |_| unreachable!())?;
            return Ok(EvalOut { wam, residual });
        }
        let mut outs = Vec::with_capacity(items.len());
        // list literals are red: mutability makes constant-folding unsound
        let color = Color::Red;
        let mut w_itemtype: Option<TypeId> = None;
        for item in items {
            let out = self.eval_expr(vm, item, None)?;
            w_itemtype = Some(match w_itemtype {
                None => out.wam.w_static_type,
                Some(w_prev) => vm.union_type(w_prev, out.wam.w_static_type),
            });
            outs.push(out);
        }
        let w_listtype = vm.make_list_type(w_itemtype.expect("non-empty list"));
        let w_val = if self.redshifting {
            None
        } else {
            let mut items_w = Vec::with_capacity(outs.len());
            for out in &outs {
                items_w.push(self.expect_value(&out.wam)?);
            }
            Some(WObject::List(Rc::new(crate::object::ListValue {
                w_type: w_listtype,
                items_w,
            })))
        };
        let wam = MetaArg::new(color, w_listtype, w_val, loc.clone());
        let residual = self.make_residual(vm, loc, &wam, |vm| {
            // build `list.__new__()` followed by one `_push` per item
            let list_fqn = vm.type_(w_listtype).fqn.clone();
            let mut newlst = Expr::Call {
                loc: loc.clone(),
                func: Box::new(Expr::FQNConst {
                    loc: loc.clone(),
                    fqn: list_fqn.join("__new__"),
                }),
                args: vec![],
            };
            for out in outs {
                let item_loc = out.wam.loc.clone();
                newlst = Expr::Call {
                    loc: item_loc.clone(),
                    func: Box::new(Expr::FQNConst {
                        loc: item_loc,
                        fqn: list_fqn.join("_push"),
                    }),
                    args: vec![newlst, out.residual()],
                };
            }
            Ok(newlst)
        })?;
        Ok(EvalOut { wam, residual })
    }

    fn eval_bool_op(
        &mut self,
        vm: &mut Vm,
        loc: &Loc,
        left: &Expr,
        right: &Expr,
        is_and: bool,
    ) -> SpyResult<EvalOut> {
        let l = self.eval_expr(vm, left, None)?;
        let r = self.eval_expr(vm, right, None)?;
        for out in [&l, &r] {
            let w_type = out.wam.w_static_type;
            if w_type != vm.b.w_bool && w_type != vm.b.w_dynamic {
                let got = vm.type_(w_type).human_name();
                return Err(SpyError::simple(
                    ErrorKind::TypeError,
                    "mismatched types",
                    format!("expected `bool`, got `{got}`"),
                    out.wam.loc.clone(),
                ));
            }
        }
        let color = Color::maybe_blue([l.wam.color, r.wam.color]);
        let w_val = if color == Color::Red && self.redshifting {
            None
        } else {
            let a = vm.is_true(&self.expect_value(&l.wam)?)?;
            let w_b = self.expect_value(&r.wam)?;
            let value = if is_and {
                a && vm.is_true(&w_b)?
            } else {
                a || vm.is_true(&w_b)?
            };
            Some(WObject::Bool(value))
        };
        let wam = MetaArg::new(color, vm.b.w_bool, w_val, loc.clone());
        let residual = self.make_residual(vm, loc, &wam, |_| {
            let (l_res, r_res) = (l.residual(), r.residual());
            Ok(if is_and {
                Expr::And {
                    loc: loc.clone(),
                    left: Box::new(l_res),
                    right: Box::new(r_res),
                }
            } else {
                Expr::Or {
                    loc: loc.clone(),
                    left: Box::new(l_res),
                    right: Box::new(r_res),
                }
            })
        })?;
        Ok(EvalOut { wam, residual })
    }
}

pub fn desugar_augassign(
    loc: &Loc,
    op: ast::BinOpKind,
    target: &ast::Ident,
    value: &Expr,
) -> Stmt {
    // transform "x += 1" into "x = x + 1"
    Stmt::Assign {
        loc: loc.clone(),
        target: target.clone(),
        value: Expr::BinOp {
            loc: loc.clone(),
            op,
            left: Box::new(Expr::Name {
                loc: target.loc.clone(),
                id: target.name.clone(),
            }),
            right: Box::new(value.clone()),
        },
    }
}

/// The namespace for artifacts generated by a function call: blue calls
/// qualify the callee's FQN with their type arguments, so
/// `make_Point(i32)` yields artifacts under `make_Point[i32]::...`.
///
/// Non-type blue arguments are ignored for naming; `get_unique_fqn`
/// guarantees global uniqueness regardless.
pub fn compute_ns(vm: &Vm, w_func: &AstFunc, args_w: &[WObject]) -> Fqn {
    if w_func.color() == Color::Red {
        return w_func.fqn.clone();
    }
    let quals: Vec<Fqn> = args_w
        .iter()
        .filter_map(|w_arg| w_arg.as_type().map(|id| vm.type_(id).fqn.clone()))
        .collect();
    if quals.is_empty() {
        w_func.fqn.clone()
    } else {
        w_func.fqn.with_qualifiers(quals)
    }
}

/// Runs an AST function to completion with the given arguments.
pub fn run_astfunc(vm: &mut Vm, w_func: &AstFunc, args_w: &[WObject]) -> SpyResult<WObject> {
    let ns = compute_ns(vm, w_func, args_w);
    let funcdef = Rc::clone(&w_func.funcdef);
    let mut frame = Frame::new(
        ns,
        funcdef.symtable.clone(),
        w_func.closure.clone(),
        false,
    );
    frame.redshifted_func = w_func.redshifted;
    declare_arguments(vm, &mut frame, w_func)?;

    // bind the arguments
    debug_assert_eq!(args_w.len(), funcdef.args.len());
    for (arg, w_arg) in funcdef.args.iter().zip(args_w) {
        frame.store_local(&arg.name, w_arg.clone());
    }

    // forward declaration of outermost-level classdefs; nested ones (e.g.
    // inside an `if`) are not supported
    for stmt in &funcdef.body {
        if let Stmt::ClassDef(classdef) = stmt {
            frame.fwdecl_classdef(vm, classdef)?;
        }
    }

    match frame.exec_body(vm, &funcdef.body)? {
        Flow::Return(w_val) => Ok(w_val),
        Flow::Normal => {
            // falling off the end is fine only for void functions
            let w_restype = w_func.functype.w_restype;
            if w_restype == vm.b.w_none_type || w_restype == vm.b.w_dynamic {
                Ok(WObject::None)
            } else {
                let loc = funcdef.loc.make_end_loc();
                Err(SpyError::simple(
                    ErrorKind::TypeError,
                    "reached the end of the function without a `return`",
                    "no return",
                    loc,
                ))
            }
        }
        Flow::Break | Flow::Continue => Err(SpyError::new(
            ErrorKind::PanicError,
            "break/continue escaped the function body",
        )),
    }
}

/// Declares the implicit typecheck anchors and the formal parameters.
pub fn declare_arguments(vm: &mut Vm, frame: &mut Frame, w_func: &AstFunc) -> SpyResult<()> {
    let funcdef = &w_func.funcdef;
    let functype = &w_func.functype;
    frame.declare_local(vm, "@if", vm.b.w_bool, Color::Red, Loc::fake())?;
    frame.declare_local(vm, "@while", vm.b.w_bool, Color::Red, Loc::fake())?;
    frame.declare_local(vm, "@assert", vm.b.w_bool, Color::Red, Loc::fake())?;
    frame.declare_local(
        vm,
        "@return",
        functype.w_restype,
        Color::Red,
        funcdef.return_type.loc().clone(),
    )?;
    debug_assert_eq!(funcdef.args.len(), functype.params.len());
    for (arg, param) in funcdef.args.iter().zip(&functype.params) {
        let color = funcdef
            .symtable
            .lookup_maybe(&arg.name)
            .map_or(functype.color, |sym| sym.color);
        frame.declare_local(vm, &arg.name, param.w_type, color, arg.loc.clone())?;
    }
    Ok(())
}

/// Executes a module body: the `ModFrame` of the spec.
pub fn run_module(vm: &mut Vm, module: &ast::Module) -> SpyResult<crate::object::ModuleId> {
    let mod_fqn = Fqn::from_parts([module.name.as_str()]);
    let module_id = vm.register_module(&module.name, Some(module.filename.clone()));
    vm.add_global(mod_fqn.clone(), WObject::Module(module_id));

    let mut frame = Frame::new(
        mod_fqn.clone(),
        module.symtable.clone(),
        Closure::empty(),
        false,
    );

    // forward declaration of types
    for decl in &module.decls {
        if let ast::Decl::GlobalClassDef(classdef) = decl {
            let w_type = frame.fwdecl_classdef(vm, classdef)?;
            let fqn = vm.type_(w_type).fqn.clone();
            vm.module_mut(module_id)
                .items
                .insert(fqn, WObject::Type(w_type));
        }
    }

    for decl in &module.decls {
        match decl {
            ast::Decl::Import { .. } => {
                // imports were resolved by the scope analyzer
            }
            ast::Decl::GlobalFuncDef(funcdef) => {
                let w_func = frame.exec_funcdef(vm, funcdef)?;
                let fqn = vm.func_data(w_func).fqn();
                vm.module_mut(module_id)
                    .items
                    .insert(fqn, WObject::Func(w_func));
            }
            ast::Decl::GlobalClassDef(classdef) => {
                frame.exec_classdef(vm, classdef)?;
            }
            ast::Decl::GlobalVarDef(vardef) => {
                run_global_vardef(vm, &mut frame, module_id, &mod_fqn, vardef)?;
            }
        }
    }

    // call the module's __INIT__, if present
    let init_fqn = mod_fqn.join("__INIT__");
    let w_init = vm.module(module_id).items.get(&init_fqn).cloned();
    if let Some(WObject::Func(w_init)) = w_init {
        let functype = vm.func_data(w_init).functype();
        debug_assert_eq!(functype.color, Color::Blue);
        vm.fast_call(w_init, &[WObject::Module(module_id)])?;
    }

    Ok(module_id)
}

fn run_global_vardef(
    vm: &mut Vm,
    frame: &mut Frame,
    module_id: crate::object::ModuleId,
    mod_fqn: &Fqn,
    vardef: &ast::VarDef,
) -> SpyResult<()> {
    frame.exec_vardef(vm, vardef)?;
    let fqn = mod_fqn.join(&vardef.name);
    let w_val = frame.load_local(&vardef.name)?;
    let color = frame.local_color(&vardef.name);
    let w_global = if color == Color::Red {
        // mutable module state goes through a cell
        let cell_id = vm.add_cell(fqn.clone(), w_val);
        WObject::Cell(cell_id)
    } else {
        w_val
    };
    vm.add_global(fqn.clone(), w_global.clone());
    vm.module_mut(module_id).items.insert(fqn, w_global);
    Ok(())
}
