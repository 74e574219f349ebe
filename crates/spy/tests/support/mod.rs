//! Shared test support: AST builders and pipeline drivers.
//!
//! The parser is an external collaborator, so tests build module ASTs
//! directly. Every node carries `Loc::fake()`, which keeps deep-equality
//! assertions on residual ASTs straightforward.
#![allow(dead_code)]

use spy::ast::{
    BinOpKind, ClassDef, ClassKind, CmpOpKind, ConstValue, Decl, Expr, FuncArg, FuncDef, FuncKind,
    Ident, Module, Stmt, TypeAnn, UnaryOpKind, VarDef,
};
use spy::driver::{self, CompilerOpts, PrebuiltModules};
use spy::errors::SpyResult;
use spy::fqn::Fqn;
use spy::function::FuncData;
use spy::location::Loc;
use spy::object::WObject;
use spy::symtable::{Color, SymTable, VarKind};
use spy::vm::{ErrorMode, Vm};

pub fn lc() -> Loc {
    Loc::fake()
}

pub fn fqn(s: &str) -> Fqn {
    s.parse().unwrap()
}

// ==== expressions ====

pub fn name(id: &str) -> Expr {
    Expr::Name {
        loc: lc(),
        id: id.to_owned(),
    }
}

pub fn name_local(id: &str) -> Expr {
    Expr::NameLocal {
        loc: lc(),
        name: id.to_owned(),
    }
}

pub fn fqnconst(s: &str) -> Expr {
    Expr::FQNConst {
        loc: lc(),
        fqn: fqn(s),
    }
}

pub fn cint(x: i32) -> Expr {
    Expr::Constant {
        loc: lc(),
        value: ConstValue::I32(x),
    }
}

pub fn cflt(x: f64) -> Expr {
    Expr::Constant {
        loc: lc(),
        value: ConstValue::F64(x),
    }
}

pub fn cbool(b: bool) -> Expr {
    Expr::Constant {
        loc: lc(),
        value: ConstValue::Bool(b),
    }
}

pub fn cnone() -> Expr {
    Expr::Constant {
        loc: lc(),
        value: ConstValue::None,
    }
}

pub fn cstr(s: &str) -> Expr {
    Expr::StrConst {
        loc: lc(),
        value: s.to_owned(),
    }
}

pub fn bin(op: BinOpKind, left: Expr, right: Expr) -> Expr {
    Expr::BinOp {
        loc: lc(),
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn cmp(op: CmpOpKind, left: Expr, right: Expr) -> Expr {
    Expr::CmpOp {
        loc: lc(),
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn neg(value: Expr) -> Expr {
    Expr::UnaryOp {
        loc: lc(),
        op: UnaryOpKind::Neg,
        value: Box::new(value),
    }
}

pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        loc: lc(),
        func: Box::new(func),
        args,
    }
}

pub fn call_fqn(func: &str, args: Vec<Expr>) -> Expr {
    call(fqnconst(func), args)
}

pub fn getitem(value: Expr, args: Vec<Expr>) -> Expr {
    Expr::GetItem {
        loc: lc(),
        value: Box::new(value),
        args,
    }
}

pub fn getattr(value: Expr, attr: &str) -> Expr {
    Expr::GetAttr {
        loc: lc(),
        value: Box::new(value),
        attr: Box::new(cstr(attr)),
    }
}

pub fn callmethod(target: Expr, method: &str, args: Vec<Expr>) -> Expr {
    Expr::CallMethod {
        loc: lc(),
        target: Box::new(target),
        method: Box::new(cstr(method)),
        args,
    }
}

pub fn tuple_(items: Vec<Expr>) -> Expr {
    Expr::Tuple { loc: lc(), items }
}

pub fn list_(items: Vec<Expr>) -> Expr {
    Expr::List { loc: lc(), items }
}

pub fn and_(left: Expr, right: Expr) -> Expr {
    Expr::And {
        loc: lc(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn or_(left: Expr, right: Expr) -> Expr {
    Expr::Or {
        loc: lc(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

// ==== statements ====

pub fn ident(name: &str) -> Ident {
    Ident {
        loc: lc(),
        name: name.to_owned(),
    }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return { loc: lc(), value }
}

pub fn pass_() -> Stmt {
    Stmt::Pass { loc: lc() }
}

pub fn stmt_expr(value: Expr) -> Stmt {
    Stmt::StmtExpr { loc: lc(), value }
}

pub fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        loc: lc(),
        target: ident(name),
        value,
    }
}

pub fn aug_assign(name: &str, op: BinOpKind, value: Expr) -> Stmt {
    Stmt::AugAssign {
        loc: lc(),
        op,
        target: ident(name),
        value,
    }
}

pub fn unpack(names: &[&str], value: Expr) -> Stmt {
    Stmt::UnpackAssign {
        loc: lc(),
        targets: names.iter().map(|n| ident(n)).collect(),
        value,
    }
}

pub fn local_var(name: &str, type_: Expr, value: Option<Expr>) -> Stmt {
    Stmt::VarDef(VarDef {
        loc: lc(),
        name: name.to_owned(),
        kind: VarKind::Var,
        type_: TypeAnn::Expr(type_),
        value,
    })
}

pub fn local_var_auto(name: &str, value: Expr) -> Stmt {
    Stmt::VarDef(VarDef {
        loc: lc(),
        name: name.to_owned(),
        kind: VarKind::Var,
        type_: TypeAnn::Auto { loc: lc() },
        value: Some(value),
    })
}

pub fn if_(test: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt>) -> Stmt {
    Stmt::If {
        loc: lc(),
        test,
        then_body,
        else_body,
    }
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {
        loc: lc(),
        test,
        body,
    }
}

pub fn raise_(exc: Expr) -> Stmt {
    Stmt::Raise { loc: lc(), exc }
}

pub fn assert_(test: Expr, msg: Option<Expr>) -> Stmt {
    Stmt::Assert {
        loc: lc(),
        test,
        msg,
    }
}

pub fn setattr_(target: Expr, attr: &str, value: Expr) -> Stmt {
    Stmt::SetAttr {
        loc: lc(),
        target,
        attr: cstr(attr),
        value,
    }
}

pub fn setitem_(target: Expr, args: Vec<Expr>, value: Expr) -> Stmt {
    Stmt::SetItem {
        loc: lc(),
        target,
        args,
        value,
    }
}

// ==== definitions ====

pub fn arg(name: &str, type_: Expr) -> FuncArg {
    FuncArg {
        loc: lc(),
        name: name.to_owned(),
        type_,
    }
}

fn fndef(name: &str, color: Color, args: Vec<FuncArg>, return_type: Expr, body: Vec<Stmt>) -> FuncDef {
    FuncDef {
        loc: lc(),
        prototype_loc: lc(),
        name: name.to_owned(),
        color,
        kind: FuncKind::Plain,
        args,
        return_type,
        body,
        symtable: SymTable::new(name, color),
    }
}

pub fn red_fn(name: &str, args: Vec<FuncArg>, return_type: Expr, body: Vec<Stmt>) -> FuncDef {
    fndef(name, Color::Red, args, return_type, body)
}

pub fn blue_fn(name: &str, args: Vec<FuncArg>, return_type: Expr, body: Vec<Stmt>) -> FuncDef {
    fndef(name, Color::Blue, args, return_type, body)
}

fn classdef(name: &str, kind: ClassKind, fields: Vec<(&str, Expr)>, body: Vec<Stmt>) -> ClassDef {
    ClassDef {
        loc: lc(),
        name: name.to_owned(),
        kind,
        fields: fields
            .into_iter()
            .map(|(field_name, type_)| VarDef {
                loc: lc(),
                name: field_name.to_owned(),
                kind: VarKind::Var,
                type_: TypeAnn::Expr(type_),
                value: None,
            })
            .collect(),
        body,
        symtable: SymTable::new(name, Color::Blue),
    }
}

pub fn struct_class(name: &str, fields: Vec<(&str, Expr)>, body: Vec<Stmt>) -> ClassDef {
    classdef(name, ClassKind::Struct, fields, body)
}

pub fn lifted_class(name: &str, payload: Expr, body: Vec<Stmt>) -> ClassDef {
    classdef(name, ClassKind::Lifted, vec![("__ll__", payload)], body)
}

pub fn module(name: &str, decls: Vec<Decl>) -> Module {
    Module {
        name: name.to_owned(),
        filename: format!("{name}.spy"),
        loc: lc(),
        decls,
        symtable: SymTable::new(name, Color::Blue),
    }
}

pub fn dfn(funcdef: FuncDef) -> Decl {
    Decl::GlobalFuncDef(funcdef)
}

pub fn dclass(classdef: ClassDef) -> Decl {
    Decl::GlobalClassDef(classdef)
}

pub fn dconst(name: &str, value: Expr) -> Decl {
    Decl::GlobalVarDef(VarDef {
        loc: lc(),
        name: name.to_owned(),
        kind: VarKind::Const,
        type_: TypeAnn::Auto { loc: lc() },
        value: Some(value),
    })
}

pub fn dvar(name: &str, type_: Expr, value: Expr) -> Decl {
    Decl::GlobalVarDef(VarDef {
        loc: lc(),
        name: name.to_owned(),
        kind: VarKind::Var,
        type_: TypeAnn::Expr(type_),
        value: Some(value),
    })
}

pub fn dimport(modname: &str, attr: &str, asname: &str) -> Decl {
    Decl::Import {
        loc: lc(),
        modname: modname.to_owned(),
        attr: Some(attr.to_owned()),
        asname: asname.to_owned(),
    }
}

// ==== pipeline drivers ====

/// Loads the module and redshifts everything, eager error mode.
pub fn compile(module: Module) -> Vm {
    try_compile(module, ErrorMode::Eager).expect("compilation failed")
}

pub fn try_compile(module: Module, error_mode: ErrorMode) -> SpyResult<Vm> {
    try_compile_many(vec![module.clone()], &module.name, error_mode)
}

pub fn try_compile_many(
    modules: Vec<Module>,
    main: &str,
    error_mode: ErrorMode,
) -> SpyResult<Vm> {
    let mut vm = Vm::new();
    let mut parser = PrebuiltModules::new();
    for module in modules {
        parser.insert(module);
    }
    driver::compile(&mut vm, &mut parser, main, CompilerOpts { error_mode })?;
    Ok(vm)
}

/// Loads the module without redshifting, so tests can run functions at
/// compile time or poke at the VM first.
pub fn load(module: Module) -> Vm {
    let mut vm = Vm::new();
    let mut parser = PrebuiltModules::new();
    parser.insert(module.clone());
    driver::load_module(&mut vm, &mut parser, &module.name).expect("module load failed");
    vm
}

pub fn global_func(vm: &Vm, fqn_str: &str) -> spy::object::FuncId {
    match vm.lookup_global(&fqn(fqn_str)) {
        Some(WObject::Func(w_func)) => *w_func,
        other => panic!("`{fqn_str}` is not a function global: {other:?}"),
    }
}

pub fn call_global(vm: &mut Vm, fqn_str: &str, args: &[WObject]) -> SpyResult<WObject> {
    let w_func = global_func(vm, fqn_str);
    vm.fast_call(w_func, args)
}

/// The residual body of a redshifted function.
pub fn residual_body(vm: &Vm, fqn_str: &str) -> Vec<Stmt> {
    let w_func = global_func(vm, fqn_str);
    match vm.func_data(w_func) {
        FuncData::Ast(astfunc) => {
            assert!(astfunc.redshifted, "`{fqn_str}` was not redshifted");
            assert!(astfunc.closure.is_empty(), "residual function has a closure");
            astfunc.funcdef.body.clone()
        }
        other => panic!("`{fqn_str}` is not an AST function: {other:?}"),
    }
}

/// Checks the residual-form guarantee over a whole statement list: every
/// expression is a constant, a local read, an FQN reference, or a call of
/// an FQN reference.
pub fn assert_residual_body(body: &[Stmt]) {
    for stmt in body {
        match stmt {
            Stmt::Return { value, .. }
            | Stmt::StmtExpr { value, .. }
            | Stmt::AssignLocal { value, .. }
            | Stmt::AssignCell { value, .. }
            | Stmt::UnpackAssign { value, .. } => assert_residual_expr(value),
            Stmt::VarDef(vardef) => {
                if let TypeAnn::Expr(type_expr) = &vardef.type_ {
                    assert_residual_expr(type_expr);
                }
                if let Some(value) = &vardef.value {
                    assert_residual_expr(value);
                }
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                ..
            } => {
                assert_residual_expr(test);
                assert_residual_body(then_body);
                assert_residual_body(else_body);
            }
            Stmt::While { test, body, .. } => {
                assert_residual_expr(test);
                assert_residual_body(body);
            }
            Stmt::Assert { test, msg, .. } => {
                assert_residual_expr(test);
                if let Some(msg) = msg {
                    assert_residual_expr(msg);
                }
            }
            Stmt::Pass { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {}
            other => panic!("unexpected residual statement: {other:?}"),
        }
    }
}

fn assert_residual_expr(expr: &Expr) {
    assert!(expr.is_residual(), "not in residual form: {expr:?}");
}
