//! The scope analyzer: builds a [`SymTable`] for the module scope and for
//! every funcdef/classdef scope nested inside it.
//!
//! The tables it produces are exactly the interface the evaluator
//! consumes; a host with its own analyzer can attach its own tables
//! instead.

use ahash::AHashMap;

use crate::ast::{self, Decl, Expr, Stmt, TypeAnn};
use crate::errors::{ErrorKind, Level, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::location::Loc;
use crate::symtable::{Color, ImportRef, SymTable, Symbol, VarKind, VarStorage};
use crate::vm::Vm;

/// Analyzes a parsed module in place, filling every `symtable` field.
pub fn analyze_module(vm: &Vm, module: &mut ast::Module) -> SpyResult<()> {
    let mut table = SymTable::new(module.name.clone(), Color::Blue);
    let mod_fqn = Fqn::from_parts([module.name.as_str()]);

    // pass 1: module-level definitions
    for decl in &module.decls {
        match decl {
            Decl::Import {
                loc,
                modname,
                attr,
                asname,
            } => {
                let fqn = match attr {
                    Some(attr) => Fqn::from_parts([modname.as_str(), attr.as_str()]),
                    None => Fqn::from_parts([modname.as_str()]),
                };
                define(
                    &mut table,
                    Symbol {
                        name: asname.clone(),
                        color: Color::Blue,
                        varkind: VarKind::Const,
                        storage: VarStorage::Direct,
                        level: 0,
                        impref: Some(ImportRef {
                            modname: modname.clone(),
                            attr: attr.clone(),
                        }),
                        fqn: Some(fqn),
                        loc: loc.clone(),
                        type_loc: loc.clone(),
                    },
                )?;
            }
            Decl::GlobalFuncDef(funcdef) => {
                define(
                    &mut table,
                    Symbol {
                        name: funcdef.name.clone(),
                        color: Color::Blue,
                        varkind: VarKind::Const,
                        storage: VarStorage::Direct,
                        level: 0,
                        impref: None,
                        fqn: Some(mod_fqn.join(&funcdef.name)),
                        loc: funcdef.prototype_loc.clone(),
                        type_loc: funcdef.prototype_loc.clone(),
                    },
                )?;
            }
            Decl::GlobalClassDef(classdef) => {
                define(
                    &mut table,
                    Symbol {
                        name: classdef.name.clone(),
                        color: Color::Blue,
                        varkind: VarKind::Const,
                        storage: VarStorage::Direct,
                        level: 0,
                        impref: None,
                        fqn: Some(mod_fqn.join(&classdef.name)),
                        loc: classdef.loc.clone(),
                        type_loc: classdef.loc.clone(),
                    },
                )?;
            }
            Decl::GlobalVarDef(vardef) => {
                // `var` globals stay mutable behind a cell and are red;
                // everything else is a frozen blue const
                let (color, varkind, storage) = match vardef.kind {
                    VarKind::Var => (Color::Red, VarKind::Var, VarStorage::Cell),
                    VarKind::Const => (Color::Blue, VarKind::Const, VarStorage::Direct),
                };
                define(
                    &mut table,
                    Symbol {
                        name: vardef.name.clone(),
                        color,
                        varkind,
                        storage,
                        level: 0,
                        impref: None,
                        fqn: Some(mod_fqn.join(&vardef.name)),
                        loc: vardef.loc.clone(),
                        type_loc: vardef.type_.loc().clone(),
                    },
                )?;
            }
        }
    }

    // pass 2: names the module body references
    let mut used = UsedNames::default();
    for decl in &module.decls {
        match decl {
            Decl::Import { .. } => {}
            Decl::GlobalFuncDef(funcdef) => used.collect_funcdef_signature(funcdef),
            Decl::GlobalClassDef(_) => {}
            Decl::GlobalVarDef(vardef) => used.collect_vardef(vardef),
        }
    }
    add_free_symbols(vm, &mut table, &used, &[]);
    module.symtable = table;

    // pass 3: nested scopes
    let chain = vec![module.symtable.clone()];
    for decl in &mut module.decls {
        match decl {
            Decl::GlobalFuncDef(funcdef) => analyze_funcdef(vm, funcdef, &chain)?,
            Decl::GlobalClassDef(classdef) => analyze_classdef(vm, classdef, &chain)?,
            _ => {}
        }
    }
    Ok(())
}

/// Analyzes a standalone funcdef against an explicit chain of enclosing
/// scopes. Mostly useful for tests driving the evaluator directly.
pub fn analyze_funcdef(
    vm: &Vm,
    funcdef: &mut ast::FuncDef,
    enclosing: &[SymTable],
) -> SpyResult<()> {
    let table_color = funcdef.color;
    let mut table = SymTable::new(funcdef.name.clone(), table_color);

    for arg in &funcdef.args {
        define(
            &mut table,
            Symbol {
                name: arg.name.clone(),
                color: table_color,
                varkind: VarKind::Var,
                storage: VarStorage::Direct,
                level: 0,
                impref: None,
                fqn: None,
                loc: arg.loc.clone(),
                type_loc: arg.type_.loc().clone(),
            },
        )?;
    }
    let mut used = UsedNames::default();
    define_body_names(&mut table, &funcdef.body, table_color, enclosing, &mut used)?;
    used.collect_body(&funcdef.body);
    add_free_symbols(vm, &mut table, &used, enclosing);
    funcdef.symtable = table;

    let mut chain = vec![funcdef.symtable.clone()];
    chain.extend(enclosing.iter().cloned());
    analyze_nested(vm, &mut funcdef.body, &chain)
}

fn analyze_classdef(
    vm: &Vm,
    classdef: &mut ast::ClassDef,
    enclosing: &[SymTable],
) -> SpyResult<()> {
    let mut table = SymTable::new(classdef.name.clone(), Color::Blue);
    for field in &classdef.fields {
        define(
            &mut table,
            Symbol {
                name: field.name.clone(),
                color: Color::Red,
                varkind: VarKind::Var,
                storage: VarStorage::Direct,
                level: 0,
                impref: None,
                fqn: None,
                loc: field.loc.clone(),
                type_loc: field.type_.loc().clone(),
            },
        )?;
    }
    let mut used = UsedNames::default();
    define_body_names(&mut table, &classdef.body, Color::Blue, enclosing, &mut used)?;
    for field in &classdef.fields {
        used.collect_vardef(field);
    }
    used.collect_body(&classdef.body);
    add_free_symbols(vm, &mut table, &used, enclosing);
    classdef.symtable = table;

    let mut chain = vec![classdef.symtable.clone()];
    chain.extend(enclosing.iter().cloned());
    analyze_nested(vm, &mut classdef.body, &chain)
}

fn analyze_nested(vm: &Vm, body: &mut [Stmt], chain: &[SymTable]) -> SpyResult<()> {
    for stmt in body {
        match stmt {
            Stmt::FuncDef(funcdef) => analyze_funcdef(vm, funcdef, chain)?,
            Stmt::ClassDef(classdef) => analyze_classdef(vm, classdef, chain)?,
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                analyze_nested(vm, then_body, chain)?;
                analyze_nested(vm, else_body, chain)?;
            }
            Stmt::While { body, .. } | Stmt::For { body, .. } => {
                analyze_nested(vm, body, chain)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn define(table: &mut SymTable, sym: Symbol) -> SpyResult<()> {
    if let Some(prev) = table.lookup_definition_maybe(&sym.name) {
        let mut err = SpyError::new(
            ErrorKind::ScopeError,
            format!("variable `{}` already declared", sym.name),
        );
        err.add(Level::Error, "this is the new declaration", sym.loc.clone());
        err.add(
            Level::Note,
            "this is the previous declaration",
            prev.loc.clone(),
        );
        return Err(err);
    }
    table.add(sym);
    Ok(())
}

/// Collects the local definitions introduced by a statement list.
///
/// An assigned name only becomes a local if no enclosing scope declares it
/// at module level: assignments to module globals (cells and consts) must
/// resolve globally so that cell stores and const-assignment errors work.
fn define_body_names(
    table: &mut SymTable,
    body: &[Stmt],
    scope_color: Color,
    enclosing: &[SymTable],
    used: &mut UsedNames,
) -> SpyResult<()> {
    for stmt in body {
        match stmt {
            Stmt::VarDef(vardef) => {
                define(
                    table,
                    Symbol {
                        name: vardef.name.clone(),
                        color: scope_color,
                        varkind: vardef.kind,
                        storage: VarStorage::Direct,
                        level: 0,
                        impref: None,
                        fqn: None,
                        loc: vardef.loc.clone(),
                        type_loc: vardef.type_.loc().clone(),
                    },
                )?;
            }
            Stmt::Assign { target, .. } | Stmt::AssignLocal { target, .. } => {
                maybe_define_assigned(table, target, scope_color, enclosing, used);
            }
            Stmt::UnpackAssign { targets, .. } => {
                for target in targets {
                    maybe_define_assigned(table, target, scope_color, enclosing, used);
                }
            }
            Stmt::For { target, body, .. } => {
                maybe_define_assigned(table, target, scope_color, enclosing, used);
                define_body_names(table, body, scope_color, enclosing, used)?;
            }
            Stmt::FuncDef(funcdef) => {
                define(
                    table,
                    Symbol {
                        name: funcdef.name.clone(),
                        color: Color::Blue,
                        varkind: VarKind::Const,
                        storage: VarStorage::Direct,
                        level: 0,
                        impref: None,
                        fqn: None,
                        loc: funcdef.prototype_loc.clone(),
                        type_loc: funcdef.prototype_loc.clone(),
                    },
                )?;
            }
            Stmt::ClassDef(classdef) => {
                define(
                    table,
                    Symbol {
                        name: classdef.name.clone(),
                        color: Color::Blue,
                        varkind: VarKind::Const,
                        storage: VarStorage::Direct,
                        level: 0,
                        impref: None,
                        fqn: None,
                        loc: classdef.loc.clone(),
                        type_loc: classdef.loc.clone(),
                    },
                )?;
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                define_body_names(table, then_body, scope_color, enclosing, used)?;
                define_body_names(table, else_body, scope_color, enclosing, used)?;
            }
            Stmt::While { body, .. } => {
                define_body_names(table, body, scope_color, enclosing, used)?;
            }
            _ => {}
        }
        // walrus targets anywhere in the statement's expressions
        let mut walrus_targets = Vec::new();
        for_each_expr(stmt, &mut |expr| {
            if let Expr::AssignExpr { target, .. } = expr {
                walrus_targets.push(target.clone());
            }
        });
        for target in &walrus_targets {
            maybe_define_assigned(table, target, scope_color, enclosing, used);
        }
    }
    Ok(())
}

fn maybe_define_assigned(
    table: &mut SymTable,
    target: &ast::Ident,
    scope_color: Color,
    enclosing: &[SymTable],
    used: &mut UsedNames,
) {
    if table.lookup_maybe(&target.name).is_some() {
        return;
    }
    // the target is a module-level binding: record it as a free reference
    let is_module_binding = enclosing.iter().any(|scope| {
        scope
            .lookup_definition_maybe(&target.name)
            .is_some_and(|sym| sym.fqn.is_some())
    });
    if is_module_binding {
        used.push(&target.name, &target.loc);
        return;
    }
    table.add(Symbol {
        name: target.name.clone(),
        color: scope_color,
        varkind: VarKind::Var,
        storage: VarStorage::Direct,
        level: 0,
        impref: None,
        fqn: None,
        loc: target.loc.clone(),
        type_loc: target.loc.clone(),
    });
}

/// Names referenced by a scope, with the first location each was seen at.
#[derive(Default)]
struct UsedNames {
    names: Vec<(String, Loc)>,
    seen: AHashMap<String, ()>,
}

impl UsedNames {
    fn push(&mut self, name: &str, loc: &Loc) {
        if !self.seen.contains_key(name) {
            self.seen.insert(name.to_owned(), ());
            self.names.push((name.to_owned(), loc.clone()));
        }
    }

    fn collect_expr(&mut self, expr: &Expr) {
        walk_expr(expr, &mut |e| {
            if let Expr::Name { loc, id } = e {
                self.push(id, loc);
            }
        });
    }

    fn collect_vardef(&mut self, vardef: &ast::VarDef) {
        if let TypeAnn::Expr(type_expr) = &vardef.type_ {
            self.collect_expr(type_expr);
        }
        if let Some(value) = &vardef.value {
            self.collect_expr(value);
        }
    }

    /// The parts of a nested funcdef evaluated in the *defining* scope:
    /// parameter types and the return type.
    fn collect_funcdef_signature(&mut self, funcdef: &ast::FuncDef) {
        for arg in &funcdef.args {
            self.collect_expr(&arg.type_);
        }
        self.collect_expr(&funcdef.return_type);
    }

    fn collect_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            match stmt {
                Stmt::FuncDef(funcdef) => self.collect_funcdef_signature(funcdef),
                Stmt::ClassDef(_) => {}
                Stmt::VarDef(vardef) => self.collect_vardef(vardef),
                Stmt::If {
                    test,
                    then_body,
                    else_body,
                    ..
                } => {
                    self.collect_expr(test);
                    self.collect_body(then_body);
                    self.collect_body(else_body);
                }
                Stmt::While { test, body, .. } => {
                    self.collect_expr(test);
                    self.collect_body(body);
                }
                Stmt::For { iter, body, .. } => {
                    self.collect_expr(iter);
                    self.collect_body(body);
                }
                other => {
                    for_each_expr(other, &mut |e| {
                        if let Expr::Name { loc, id } = e {
                            self.push(id, loc);
                        }
                    });
                }
            }
        }
    }
}

/// Resolves every referenced-but-not-defined name against the enclosing
/// scopes, then builtins; unresolved names get a `NameError` symbol.
fn add_free_symbols(vm: &Vm, table: &mut SymTable, used: &UsedNames, enclosing: &[SymTable]) {
    for (name, loc) in &used.names {
        if table.lookup_maybe(name).is_some() {
            continue;
        }
        let mut resolved = false;
        for (i, scope) in enclosing.iter().enumerate() {
            if let Some(sym) = scope.lookup_definition_maybe(name) {
                let mut sym = sym.clone();
                sym.level = (i + 1) as u32;
                table.add(sym);
                resolved = true;
                break;
            }
        }
        if resolved {
            continue;
        }
        let builtin_fqn = Fqn::from_parts(["builtins", name.as_str()]);
        if vm.lookup_global(&builtin_fqn).is_some() {
            table.add(Symbol {
                name: name.clone(),
                color: Color::Blue,
                varkind: VarKind::Const,
                storage: VarStorage::Direct,
                level: (enclosing.len() + 1) as u32,
                impref: Some(ImportRef {
                    modname: "builtins".to_owned(),
                    attr: Some(name.clone()),
                }),
                fqn: Some(builtin_fqn),
                loc: loc.clone(),
                type_loc: loc.clone(),
            });
        } else {
            table.add(Symbol {
                name: name.clone(),
                color: table.color,
                varkind: VarKind::Var,
                storage: VarStorage::NameError,
                level: 0,
                impref: None,
                fqn: None,
                loc: loc.clone(),
                type_loc: loc.clone(),
            });
        }
    }
}

// ==== small AST walkers ====

fn walk_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::BinOp { left, right, .. }
        | Expr::CmpOp { left, right, .. }
        | Expr::And { left, right, .. }
        | Expr::Or { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        Expr::UnaryOp { value, .. } => walk_expr(value, f),
        Expr::Call { func, args, .. } => {
            walk_expr(func, f);
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::CallMethod {
            target,
            method,
            args,
            ..
        } => {
            walk_expr(target, f);
            walk_expr(method, f);
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::GetItem { value, args, .. } => {
            walk_expr(value, f);
            for arg in args {
                walk_expr(arg, f);
            }
        }
        Expr::GetAttr { value, attr, .. } => {
            walk_expr(value, f);
            walk_expr(attr, f);
        }
        Expr::List { items, .. } | Expr::Tuple { items, .. } => {
            for item in items {
                walk_expr(item, f);
            }
        }
        Expr::AssignExpr { value, .. } => walk_expr(value, f),
        _ => {}
    }
}

/// Applies `f` to every expression directly owned by one statement
/// (without descending into nested statement bodies).
fn for_each_expr(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    match stmt {
        Stmt::Return { value, .. }
        | Stmt::StmtExpr { value, .. }
        | Stmt::Assign { value, .. }
        | Stmt::AssignLocal { value, .. }
        | Stmt::AssignCell { value, .. }
        | Stmt::AugAssign { value, .. }
        | Stmt::UnpackAssign { value, .. } => walk_expr(value, f),
        Stmt::SetAttr {
            target,
            attr,
            value,
            ..
        } => {
            walk_expr(target, f);
            walk_expr(attr, f);
            walk_expr(value, f);
        }
        Stmt::SetItem {
            target,
            args,
            value,
            ..
        } => {
            walk_expr(target, f);
            for arg in args {
                walk_expr(arg, f);
            }
            walk_expr(value, f);
        }
        Stmt::Raise { exc, .. } => walk_expr(exc, f),
        Stmt::Assert { test, msg, .. } => {
            walk_expr(test, f);
            if let Some(msg) = msg {
                walk_expr(msg, f);
            }
        }
        Stmt::If { test, .. } => walk_expr(test, f),
        Stmt::While { test, .. } => walk_expr(test, f),
        Stmt::For { iter, .. } => walk_expr(iter, f),
        Stmt::VarDef(vardef) => {
            if let TypeAnn::Expr(type_expr) = &vardef.type_ {
                walk_expr(type_expr, f);
            }
            if let Some(value) = &vardef.value {
                walk_expr(value, f);
            }
        }
        _ => {}
    }
}
