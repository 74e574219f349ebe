//! The input AST consumed by the evaluator.
//!
//! The surface parser is an external collaborator: it produces these nodes
//! (plus a [`SymTable`] per scope, attached by the analyzer) and the core
//! takes it from there. After redshift, function bodies consist only of the
//! residual subset checked by [`Expr::is_residual`].

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::fqn::Fqn;
use crate::location::Loc;
use crate::symtable::{Color, SymTable, VarKind};

/// Payload of a [`Expr::Constant`] literal.
///
/// Strings and locations have their own node kinds (`StrConst`,
/// `LocConst`); everything non-primitive is expressed as `FQNConst`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    None,
    Bool(bool),
    I32(i32),
    F64(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOpKind {
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOpKind {
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOpKind {
    Neg,
}

impl UnaryOpKind {
    pub fn token(self) -> &'static str {
        match self {
            Self::Neg => "-",
        }
    }
}

/// An assignment target or other bare identifier with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub loc: Loc,
    pub name: String,
}

/// An expression node. Every variant carries its source location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant {
        loc: Loc,
        value: ConstValue,
    },
    StrConst {
        loc: Loc,
        value: String,
    },
    LocConst {
        loc: Loc,
        value: Loc,
    },
    /// A reference to a global by fully-qualified name. The only callee
    /// form allowed in residual `Call`s.
    FQNConst {
        loc: Loc,
        fqn: Fqn,
    },
    Name {
        loc: Loc,
        id: String,
    },
    /// Residual-only: a read of a local variable.
    NameLocal {
        loc: Loc,
        name: String,
    },
    /// Residual-only: a read of a closed-over cell.
    NameOuterCell {
        loc: Loc,
        level: u32,
        name: String,
    },
    BinOp {
        loc: Loc,
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    CmpOp {
        loc: Loc,
        op: CmpOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        loc: Loc,
        op: UnaryOpKind,
        value: Box<Expr>,
    },
    Call {
        loc: Loc,
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    CallMethod {
        loc: Loc,
        target: Box<Expr>,
        method: Box<Expr>,
        args: Vec<Expr>,
    },
    GetItem {
        loc: Loc,
        value: Box<Expr>,
        args: Vec<Expr>,
    },
    GetAttr {
        loc: Loc,
        value: Box<Expr>,
        attr: Box<Expr>,
    },
    List {
        loc: Loc,
        items: Vec<Expr>,
    },
    Tuple {
        loc: Loc,
        items: Vec<Expr>,
    },
    And {
        loc: Loc,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        loc: Loc,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Walrus assignment: binds a local and yields the value.
    AssignExpr {
        loc: Loc,
        target: Ident,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Constant { loc, .. }
            | Self::StrConst { loc, .. }
            | Self::LocConst { loc, .. }
            | Self::FQNConst { loc, .. }
            | Self::Name { loc, .. }
            | Self::NameLocal { loc, .. }
            | Self::NameOuterCell { loc, .. }
            | Self::BinOp { loc, .. }
            | Self::CmpOp { loc, .. }
            | Self::UnaryOp { loc, .. }
            | Self::Call { loc, .. }
            | Self::CallMethod { loc, .. }
            | Self::GetItem { loc, .. }
            | Self::GetAttr { loc, .. }
            | Self::List { loc, .. }
            | Self::Tuple { loc, .. }
            | Self::And { loc, .. }
            | Self::Or { loc, .. }
            | Self::AssignExpr { loc, .. } => loc,
        }
    }

    /// Whether this expression is in the residual form guaranteed to the C
    /// emitter: a literal, a local read, an `FQNConst`, a `Call` whose
    /// callee is an `FQNConst`, or a simple composite of residual children.
    pub fn is_residual(&self) -> bool {
        match self {
            Self::Constant { .. }
            | Self::StrConst { .. }
            | Self::LocConst { .. }
            | Self::FQNConst { .. }
            | Self::NameLocal { .. }
            | Self::NameOuterCell { .. } => true,
            Self::Call { func, args, .. } => {
                matches!(**func, Self::FQNConst { .. }) && args.iter().all(Self::is_residual)
            }
            Self::And { left, right, .. } | Self::Or { left, right, .. } => {
                left.is_residual() && right.is_residual()
            }
            Self::Tuple { items, .. } | Self::List { items, .. } => {
                items.iter().all(Self::is_residual)
            }
            _ => false,
        }
    }
}

/// A type annotation: explicit expression or inferred (`Auto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeAnn {
    Auto { loc: Loc },
    Expr(Expr),
}

impl TypeAnn {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Auto { loc } => loc,
            Self::Expr(expr) => expr.loc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDef {
    pub loc: Loc,
    pub name: String,
    pub kind: VarKind,
    pub type_: TypeAnn,
    pub value: Option<Expr>,
}

/// What kind of function a `def` produces; selected by decorators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncKind {
    Plain,
    /// A blue function taking MetaArgs and returning an OpSpec.
    Metafunc,
    /// A function called via `[...]` instead of `(...)`.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncArg {
    pub loc: Loc,
    pub name: String,
    pub type_: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub loc: Loc,
    /// The `def name(...) -> T:` line, without the body.
    pub prototype_loc: Loc,
    pub name: String,
    pub color: Color,
    pub kind: FuncKind,
    pub args: Vec<FuncArg>,
    pub return_type: Expr,
    pub body: Vec<Stmt>,
    /// Filled by the scope analyzer before execution.
    pub symtable: SymTable,
}

impl FuncDef {
    /// The redshifted copy of this funcdef, with a replaced body.
    pub fn replace_body(&self, body: Vec<Stmt>) -> Self {
        Self {
            body,
            ..self.clone()
        }
    }
}

/// Which metaclass a `class` statement selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    /// `@struct`: fixed-layout product type.
    Struct,
    /// `@typelift`: wrapper around a low-level payload type.
    Lifted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub loc: Loc,
    pub name: String,
    pub kind: ClassKind,
    pub fields: Vec<VarDef>,
    pub body: Vec<Stmt>,
    /// Filled by the scope analyzer before execution.
    pub symtable: SymTable,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Pass {
        loc: Loc,
    },
    Return {
        loc: Loc,
        value: Expr,
    },
    Break {
        loc: Loc,
    },
    Continue {
        loc: Loc,
    },
    VarDef(VarDef),
    Assign {
        loc: Loc,
        target: Ident,
        value: Expr,
    },
    /// Residual-only specialization of [`Stmt::Assign`] to a local slot.
    AssignLocal {
        loc: Loc,
        target: Ident,
        value: Expr,
    },
    /// Residual-only specialization of [`Stmt::Assign`] to a module cell.
    AssignCell {
        loc: Loc,
        fqn: Fqn,
        value: Expr,
    },
    UnpackAssign {
        loc: Loc,
        targets: Vec<Ident>,
        value: Expr,
    },
    AugAssign {
        loc: Loc,
        op: BinOpKind,
        target: Ident,
        value: Expr,
    },
    SetAttr {
        loc: Loc,
        target: Expr,
        attr: Expr,
        value: Expr,
    },
    SetItem {
        loc: Loc,
        target: Expr,
        args: Vec<Expr>,
        value: Expr,
    },
    StmtExpr {
        loc: Loc,
        value: Expr,
    },
    If {
        loc: Loc,
        test: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        loc: Loc,
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        loc: Loc,
        target: Ident,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Raise {
        loc: Loc,
        exc: Expr,
    },
    Assert {
        loc: Loc,
        test: Expr,
        msg: Option<Expr>,
    },
    FuncDef(FuncDef),
    ClassDef(ClassDef),
}

impl Stmt {
    pub fn loc(&self) -> &Loc {
        match self {
            Self::Pass { loc }
            | Self::Return { loc, .. }
            | Self::Break { loc }
            | Self::Continue { loc }
            | Self::Assign { loc, .. }
            | Self::AssignLocal { loc, .. }
            | Self::AssignCell { loc, .. }
            | Self::UnpackAssign { loc, .. }
            | Self::AugAssign { loc, .. }
            | Self::SetAttr { loc, .. }
            | Self::SetItem { loc, .. }
            | Self::StmtExpr { loc, .. }
            | Self::If { loc, .. }
            | Self::While { loc, .. }
            | Self::For { loc, .. }
            | Self::Raise { loc, .. }
            | Self::Assert { loc, .. } => loc,
            Self::VarDef(vardef) => &vardef.loc,
            Self::FuncDef(funcdef) => &funcdef.loc,
            Self::ClassDef(classdef) => &classdef.loc,
        }
    }
}

/// A top-level module declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    Import {
        loc: Loc,
        modname: String,
        attr: Option<String>,
        asname: String,
    },
    GlobalFuncDef(FuncDef),
    GlobalClassDef(ClassDef),
    GlobalVarDef(VarDef),
}

/// A parsed module: the root of the input AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub filename: String,
    pub loc: Loc,
    pub decls: Vec<Decl>,
    /// Filled by the scope analyzer before execution.
    pub symtable: SymTable,
}

/// Shared handle to a funcdef, as stored inside function objects.
pub type FuncDefRef = Rc<FuncDef>;

#[cfg(test)]
mod tests {
    use super::*;

    fn fqn(s: &str) -> Fqn {
        s.parse().unwrap()
    }

    #[test]
    fn residual_accepts_call_of_fqnconst() {
        let call = Expr::Call {
            loc: Loc::fake(),
            func: Box::new(Expr::FQNConst {
                loc: Loc::fake(),
                fqn: fqn("operator::i32_add"),
            }),
            args: vec![
                Expr::NameLocal {
                    loc: Loc::fake(),
                    name: "x".into(),
                },
                Expr::Constant {
                    loc: Loc::fake(),
                    value: ConstValue::I32(1),
                },
            ],
        };
        assert!(call.is_residual());
    }

    #[test]
    fn residual_rejects_unshifted_nodes() {
        let name = Expr::Name {
            loc: Loc::fake(),
            id: "x".into(),
        };
        assert!(!name.is_residual());
        let call = Expr::Call {
            loc: Loc::fake(),
            func: Box::new(name),
            args: vec![],
        };
        assert!(!call.is_residual());
    }
}
