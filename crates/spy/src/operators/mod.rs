//! Operator dispatch: the front-end entry points called by the evaluator.
//!
//! Every operator routes through the same three-stage pipeline: the
//! evaluator calls an OPERATOR with MetaArgs, the OPERATOR consults the
//! multimethod table and/or the target type's dunder hooks to obtain an
//! [`crate::opspec::OpSpec`], and `typecheck_opspec` turns that into a
//! ready-to-execute [`crate::opimpl::OpImpl`].

pub mod attrop;
pub mod binop;
pub mod callop;
pub mod convop;
pub mod itemop;
pub mod multimethod;
pub mod raiseop;
pub mod unaryop;

use crate::ast::{BinOpKind, CmpOpKind, UnaryOpKind};
use crate::errors::SpyResult;
use crate::location::Loc;
use crate::opimpl::OpImpl;
use crate::opspec::MetaArg;
use crate::vm::Vm;

/// The generic operators of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Binary(BinOpKind),
    Cmp(CmpOpKind),
    Unary(UnaryOpKind),
    Call,
    CallMethod,
    GetItem,
    SetItem,
    GetAttr,
    SetAttr,
    Raise,
}

/// Dispatches one operator application over MetaArgs to a typechecked
/// OpImpl.
pub fn call_op(vm: &mut Vm, loc: &Loc, op: Operator, args_wm: &[MetaArg]) -> SpyResult<OpImpl> {
    match op {
        Operator::Binary(kind) => binop::op_binary(vm, loc, kind, args_wm),
        Operator::Cmp(kind) => binop::op_cmp(vm, loc, kind, args_wm),
        Operator::Unary(kind) => unaryop::op_unary(vm, loc, kind, args_wm),
        Operator::Call => callop::op_call(vm, loc, args_wm),
        Operator::CallMethod => callop::op_call_method(vm, loc, args_wm),
        Operator::GetItem => itemop::op_getitem(vm, loc, args_wm),
        Operator::SetItem => itemop::op_setitem(vm, loc, args_wm),
        Operator::GetAttr => attrop::op_getattr(vm, loc, args_wm),
        Operator::SetAttr => attrop::op_setattr(vm, loc, args_wm),
        Operator::Raise => raiseop::op_raise(vm, loc, args_wm),
    }
}
