//! The currency of operator dispatch.
//!
//! Every operator takes [`MetaArg`]s (compile-time descriptions of its
//! argument positions), consults a metafunction, and gets back an
//! [`OpSpec`] saying how to implement the operation for those shapes.

use std::cell::Cell;

use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::location::Loc;
use crate::object::{FuncId, TypeId, WObject};
use crate::symtable::{Color, Symbol};

thread_local! {
    static NEXT_METAARG_ID: Cell<u64> = const { Cell::new(0) };
}

/// The compile-time description of one argument position: its color, the
/// static type the expression is proven to have, the value when blue, and
/// where it comes from.
///
/// `w_val` is present iff the argument is blue — except inside a redshift
/// frame, where red positions intentionally carry no value.
#[derive(Debug, Clone)]
pub struct MetaArg {
    /// Identity token: survives cloning, so dispatch can match an argument
    /// returned by a metafunction back to its incoming position.
    id: u64,
    pub color: Color,
    pub w_static_type: TypeId,
    pub w_val: Option<WObject>,
    pub loc: Loc,
    pub sym: Option<Symbol>,
}

impl MetaArg {
    pub fn new(color: Color, w_static_type: TypeId, w_val: Option<WObject>, loc: Loc) -> Self {
        debug_assert!(
            color == Color::Red || w_val.is_some(),
            "blue MetaArg must carry a value"
        );
        let id = NEXT_METAARG_ID.with(|c| {
            let id = c.get();
            c.set(id + 1);
            id
        });
        Self {
            id,
            color,
            w_static_type,
            w_val,
            loc,
            sym: None,
        }
    }

    pub fn blue(w_static_type: TypeId, w_val: WObject, loc: Loc) -> Self {
        Self::new(Color::Blue, w_static_type, Some(w_val), loc)
    }

    pub fn red(w_static_type: TypeId, w_val: Option<WObject>, loc: Loc) -> Self {
        Self::new(Color::Red, w_static_type, w_val, loc)
    }

    pub fn with_sym(mut self, sym: Symbol) -> Self {
        self.sym = Some(sym);
        self
    }

    pub fn is_blue(&self) -> bool {
        self.color == Color::Blue
    }

    /// Whether this descriptor denotes the same argument position as
    /// `other` (clone-stable identity, not structural equality).
    pub fn same_arg(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// The value of a blue argument.
    pub fn blue_val(&self) -> SpyResult<&WObject> {
        match (&self.color, &self.w_val) {
            (Color::Blue, Some(w_val)) => Ok(w_val),
            _ => Err(SpyError::simple(
                ErrorKind::TypeError,
                "expected a blue value",
                "this is red",
                self.loc.clone(),
            )),
        }
    }

    /// The value of a blue string argument, for dispatch on attribute and
    /// method names.
    pub fn blue_str(&self) -> SpyResult<&str> {
        match self.blue_val()? {
            WObject::Str(s) => Ok(s),
            _ => Err(SpyError::simple(
                ErrorKind::TypeError,
                "expected a blue `str`",
                "not a string",
                self.loc.clone(),
            )),
        }
    }
}

/// What a metafunction answers when asked "how do I implement this
/// operation on these MetaArgs?".
#[derive(Debug, Clone)]
pub enum OpSpecKind {
    /// No implementation; the caller reports a type error.
    Null,
    /// The result is a compile-time constant.
    Const(WObject),
    /// Call the function with the incoming MetaArgs verbatim.
    Simple(FuncId),
    /// Call the function with these substituted MetaArgs (possibly
    /// including fresh constants absent from the input).
    Args(FuncId, Vec<MetaArg>),
}

#[derive(Debug, Clone)]
pub struct OpSpec {
    pub kind: OpSpecKind,
    /// Set when the OpSpec comes from a direct call expression, so arity
    /// errors can point at the call site.
    pub is_direct_call: bool,
}

impl OpSpec {
    pub const NULL: Self = Self {
        kind: OpSpecKind::Null,
        is_direct_call: false,
    };

    pub fn constant(w_val: WObject) -> Self {
        Self {
            kind: OpSpecKind::Const(w_val),
            is_direct_call: false,
        }
    }

    pub fn simple(w_func: FuncId) -> Self {
        Self {
            kind: OpSpecKind::Simple(w_func),
            is_direct_call: false,
        }
    }

    pub fn with_args(w_func: FuncId, args: Vec<MetaArg>) -> Self {
        Self {
            kind: OpSpecKind::Args(w_func, args),
            is_direct_call: false,
        }
    }

    pub fn direct_call(mut self) -> Self {
        self.is_direct_call = true;
        self
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, OpSpecKind::Null)
    }

    pub fn target_func(&self) -> Option<FuncId> {
        match self.kind {
            OpSpecKind::Simple(w_func) | OpSpecKind::Args(w_func, _) => Some(w_func),
            _ => None,
        }
    }
}
