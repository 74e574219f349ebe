//! The universal value and the arena ids used to reference VM-owned data.
//!
//! Every value the evaluator manipulates is a [`WObject`]. Types,
//! functions, modules and cells live in arenas owned by the VM and are
//! referenced by id, so the possibly-cyclic reference graph between types
//! never owns anything (the arena does).

use std::rc::Rc;

use crate::errors::ErrorKind;
use crate::location::Loc;
use crate::opspec::{MetaArg, OpSpec};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index.try_into().expect("arena index overflow"))
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index into the VM's type arena.
    TypeId
);
arena_id!(
    /// Index into the VM's function arena.
    FuncId
);
arena_id!(
    /// Index into the VM's module arena.
    ModuleId
);
arena_id!(
    /// Index into the VM's cell arena.
    CellId
);

/// A SPy exception instance (`ValueError("...")`), as a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub kind: ErrorKind,
    pub message: String,
}

/// A list value, carrying its concrete `list[T]` type.
#[derive(Debug, Clone, PartialEq)]
pub struct ListValue {
    pub w_type: TypeId,
    pub items_w: Vec<WObject>,
}

/// A struct or typelift instance: field values keyed positionally by the
/// field order of its type. Fields are interiorly mutable so that `SetAttr`
/// works on shared instances during blue evaluation.
#[derive(Debug, PartialEq)]
pub struct InstanceValue {
    pub w_type: TypeId,
    pub fields_w: std::cell::RefCell<Vec<WObject>>,
}

/// The universal value.
///
/// Cheap to clone: compound payloads are behind `Rc`, arena-backed values
/// are ids. Polymorphic behavior is looked up through the value's dynamic
/// [`crate::types::WType`], never through the variant itself.
#[derive(Debug, Clone)]
pub enum WObject {
    None,
    Bool(bool),
    I8(i8),
    U8(u8),
    I32(i32),
    F64(f64),
    Str(Rc<str>),
    Tuple(Rc<Vec<WObject>>),
    LocVal(Rc<Loc>),
    Type(TypeId),
    Func(FuncId),
    Module(ModuleId),
    Cell(CellId),
    Exception(Rc<ExceptionValue>),
    List(Rc<ListValue>),
    Instance(Rc<InstanceValue>),
    /// The singleton value of the empty list literal, whose element type is
    /// not yet known.
    EmptyList,
    /// Meta-level: a dispatch result, returned by metafunctions.
    OpSpecVal(Rc<OpSpec>),
    /// Meta-level: an argument descriptor, passed to metafunctions.
    MetaArgVal(Rc<MetaArg>),
}

/// Identity key used by `make_fqn_const` to make FQN minting idempotent.
///
/// Primitives compare by value, Rc-backed payloads by allocation identity,
/// arena values by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstKey {
    None,
    EmptyList,
    Bool(bool),
    I8(i8),
    U8(u8),
    I32(i32),
    F64Bits(u64),
    Ptr(usize),
    Type(TypeId),
    Func(FuncId),
    Module(ModuleId),
    Cell(CellId),
}

impl PartialEq for WObject {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::EmptyList, Self::EmptyList) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I8(a), Self::I8(b)) => a == b,
            (Self::U8(a), Self::U8(b)) => a == b,
            (Self::I32(a), Self::I32(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::LocVal(a), Self::LocVal(b)) => a == b,
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Func(a), Self::Func(b)) => a == b,
            (Self::Module(a), Self::Module(b)) => a == b,
            (Self::Cell(a), Self::Cell(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Instance(a), Self::Instance(b)) => a == b,
            // meta-level values compare by identity
            (Self::OpSpecVal(a), Self::OpSpecVal(b)) => Rc::ptr_eq(a, b),
            (Self::MetaArgVal(a), Self::MetaArgVal(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl WObject {
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(s.as_ref()))
    }

    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            Self::Type(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<FuncId> {
        match self {
            Self::Func(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<ModuleId> {
        match self {
            Self::Module(id) => Some(*id),
            _ => None,
        }
    }

    /// The identity key for the constant-registration table.
    pub fn const_key(&self) -> ConstKey {
        match self {
            Self::None => ConstKey::None,
            Self::EmptyList => ConstKey::EmptyList,
            Self::Bool(b) => ConstKey::Bool(*b),
            Self::I8(x) => ConstKey::I8(*x),
            Self::U8(x) => ConstKey::U8(*x),
            Self::I32(x) => ConstKey::I32(*x),
            Self::F64(x) => ConstKey::F64Bits(x.to_bits()),
            Self::Str(s) => ConstKey::Ptr(Rc::as_ptr(s).cast::<u8>() as usize),
            Self::Tuple(t) => ConstKey::Ptr(Rc::as_ptr(t) as usize),
            Self::LocVal(l) => ConstKey::Ptr(Rc::as_ptr(l) as usize),
            Self::Exception(e) => ConstKey::Ptr(Rc::as_ptr(e) as usize),
            Self::List(l) => ConstKey::Ptr(Rc::as_ptr(l) as usize),
            Self::Instance(i) => ConstKey::Ptr(Rc::as_ptr(i) as usize),
            Self::OpSpecVal(o) => ConstKey::Ptr(Rc::as_ptr(o) as usize),
            Self::MetaArgVal(m) => ConstKey::Ptr(Rc::as_ptr(m) as usize),
            Self::Type(id) => ConstKey::Type(*id),
            Self::Func(id) => ConstKey::Func(*id),
            Self::Module(id) => ConstKey::Module(*id),
            Self::Cell(id) => ConstKey::Cell(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_key_primitives_by_value() {
        assert_eq!(WObject::I32(5).const_key(), WObject::I32(5).const_key());
        assert_ne!(WObject::I32(5).const_key(), WObject::I32(6).const_key());
        assert_ne!(WObject::I32(0).const_key(), WObject::Bool(false).const_key());
    }

    #[test]
    fn const_key_rc_by_identity() {
        let a = WObject::str("hello");
        let b = WObject::str("hello");
        assert_eq!(a.const_key(), a.clone().const_key());
        assert_ne!(a.const_key(), b.const_key());
    }
}
