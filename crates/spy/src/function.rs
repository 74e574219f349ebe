//! Function objects: signatures, user functions, builtins and adapters.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::{FuncDefRef, FuncKind};
use crate::errors::SpyResult;
use crate::location::Loc;
use crate::object::{FuncId, TypeId, WObject};
use crate::opspec::{MetaArg, OpSpec};
use crate::symtable::Color;
use crate::vm::Vm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Simple,
    /// Trailing parameter absorbing any number of arguments (metafunction
    /// entry points).
    VarPositional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncParam {
    pub w_type: TypeId,
    pub kind: ParamKind,
}

impl FuncParam {
    pub fn simple(w_type: TypeId) -> Self {
        Self {
            w_type,
            kind: ParamKind::Simple,
        }
    }
}

/// A function signature. A `FuncType` is itself a type: the VM wraps it
/// into a `PyClass::Func` [`crate::types::WType`] on creation.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub params: Vec<FuncParam>,
    pub w_restype: TypeId,
    pub color: Color,
    pub kind: FuncKind,
}

impl FuncType {
    pub fn new(params: Vec<FuncParam>, w_restype: TypeId, color: Color, kind: FuncKind) -> Self {
        Self {
            params,
            w_restype,
            color,
            kind,
        }
    }

    pub fn is_varargs(&self) -> bool {
        matches!(
            self.params.last(),
            Some(FuncParam {
                kind: ParamKind::VarPositional,
                ..
            })
        )
    }

    /// The number of fixed (non-varargs) parameters.
    pub fn fixed_argcount(&self) -> usize {
        if self.is_varargs() {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }

    pub fn is_argcount_ok(&self, got: usize) -> bool {
        if self.is_varargs() {
            got >= self.fixed_argcount()
        } else {
            got == self.params.len()
        }
    }

    /// The parameter at argument position `i`, with the varargs tail
    /// repeating its element.
    pub fn param_at(&self, i: usize) -> &FuncParam {
        if i < self.params.len() {
            &self.params[i]
        } else {
            debug_assert!(self.is_varargs());
            self.params.last().expect("varargs param")
        }
    }
}

/// One frame's worth of blue bindings, shared into the closures of inner
/// definitions. Mutations by the defining frame stay visible.
pub type NamespaceRef = Rc<RefCell<AHashMap<String, WObject>>>;

#[derive(Debug)]
struct ClosureNode {
    frame: NamespaceRef,
    parent: Closure,
}

/// The chain of enclosing blue namespaces, innermost first.
///
/// A persistent cons list: extending shares the tail, so capturing a
/// namespace at every nested definition stays O(1).
#[derive(Debug, Clone, Default)]
pub struct Closure(Option<Rc<ClosureNode>>);

impl Closure {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// A new closure with `frame` as the innermost namespace.
    pub fn extend(&self, frame: NamespaceRef) -> Self {
        Self(Some(Rc::new(ClosureNode {
            frame,
            parent: self.clone(),
        })))
    }

    /// The namespace `level` scopes out: 1 is the innermost captured frame.
    pub fn get(&self, level: u32) -> Option<NamespaceRef> {
        debug_assert!(level >= 1);
        let mut node = self.0.as_ref()?;
        for _ in 1..level {
            node = node.parent.0.as_ref()?;
        }
        Some(Rc::clone(&node.frame))
    }

    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut cur = &self.0;
        while let Some(node) = cur {
            n += 1;
            cur = &node.parent.0;
        }
        n
    }
}

/// Compile-time context baked into a builtin minted for one specific type:
/// a struct constructor knows its type, a field accessor its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCtx {
    Type(TypeId),
    Field(TypeId, usize),
}

/// Host implementation of a builtin: a plain function over values, a
/// type-contextualized one, or a metafunction over [`MetaArg`]s returning
/// an [`OpSpec`].
#[derive(Clone, Copy)]
pub enum BuiltinImpl {
    Host(fn(&mut Vm, &[WObject]) -> SpyResult<WObject>),
    HostCtx(
        BuiltinCtx,
        fn(&mut Vm, BuiltinCtx, &[WObject]) -> SpyResult<WObject>,
    ),
    Meta(fn(&mut Vm, &Loc, &[MetaArg]) -> SpyResult<OpSpec>),
}

impl std::fmt::Debug for BuiltinImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(_) => f.write_str("BuiltinImpl::Host(..)"),
            Self::HostCtx(ctx, _) => write!(f, "BuiltinImpl::HostCtx({ctx:?}, ..)"),
            Self::Meta(_) => f.write_str("BuiltinImpl::Meta(..)"),
        }
    }
}

/// A host-implemented primitive.
#[derive(Debug, Clone)]
pub struct BuiltinFunc {
    pub fqn: crate::fqn::Fqn,
    pub functype: Rc<FuncType>,
    /// Pure builtins let all-blue applications fold to blue results.
    pub pure: bool,
    pub imp: BuiltinImpl,
    /// Definition site, when known, for "function defined here" notes.
    pub def_loc: Option<Loc>,
}

/// A user-defined function: its AST plus the namespaces it closed over.
#[derive(Debug, Clone)]
pub struct AstFunc {
    pub fqn: crate::fqn::Fqn,
    pub functype: Rc<FuncType>,
    pub funcdef: FuncDefRef,
    pub closure: Closure,
    /// Final inferred types of the locals, filled by redshift.
    pub locals_types_w: AHashMap<String, TypeId>,
    pub redshifted: bool,
    /// Set on the *old* function when redshift replaces it.
    pub redshifted_into: Option<FuncId>,
}

impl AstFunc {
    pub fn color(&self) -> Color {
        self.functype.color
    }

    pub fn def_loc(&self) -> Loc {
        self.funcdef.prototype_loc.clone()
    }
}

/// Argument-shuffling instructions of a [`FuncAdapter`] and of every
/// [`crate::opimpl::OpImpl`].
#[derive(Debug, Clone)]
pub enum ArgSpec {
    /// Pass the i-th incoming argument through.
    Arg(usize),
    /// Pass a pre-filled constant.
    Const(WObject, Loc),
    /// Convert the inner spec's value through a unary conversion function.
    Convert { w_conv: FuncId, arg: Box<ArgSpec> },
}

/// Adapts a target function to a different signature by re-shuffling,
/// pre-filling or converting the incoming arguments.
#[derive(Debug, Clone)]
pub struct FuncAdapter {
    pub functype: Rc<FuncType>,
    pub w_func: FuncId,
    pub args: Vec<ArgSpec>,
}

/// Any function registered with the VM.
#[derive(Debug, Clone)]
pub enum FuncData {
    Builtin(BuiltinFunc),
    Ast(AstFunc),
    Adapter(FuncAdapter),
}

impl FuncData {
    pub fn fqn(&self) -> crate::fqn::Fqn {
        match self {
            Self::Builtin(f) => f.fqn.clone(),
            Self::Ast(f) => f.fqn.clone(),
            // adapters are anonymous plumbing
            Self::Adapter(_) => crate::fqn::Fqn::from_parts(["builtins", "__adapter__"]),
        }
    }

    pub fn functype(&self) -> Rc<FuncType> {
        match self {
            Self::Builtin(f) => Rc::clone(&f.functype),
            Self::Ast(f) => Rc::clone(&f.functype),
            Self::Adapter(f) => Rc::clone(&f.functype),
        }
    }

    pub fn is_pure(&self) -> bool {
        match self {
            Self::Builtin(f) => f.pure,
            Self::Ast(_) => false,
            Self::Adapter(_) => false,
        }
    }

    pub fn def_loc(&self) -> Option<Loc> {
        match self {
            Self::Builtin(f) => f.def_loc.clone(),
            Self::Ast(f) => Some(f.def_loc()),
            Self::Adapter(_) => None,
        }
    }

    pub fn as_ast(&self) -> Option<&AstFunc> {
        match self {
            Self::Ast(f) => Some(f),
            _ => None,
        }
    }
}
