//! Type metaobjects.
//!
//! A [`WType`] describes a kind of value: its FQN, its in-memory
//! representation discriminator ([`PyClass`]), its method dictionary and
//! (for structs) its field layout. All types live in the VM's arena and
//! reference each other by [`TypeId`] only, so cyclic type graphs (a
//! struct field referencing a pointer-to-self) never own anything.

use indexmap::IndexMap;
use std::rc::Rc;

use crate::function::FuncType;
use crate::location::Loc;
use crate::object::{FuncId, TypeId, WObject};

/// The in-memory representation discriminator of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PyClass {
    /// The root of the lattice; everything is an `object`.
    Object,
    /// Statically-unknown: operations defer to runtime dispatch.
    Dynamic,
    NoneType,
    Bool,
    I8,
    U8,
    I32,
    F64,
    Str,
    Tuple,
    /// Source locations as first-class values.
    Loc,
    /// Type metaobjects themselves.
    Type,
    /// Functions; the concrete signature lives in [`WType::functype`].
    Func,
    Module,
    Cell,
    Exception,
    /// `list[T]`; the element type lives in [`WType::itemtype_w`].
    List,
    /// The type of the empty list literal, before unification.
    EmptyList,
    /// `@struct`: fixed-layout product type (a value type).
    Struct,
    /// `@typelift`: wrapper with an `__ll__` payload (a reference type).
    Lifted,
    /// Meta-level: dispatch results.
    OpSpec,
    /// Meta-level: argument descriptors.
    MetaArg,
}

impl PyClass {
    /// Whether values of this representation are passed by reference.
    ///
    /// This drives the `==`/`!=` identity-comparison fallback: only two
    /// operands whose common ancestor is a reference type may fall back to
    /// pointer equality.
    pub fn is_reference_type(self) -> bool {
        matches!(self, Self::List | Self::Exception | Self::Lifted)
    }
}

/// The outcome of executing a class body: field declarations plus
/// everything else bound in the class scope (methods, nested consts).
#[derive(Debug, Default)]
pub struct ClassBody {
    pub fields_w: IndexMap<String, (TypeId, Loc)>,
    pub dict_w: IndexMap<String, WObject>,
}

/// A type metaobject.
#[derive(Debug, Clone)]
pub struct WType {
    pub fqn: crate::fqn::Fqn,
    pub pyclass: PyClass,
    /// False only between a forward declaration and the end of the class
    /// body defining it. No field or method access is legal meanwhile.
    pub is_defined: bool,
    /// Method/attribute dictionary, keyed by name. Lookup is linear within
    /// one type; there is no inheritance walk.
    pub dict_w: IndexMap<String, WObject>,
    /// Struct field layout, in declaration order.
    pub fields_w: IndexMap<String, TypeId>,
    /// Where each field was declared (for error messages).
    pub field_locs: IndexMap<String, Loc>,
    /// The element type of `list[T]`, or the payload type of a typelift.
    pub itemtype_w: Option<TypeId>,
    /// For `PyClass::Func` types: the concrete signature.
    pub functype: Option<Rc<FuncType>>,
}

impl WType {
    pub fn new(fqn: crate::fqn::Fqn, pyclass: PyClass) -> Self {
        Self {
            fqn,
            pyclass,
            is_defined: true,
            dict_w: IndexMap::new(),
            fields_w: IndexMap::new(),
            field_locs: IndexMap::new(),
            itemtype_w: None,
            functype: None,
        }
    }

    /// A forward declaration: the type exists and can be named, but its
    /// layout is not known yet.
    pub fn declare(fqn: crate::fqn::Fqn, pyclass: PyClass) -> Self {
        Self {
            is_defined: false,
            ..Self::new(fqn, pyclass)
        }
    }

    /// Finalizes a forward-declared type from its executed class body.
    pub fn define_from_classbody(&mut self, body: ClassBody) {
        debug_assert!(!self.is_defined, "type defined twice");
        for (name, (w_type, loc)) in body.fields_w {
            self.fields_w.insert(name.clone(), w_type);
            self.field_locs.insert(name, loc);
        }
        self.dict_w = body.dict_w;
        self.is_defined = true;
    }

    pub fn is_reference_type(&self) -> bool {
        self.pyclass.is_reference_type()
    }

    /// Looks up a function bound in the method dictionary.
    ///
    /// The caller decides whether it expects a red method (lowercase
    /// dunders) or a blue metafunction (UPPERCASE dunders); the dict does
    /// not segregate them.
    pub fn lookup_func(&self, name: &str) -> Option<FuncId> {
        match self.dict_w.get(name) {
            Some(WObject::Func(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn lookup_attr(&self, name: &str) -> Option<&WObject> {
        self.dict_w.get(name)
    }

    pub fn human_name(&self) -> String {
        self.fqn.human_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fqn::Fqn;

    #[test]
    fn forward_declaration_lifecycle() {
        let fqn = Fqn::from_parts(["mod", "Point"]);
        let mut w_type = WType::declare(fqn, PyClass::Struct);
        assert!(!w_type.is_defined);
        let mut body = ClassBody::default();
        body.fields_w
            .insert("x".into(), (TypeId::new(0), Loc::fake()));
        w_type.define_from_classbody(body);
        assert!(w_type.is_defined);
        assert_eq!(w_type.fields_w.len(), 1);
    }

    #[test]
    fn reference_kinds() {
        assert!(PyClass::List.is_reference_type());
        assert!(PyClass::Lifted.is_reference_type());
        assert!(!PyClass::Struct.is_reference_type());
        assert!(!PyClass::I32.is_reference_type());
        assert!(!PyClass::Object.is_reference_type());
        assert!(!PyClass::Dynamic.is_reference_type());
    }
}
