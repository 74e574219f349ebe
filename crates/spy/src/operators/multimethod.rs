//! The multimethod table consulted by arithmetic, comparison and bitwise
//! operators before any dunder lookup.

use ahash::AHashMap;

use crate::object::{FuncId, TypeId};

type BinKey = (&'static str, Option<TypeId>, Option<TypeId>);

/// Maps `(op-token, leftType, rightType)` to a concrete implementation.
///
/// A partial entry (one side `None`) accepts any type on that side; it is
/// how `dynamic` hooks into every operator.
#[derive(Debug, Default)]
pub struct MultiMethodTable {
    binary: AHashMap<BinKey, FuncId>,
    unary: AHashMap<(&'static str, TypeId), FuncId>,
}

impl MultiMethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// Panics on a duplicate registration; the builtin tables are written
    /// once at VM startup.
    pub fn register(
        &mut self,
        token: &'static str,
        w_ltype: Option<TypeId>,
        w_rtype: Option<TypeId>,
        w_impl: FuncId,
    ) {
        let prev = self.binary.insert((token, w_ltype, w_rtype), w_impl);
        assert!(prev.is_none(), "duplicate multimethod for `{token}`");
    }

    /// Registers partial entries accepting `w_type` on either side.
    pub fn register_partial(&mut self, token: &'static str, w_type: TypeId, w_impl: FuncId) {
        self.register(token, Some(w_type), None, w_impl);
        self.register(token, None, Some(w_type), w_impl);
    }

    pub fn register_unary(&mut self, token: &'static str, w_type: TypeId, w_impl: FuncId) {
        let prev = self.unary.insert((token, w_type), w_impl);
        assert!(prev.is_none(), "duplicate unary multimethod for `{token}`");
    }

    /// Exact match first, then left-partial, then right-partial.
    pub fn lookup(&self, token: &'static str, w_ltype: TypeId, w_rtype: TypeId) -> Option<FuncId> {
        self.binary
            .get(&(token, Some(w_ltype), Some(w_rtype)))
            .or_else(|| self.binary.get(&(token, Some(w_ltype), None)))
            .or_else(|| self.binary.get(&(token, None, Some(w_rtype))))
            .copied()
    }

    pub fn lookup_unary(&self, token: &'static str, w_type: TypeId) -> Option<FuncId> {
        self.unary.get(&(token, w_type)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_beats_partial() {
        let mut mm = MultiMethodTable::new();
        let t_i32 = TypeId::new(0);
        let t_dyn = TypeId::new(1);
        let exact = FuncId::new(10);
        let partial = FuncId::new(11);
        mm.register("+", Some(t_i32), Some(t_i32), exact);
        mm.register_partial("+", t_dyn, partial);
        assert_eq!(mm.lookup("+", t_i32, t_i32), Some(exact));
        assert_eq!(mm.lookup("+", t_dyn, t_i32), Some(partial));
        assert_eq!(mm.lookup("+", t_i32, t_dyn), Some(partial));
        assert_eq!(mm.lookup("-", t_i32, t_i32), None);
    }
}
