use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::location::Loc;

/// The two-color evaluation discipline: blue is known at compile time, red
/// only at run time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    Blue,
    Red,
}

impl Color {
    /// Blue iff every given color is blue.
    pub fn maybe_blue(colors: impl IntoIterator<Item = Self>) -> Self {
        if colors.into_iter().all(|c| c == Self::Blue) {
            Self::Blue
        } else {
            Self::Red
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum VarKind {
    Var,
    Const,
}

/// How a name is stored: directly in its frame, through a [`crate::vm::Vm`]
/// cell, or not at all (an unbound reference which errors at use time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarStorage {
    Direct,
    Cell,
    NameError,
}

/// A reference to an imported name.
///
/// `attr == None` means the whole module is referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    pub modname: String,
    pub attr: Option<String>,
}

/// One name-table record, populated by the scope analyzer.
///
/// `level` says in which scope the symbol resides: 0 is the scope owning
/// the symtable (a local), 1 the most immediate outer scope, and so on.
/// E.g. for a module-level funcdef there are three levels: locals, the
/// module scope, and builtins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub color: Color,
    pub varkind: VarKind,
    pub storage: VarStorage,
    pub level: u32,
    pub impref: Option<ImportRef>,
    pub fqn: Option<crate::fqn::Fqn>,
    /// Where the symbol is defined in the source code.
    pub loc: Loc,
    /// Where the *type* of the symbol is written.
    pub type_loc: Loc,
}

impl Symbol {
    pub fn is_local(&self) -> bool {
        self.level == 0
    }
}

/// All the names used in a given scope.
///
/// Names are either definitions (introduced by this scope, `level == 0`)
/// or references to an outer scope (`level > 0`). The table also records
/// the color of the frame it belongs to: red function frames are red,
/// everything else (blue functions, modules, classdefs) is blue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymTable {
    /// Scope name, for debugging only.
    pub name: String,
    pub color: Color,
    symbols: AHashMap<String, Symbol>,
}

impl SymTable {
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color,
            symbols: AHashMap::new(),
        }
    }

    /// # Panics
    /// Panics if the name is already present; duplicate *declarations* are
    /// a user error and must be rejected before insertion.
    pub fn add(&mut self, sym: Symbol) {
        let prev = self.symbols.insert(sym.name.clone(), sym);
        assert!(prev.is_none(), "symbol added twice");
    }

    pub fn lookup(&self, name: &str) -> &Symbol {
        &self.symbols[name]
    }

    pub fn lookup_maybe(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    /// Finds the symbol only if it is a definition (a local name).
    pub fn lookup_definition_maybe(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name).filter(|sym| sym.is_local())
    }

    pub fn has_definition(&self, name: &str) -> bool {
        self.lookup_definition_maybe(name).is_some()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maybe_blue_requires_all_blue() {
        assert_eq!(
            Color::maybe_blue([Color::Blue, Color::Blue]),
            Color::Blue
        );
        assert_eq!(Color::maybe_blue([Color::Blue, Color::Red]), Color::Red);
        assert_eq!(Color::maybe_blue([]), Color::Blue);
    }

    #[test]
    fn definitions_are_level_zero() {
        let mut table = SymTable::new("test", Color::Blue);
        table.add(Symbol {
            name: "x".into(),
            color: Color::Red,
            varkind: VarKind::Var,
            storage: VarStorage::Direct,
            level: 0,
            impref: None,
            fqn: None,
            loc: Loc::fake(),
            type_loc: Loc::fake(),
        });
        table.add(Symbol {
            name: "y".into(),
            color: Color::Blue,
            varkind: VarKind::Const,
            storage: VarStorage::Direct,
            level: 1,
            impref: None,
            fqn: None,
            loc: Loc::fake(),
            type_loc: Loc::fake(),
        });
        assert!(table.has_definition("x"));
        assert!(!table.has_definition("y"));
        assert!(table.lookup_maybe("y").is_some());
    }
}
