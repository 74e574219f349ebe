//! The SPy compiler core.
//!
//! SPy is a statically-typed, ahead-of-time-compilable language whose
//! surface syntax mirrors a dynamic scripting language but whose semantics
//! are governed by a two-color evaluation discipline: *blue* values are
//! known at compile time, *red* ones only at run time.
//!
//! This crate implements the compilation pipeline that takes a parsed SPy
//! module and lowers it to a form suitable for emission as C source:
//!
//! - the **semantic evaluator** ([`frame`]) interprets type-level and
//!   compile-time code, executing module, class and function bodies at the
//!   blue level;
//! - the **doppler/redshift pass** ([`doppler`]) specializes the AST of
//!   every red function, resolving operator dispatch, inserting implicit
//!   conversions and folding away all blue computation, producing a fully
//!   typed residual AST in which every call targets a concrete,
//!   monomorphic function.
//!
//! The lexer/parser and the C emitter are external collaborators: the
//! parser feeds [`ast::Module`]s through the [`driver::SourceParser`]
//! trait, and the emitter consumes the redshifted functions together with
//! the VM's global table.

pub mod analyze;
pub mod ast;
pub mod builtins;
pub mod doppler;
pub mod driver;
pub mod errfmt;
pub mod errors;
pub mod fqn;
pub mod frame;
pub mod function;
pub mod location;
pub mod object;
pub mod operators;
pub mod opimpl;
pub mod opspec;
pub mod symtable;
pub mod typecheck;
pub mod types;
pub mod vm;

pub use crate::{
    errfmt::{ErrorFormatter, SourceMap, SourceProvider},
    errors::{ErrorKind, Level, SpyError, SpyResult},
    fqn::{Fqn, NSPart},
    location::Loc,
    object::{FuncId, ModuleId, TypeId, WObject},
    opspec::{MetaArg, OpSpec},
    symtable::{Color, SymTable, Symbol},
    vm::{ErrorMode, Vm},
};
