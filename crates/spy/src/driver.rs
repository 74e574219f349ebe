//! The import pipeline: topological module discovery, per-module analysis
//! and execution, and redshift orchestration.

use ahash::AHashSet;
use tracing::{debug, info_span};

use crate::analyze::analyze_module;
use crate::ast;
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::frame::run_module;
use crate::object::ModuleId;
use crate::vm::{ErrorMode, Vm};

/// The external parser interface: the driver asks it for one parsed module
/// at a time. All file I/O lives behind this trait, outside the core.
pub trait SourceParser {
    fn parse(&mut self, modname: &str) -> SpyResult<ast::Module>;
}

/// Modules provided by the VM itself, never parsed from source.
const PRELOADED: &[&str] = &["builtins", "operator"];

/// Options of one compilation run.
#[derive(Debug, Clone, Copy)]
pub struct CompilerOpts {
    pub error_mode: ErrorMode,
}

impl Default for CompilerOpts {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Eager,
        }
    }
}

/// Loads `modname` and everything it imports, depth-first; then executes
/// each module body exactly once, dependencies before dependents.
pub fn load_module(
    vm: &mut Vm,
    parser: &mut dyn SourceParser,
    modname: &str,
) -> SpyResult<ModuleId> {
    let mut visiting = Vec::new();
    load_recursive(vm, parser, modname, &mut visiting)?;
    Ok(vm.lookup_module(modname).expect("module just loaded"))
}

fn load_recursive(
    vm: &mut Vm,
    parser: &mut dyn SourceParser,
    modname: &str,
    visiting: &mut Vec<String>,
) -> SpyResult<()> {
    if vm.lookup_module(modname).is_some() {
        return Ok(());
    }
    if visiting.iter().any(|name| name == modname) {
        let mut cycle: Vec<&str> = visiting.iter().map(String::as_str).collect();
        cycle.push(modname);
        return Err(SpyError::new(
            ErrorKind::ImportError,
            format!("circular import: {}", cycle.join(" -> ")),
        ));
    }
    visiting.push(modname.to_owned());
    let span = info_span!("load_module", module = modname);
    let _guard = span.enter();

    let mut module = parser.parse(modname)?;
    debug!(decls = module.decls.len(), "parsed");

    // make sure every imported module is executed before this one
    let mut deps = AHashSet::new();
    for decl in &module.decls {
        if let ast::Decl::Import { modname: dep, .. } = decl {
            if !PRELOADED.contains(&dep.as_str()) && deps.insert(dep.clone()) {
                load_recursive(vm, parser, dep, visiting)?;
            }
        }
    }

    analyze_module(vm, &mut module)?;
    run_module(vm, &module)?;
    visiting.pop();
    Ok(())
}

/// The whole pipeline: load the main module (and transitively everything
/// it imports), then redshift every red function.
pub fn compile(
    vm: &mut Vm,
    parser: &mut dyn SourceParser,
    main: &str,
    opts: CompilerOpts,
) -> SpyResult<ModuleId> {
    let module_id = load_module(vm, parser, main)?;
    vm.redshift(opts.error_mode)?;
    Ok(module_id)
}

/// A [`SourceParser`] over a fixed set of pre-built module ASTs, for
/// hosts (and tests) that drive the parser themselves.
#[derive(Default)]
pub struct PrebuiltModules {
    modules: ahash::AHashMap<String, ast::Module>,
}

impl PrebuiltModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: ast::Module) {
        self.modules.insert(module.name.clone(), module);
    }
}

impl SourceParser for PrebuiltModules {
    fn parse(&mut self, modname: &str) -> SpyResult<ast::Module> {
        self.modules.get(modname).cloned().ok_or_else(|| {
            SpyError::new(
                ErrorKind::ImportError,
                format!("cannot import `{modname}`: module not found"),
            )
        })
    }
}
