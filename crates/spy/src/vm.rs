//! The VM: owner of every arena and registry in the core.
//!
//! There are no process-wide singletons; the `Vm` is threaded as an
//! explicit `&mut` context through every evaluator call. All objects live
//! for the life of the VM — nothing is ever reclaimed.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use tracing::debug;

use crate::builtins::Builtins;
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::function::{BuiltinImpl, FuncData, FuncType};
use crate::location::Loc;
use crate::object::{CellId, ConstKey, FuncId, ModuleId, TypeId, WObject};
use crate::operators::multimethod::MultiMethodTable;
use crate::opspec::{MetaArg, OpSpec};
use crate::symtable::Color;
use crate::types::{PyClass, WType};

/// A blue namespace: one SPy module.
#[derive(Debug, Clone)]
pub struct ModuleData {
    pub name: String,
    pub filepath: Option<String>,
    pub items: IndexMap<Fqn, WObject>,
}

/// Indirection for a mutable module-level binding, so assignments remain
/// possible after redshift freezes all blue globals.
#[derive(Debug, Clone)]
pub struct CellData {
    pub fqn: Fqn,
    pub w_val: WObject,
}

/// Error mode of the redshift pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    /// Static errors abort compilation.
    Eager,
    /// Static errors inside red code become residual `raise` statements
    /// plus warnings.
    Lazy,
}

#[derive(Debug)]
pub struct Vm {
    types: Vec<WType>,
    funcs: Vec<FuncData>,
    modules: Vec<ModuleData>,
    cells: Vec<CellData>,

    pub modules_w: IndexMap<String, ModuleId>,
    pub globals_w: IndexMap<Fqn, WObject>,
    unique_fqns: AHashSet<Fqn>,

    fqn_types: AHashMap<Fqn, TypeId>,
    /// Reverse map driving `make_fqn_const` idempotence.
    const_fqns: AHashMap<ConstKey, Fqn>,
    /// `list[T]` instantiation cache.
    list_types: AHashMap<TypeId, TypeId>,
    /// Structural cache of minted function types.
    functype_types: Vec<(Rc<FuncType>, TypeId)>,
    /// Uniqueness table encoding qualifier brackets in C names.
    qualifier_ids: IndexMap<Fqn, usize>,
    /// Memoized results of blue plain calls, so generic instantiation is
    /// idempotent.
    blue_cache: AHashMap<(FuncId, Vec<ConstKey>), WObject>,
    /// Implicit-conversion lattice: (from, to) -> conversion function.
    pub(crate) conv_table: AHashMap<(TypeId, TypeId), FuncId>,

    pub mm: MultiMethodTable,
    pub b: Builtins,
    warnings: Vec<SpyError>,
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Self {
            types: Vec::new(),
            funcs: Vec::new(),
            modules: Vec::new(),
            cells: Vec::new(),
            modules_w: IndexMap::new(),
            globals_w: IndexMap::new(),
            unique_fqns: AHashSet::new(),
            fqn_types: AHashMap::new(),
            const_fqns: AHashMap::new(),
            list_types: AHashMap::new(),
            functype_types: Vec::new(),
            qualifier_ids: IndexMap::new(),
            blue_cache: AHashMap::new(),
            conv_table: AHashMap::new(),
            mm: MultiMethodTable::new(),
            b: Builtins::placeholder(),
            warnings: Vec::new(),
        };
        crate::builtins::register_builtins(&mut vm);
        vm
    }

    // ==== arenas ====

    pub fn add_type(&mut self, w_type: WType) -> TypeId {
        let id = TypeId::new(self.types.len());
        self.fqn_types.insert(w_type.fqn.clone(), id);
        self.types.push(w_type);
        id
    }

    pub fn type_(&self, id: TypeId) -> &WType {
        &self.types[id.index()]
    }

    pub fn type_mut(&mut self, id: TypeId) -> &mut WType {
        &mut self.types[id.index()]
    }

    pub fn lookup_type(&self, fqn: &Fqn) -> Option<TypeId> {
        self.fqn_types.get(fqn).copied()
    }

    pub fn add_func(&mut self, func: FuncData) -> FuncId {
        // mint the signature's type eagerly so dynamic_type stays total
        let functype = func.functype();
        self.functype_type(&functype);
        let id = FuncId::new(self.funcs.len());
        self.funcs.push(func);
        id
    }

    pub fn func_data(&self, id: FuncId) -> &FuncData {
        &self.funcs[id.index()]
    }

    pub fn func_data_mut(&mut self, id: FuncId) -> &mut FuncData {
        &mut self.funcs[id.index()]
    }

    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    pub fn add_cell(&mut self, fqn: Fqn, w_val: WObject) -> CellId {
        let id = CellId::new(self.cells.len());
        self.cells.push(CellData { fqn, w_val });
        id
    }

    pub fn cell(&self, id: CellId) -> &CellData {
        &self.cells[id.index()]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut CellData {
        &mut self.cells[id.index()]
    }

    pub fn register_module(&mut self, name: &str, filepath: Option<String>) -> ModuleId {
        let id = ModuleId::new(self.modules.len());
        self.modules.push(ModuleData {
            name: name.to_owned(),
            filepath,
            items: IndexMap::new(),
        });
        self.modules_w.insert(name.to_owned(), id);
        id
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id.index()]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleData {
        &mut self.modules[id.index()]
    }

    pub fn lookup_module(&self, name: &str) -> Option<ModuleId> {
        self.modules_w.get(name).copied()
    }

    // ==== FQN registry ====

    /// Returns `base` if unused, else the first `base#N` that is.
    pub fn get_unique_fqn(&mut self, base: &Fqn) -> Fqn {
        if self.unique_fqns.insert(base.clone()) {
            return base.clone();
        }
        let mut n = 1;
        loop {
            let candidate = base.with_suffix(n);
            if self.unique_fqns.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Registers a named object in the flat global table.
    ///
    /// # Panics
    /// Panics if the FQN is already bound; names must go through
    /// [`Vm::get_unique_fqn`] first.
    pub fn add_global(&mut self, fqn: Fqn, w_val: WObject) {
        self.unique_fqns.insert(fqn.clone());
        let prev = self.globals_w.insert(fqn.clone(), w_val);
        assert!(prev.is_none(), "global `{fqn}` registered twice");
    }

    pub fn lookup_global(&self, fqn: &Fqn) -> Option<&WObject> {
        self.globals_w.get(fqn)
    }

    /// Stores into a mutable (cell-backed) global.
    pub fn store_global(&mut self, fqn: &Fqn, w_val: WObject) -> SpyResult<()> {
        match self.globals_w.get(fqn) {
            Some(WObject::Cell(cell_id)) => {
                self.cells[cell_id.index()].w_val = w_val;
                Ok(())
            }
            Some(_) => Err(SpyError::new(
                ErrorKind::PanicError,
                format!("global `{fqn}` is frozen"),
            )),
            None => Err(SpyError::new(
                ErrorKind::NameError,
                format!("no global named `{fqn}`"),
            )),
        }
    }

    /// Assigns a unique FQN to an arbitrary blue value so that redshift can
    /// emit it as an `FQNConst`. Idempotent.
    pub fn make_fqn_const(&mut self, w_val: &WObject) -> Fqn {
        // objects which already carry their own name keep it
        match w_val {
            WObject::Type(id) => {
                let fqn = self.type_(*id).fqn.clone();
                self.ensure_global(&fqn, w_val);
                return fqn;
            }
            WObject::Func(id) => {
                let fqn = self.func_data(*id).fqn();
                self.ensure_global(&fqn, w_val);
                return fqn;
            }
            WObject::Cell(id) => return self.cell(*id).fqn.clone(),
            WObject::Module(id) => {
                let fqn = Fqn::from_parts([self.module(*id).name.as_str()]);
                self.ensure_global(&fqn, w_val);
                return fqn;
            }
            _ => {}
        }
        let key = w_val.const_key();
        if let Some(fqn) = self.const_fqns.get(&key) {
            return fqn.clone();
        }
        let type_name = {
            let w_type = self.dynamic_type(w_val);
            self.type_(w_type).fqn.symbol_name().to_owned()
        };
        let base = Fqn::from_parts(["const", &type_name]);
        let fqn = self.get_unique_fqn(&base);
        self.globals_w.insert(fqn.clone(), w_val.clone());
        self.const_fqns.insert(key, fqn.clone());
        fqn
    }

    /// Pre-binds the FQN of a well-known constant (e.g. the empty-list
    /// singleton) so `make_fqn_const` reuses it.
    pub(crate) fn prime_const_fqn(&mut self, w_val: &WObject, fqn: Fqn) {
        self.const_fqns.insert(w_val.const_key(), fqn);
    }

    fn ensure_global(&mut self, fqn: &Fqn, w_val: &WObject) {
        if !self.globals_w.contains_key(fqn) {
            self.unique_fqns.insert(fqn.clone());
            self.globals_w.insert(fqn.clone(), w_val.clone());
        }
    }

    /// The C identifier of an FQN; qualifier brackets encode as decimal
    /// indices into the VM's uniqueness table.
    pub fn c_name_of(&mut self, fqn: &Fqn) -> String {
        let qualifier_ids = &mut self.qualifier_ids;
        fqn.c_name_indexed(&mut |q| qualifier_ids.insert_full(q.clone(), 0).0)
    }

    // ==== wrapping and unwrapping primitives ====

    pub fn wrap_const_value(&self, value: &crate::ast::ConstValue) -> WObject {
        match value {
            crate::ast::ConstValue::None => WObject::None,
            crate::ast::ConstValue::Bool(b) => WObject::Bool(*b),
            crate::ast::ConstValue::I32(x) => WObject::I32(*x),
            crate::ast::ConstValue::F64(x) => WObject::F64(*x),
        }
    }

    pub fn unwrap_i32(&self, w_val: &WObject) -> SpyResult<i32> {
        w_val.as_i32().ok_or_else(|| self.unwrap_error("i32", w_val))
    }

    pub fn unwrap_f64(&self, w_val: &WObject) -> SpyResult<f64> {
        match w_val {
            WObject::F64(x) => Ok(*x),
            _ => Err(self.unwrap_error("f64", w_val)),
        }
    }

    pub fn unwrap_bool(&self, w_val: &WObject) -> SpyResult<bool> {
        w_val
            .as_bool()
            .ok_or_else(|| self.unwrap_error("bool", w_val))
    }

    pub fn unwrap_str(&self, w_val: &WObject) -> SpyResult<Rc<str>> {
        match w_val {
            WObject::Str(s) => Ok(Rc::clone(s)),
            _ => Err(self.unwrap_error("str", w_val)),
        }
    }

    fn unwrap_error(&self, expected: &str, w_val: &WObject) -> SpyError {
        let got = self.type_(self.dynamic_type(w_val)).human_name();
        SpyError::new(
            ErrorKind::TypeError,
            format!("expected `{expected}`, got `{got}`"),
        )
    }

    pub fn is_true(&self, w_val: &WObject) -> SpyResult<bool> {
        self.unwrap_bool(w_val)
    }

    // ==== types ====

    /// The dynamic type of a value.
    pub fn dynamic_type(&self, w_val: &WObject) -> TypeId {
        match w_val {
            WObject::None => self.b.w_none_type,
            WObject::Bool(_) => self.b.w_bool,
            WObject::I8(_) => self.b.w_i8,
            WObject::U8(_) => self.b.w_u8,
            WObject::I32(_) => self.b.w_i32,
            WObject::F64(_) => self.b.w_f64,
            WObject::Str(_) => self.b.w_str,
            WObject::Tuple(_) => self.b.w_tuple,
            WObject::LocVal(_) => self.b.w_loc,
            WObject::Type(_) => self.b.w_type,
            WObject::Module(_) => self.b.w_module,
            WObject::Cell(id) => self.dynamic_type(&self.cell(*id).w_val.clone()),
            WObject::EmptyList => self.b.w_empty_list,
            WObject::OpSpecVal(_) => self.b.w_opspec,
            WObject::MetaArgVal(_) => self.b.w_metaarg,
            WObject::Exception(exc) => self
                .b
                .exception_type(exc.kind)
                .unwrap_or(self.b.w_exception),
            WObject::List(list) => list.w_type,
            WObject::Instance(instance) => instance.w_type,
            WObject::Func(id) => {
                // function types are minted lazily; a missing entry means
                // the function was registered outside the VM, which cannot
                // happen
                let functype = self.func_data(*id).functype();
                self.lookup_functype_type(&functype)
                    .expect("functype type not minted")
            }
        }
    }

    fn lookup_functype_type(&self, functype: &Rc<FuncType>) -> Option<TypeId> {
        self.functype_types
            .iter()
            .find(|(ft, _)| ft == functype)
            .map(|(_, id)| *id)
    }

    /// The `WType` wrapping a function signature; minted once per distinct
    /// signature.
    pub fn functype_type(&mut self, functype: &Rc<FuncType>) -> TypeId {
        if let Some(id) = self.lookup_functype_type(functype) {
            return id;
        }
        let head = match (functype.color, functype.kind) {
            (Color::Red, _) => "def",
            (Color::Blue, crate::ast::FuncKind::Plain) => "bluedef",
            (Color::Blue, crate::ast::FuncKind::Metafunc) => "metafunc",
            (Color::Blue, crate::ast::FuncKind::Generic) => "genericdef",
        };
        let mut quals: Vec<Fqn> = functype
            .params
            .iter()
            .map(|p| self.type_(p.w_type).fqn.clone())
            .collect();
        quals.push(self.type_(functype.w_restype).fqn.clone());
        let base = Fqn::from_parts(["builtins", head]).with_qualifiers(quals);
        let fqn = self.get_unique_fqn(&base);
        let mut w_type = WType::new(fqn, PyClass::Func);
        w_type.functype = Some(Rc::clone(functype));
        let id = self.add_type(w_type);
        self.functype_types.push((Rc::clone(functype), id));
        id
    }

    /// The nearly-flat type lattice: `a | a == a`, `dynamic` absorbs,
    /// everything else unifies to `object`.
    pub fn union_type(&self, w_a: TypeId, w_b: TypeId) -> TypeId {
        if w_a == w_b {
            return w_a;
        }
        if w_a == self.b.w_dynamic || w_b == self.b.w_dynamic {
            return self.b.w_dynamic;
        }
        self.b.w_object
    }

    /// `list[T]`, minted on first instantiation together with its method
    /// dictionary.
    pub fn make_list_type(&mut self, w_itemtype: TypeId) -> TypeId {
        if let Some(id) = self.list_types.get(&w_itemtype) {
            return *id;
        }
        let item_fqn = self.type_(w_itemtype).fqn.clone();
        let fqn = Fqn::from_parts(["builtins", "list"]).with_qualifiers(vec![item_fqn]);
        let mut w_type = WType::new(fqn.clone(), PyClass::List);
        w_type.itemtype_w = Some(w_itemtype);
        let id = self.add_type(w_type);
        self.add_global(fqn, WObject::Type(id));
        crate::builtins::define_list_methods(self, id);
        self.list_types.insert(w_itemtype, id);
        id
    }

    // ==== calls ====

    /// Calls a function directly, without operator dispatch.
    pub fn fast_call(&mut self, w_func: FuncId, args_w: &[WObject]) -> SpyResult<WObject> {
        let func = self.func_data(w_func).clone();
        match &func {
            FuncData::Builtin(builtin) => match builtin.imp {
                BuiltinImpl::Host(host_fn) => host_fn(self, args_w),
                BuiltinImpl::HostCtx(ctx, host_fn) => host_fn(self, ctx, args_w),
                BuiltinImpl::Meta(_) => Err(SpyError::new(
                    ErrorKind::TypeError,
                    format!(
                        "`{}` is a metafunction and cannot be called with values",
                        builtin.fqn
                    ),
                )),
            },
            FuncData::Adapter(adapter) => {
                let mut real_args_w = Vec::with_capacity(adapter.args.len());
                for spec in &adapter.args {
                    real_args_w.push(self.realize_adapter_arg(spec, args_w)?);
                }
                self.fast_call(adapter.w_func, &real_args_w)
            }
            FuncData::Ast(astfunc) => {
                let is_cacheable = astfunc.color() == Color::Blue
                    && astfunc.functype.kind == crate::ast::FuncKind::Plain;
                let cache_key = is_cacheable.then(|| {
                    let keys: Vec<ConstKey> = args_w.iter().map(WObject::const_key).collect();
                    (w_func, keys)
                });
                if let Some(key) = &cache_key {
                    if let Some(w_res) = self.blue_cache.get(key) {
                        return Ok(w_res.clone());
                    }
                }
                let w_res = crate::frame::run_astfunc(self, astfunc, args_w)?;
                if let Some(key) = cache_key {
                    self.blue_cache.insert(key, w_res.clone());
                }
                Ok(w_res)
            }
        }
    }

    fn realize_adapter_arg(
        &mut self,
        spec: &crate::function::ArgSpec,
        args_w: &[WObject],
    ) -> SpyResult<WObject> {
        match spec {
            crate::function::ArgSpec::Arg(i) => Ok(args_w[*i].clone()),
            crate::function::ArgSpec::Const(w_val, _) => Ok(w_val.clone()),
            crate::function::ArgSpec::Convert { w_conv, arg } => {
                let w_arg = self.realize_adapter_arg(arg, args_w)?;
                self.fast_call(*w_conv, &[w_arg])
            }
        }
    }

    /// Calls a blue metafunction with MetaArgs, yielding an OpSpec.
    pub fn fast_metacall(
        &mut self,
        w_func: FuncId,
        loc: &Loc,
        args_wm: &[MetaArg],
    ) -> SpyResult<OpSpec> {
        let func = self.func_data(w_func).clone();
        match &func {
            FuncData::Builtin(builtin) => match builtin.imp {
                BuiltinImpl::Meta(meta_fn) => meta_fn(self, loc, args_wm),
                BuiltinImpl::Host(_) | BuiltinImpl::HostCtx(_, _) => Err(SpyError::new(
                    ErrorKind::TypeError,
                    format!("`{}` is not a metafunction", builtin.fqn),
                )),
            },
            FuncData::Ast(astfunc) => {
                if astfunc.functype.kind != crate::ast::FuncKind::Metafunc {
                    return Err(SpyError::new(
                        ErrorKind::TypeError,
                        format!("`{}` is not a metafunction", astfunc.fqn),
                    ));
                }
                let args_w: Vec<WObject> = args_wm
                    .iter()
                    .map(|wm| WObject::MetaArgVal(Rc::new(wm.clone())))
                    .collect();
                let w_res = crate::frame::run_astfunc(self, astfunc, &args_w)?;
                match w_res {
                    WObject::OpSpecVal(opspec) => Ok((*opspec).clone()),
                    other => Err(SpyError::new(
                        ErrorKind::TypeError,
                        format!(
                            "metafunction `{}` must return an OpSpec, got `{}`",
                            astfunc.fqn,
                            self.type_(self.dynamic_type(&other)).human_name()
                        ),
                    )),
                }
            }
            FuncData::Adapter(_) => Err(SpyError::new(
                ErrorKind::TypeError,
                "adapters are not metafunctions",
            )),
        }
    }

    // ==== warnings & redshift orchestration ====

    pub fn emit_warning(&mut self, err: SpyError) {
        debug!(warning = %err, "emitting redshift warning");
        self.warnings.push(err);
    }

    pub fn take_warnings(&mut self) -> Vec<SpyError> {
        std::mem::take(&mut self.warnings)
    }

    /// Redshifts every red, not-yet-redshifted AST function registered so
    /// far and rebinds its FQN to the residual function.
    pub fn redshift(&mut self, error_mode: ErrorMode) -> SpyResult<()> {
        let mut i = 0;
        // redshift can register further functions; iterate by index
        while i < self.funcs.len() {
            let w_func = FuncId::new(i);
            i += 1;
            let is_red_astfunc = matches!(
                self.func_data(w_func),
                FuncData::Ast(astfunc)
                    if astfunc.color() == Color::Red
                        && !astfunc.redshifted
                        && astfunc.redshifted_into.is_none()
            );
            if is_red_astfunc {
                self.redshift_func(w_func, error_mode)?;
            }
        }
        Ok(())
    }

    /// Redshifts one function and rebinds its FQN to the new one.
    pub fn redshift_func(&mut self, w_func: FuncId, error_mode: ErrorMode) -> SpyResult<FuncId> {
        let astfunc = match self.func_data(w_func) {
            FuncData::Ast(astfunc) => astfunc.clone(),
            _ => {
                return Err(SpyError::new(
                    ErrorKind::PanicError,
                    "can only redshift AST functions",
                ))
            }
        };
        debug!(fqn = %astfunc.fqn, "redshifting");
        let w_newfunc = crate::doppler::redshift(self, &astfunc, w_func, error_mode)?;
        let fqn = astfunc.fqn;
        let w_obj = WObject::Func(w_newfunc);
        if self.globals_w.contains_key(&fqn) {
            self.globals_w.insert(fqn.clone(), w_obj.clone());
        }
        for module in &mut self.modules {
            if module.items.contains_key(&fqn) {
                module.items.insert(fqn.clone(), w_obj.clone());
            }
        }
        Ok(w_newfunc)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
