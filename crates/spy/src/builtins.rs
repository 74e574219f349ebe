//! The `builtins` and `operator` modules: primitive types, the concrete
//! operator implementations registered in the multimethod table, the
//! implicit-conversion lattice, and the accessors minted for user types.

use std::rc::Rc;
use std::str::FromStr;

use ahash::AHashMap;

use crate::ast::FuncKind;
use crate::errors::{ErrorKind, SpyError, SpyResult};
use crate::fqn::Fqn;
use crate::function::{BuiltinCtx, BuiltinFunc, BuiltinImpl, FuncData, FuncParam, FuncType};
use crate::object::{ExceptionValue, FuncId, InstanceValue, ListValue, TypeId, WObject};
use crate::symtable::Color;
use crate::types::{PyClass, WType};
use crate::vm::Vm;

/// Pre-registered types and functions the rest of the core refers to by
/// name.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub w_object: TypeId,
    pub w_dynamic: TypeId,
    pub w_none_type: TypeId,
    pub w_bool: TypeId,
    pub w_i8: TypeId,
    pub w_u8: TypeId,
    pub w_i32: TypeId,
    pub w_f64: TypeId,
    pub w_str: TypeId,
    pub w_tuple: TypeId,
    pub w_loc: TypeId,
    pub w_type: TypeId,
    pub w_module: TypeId,
    pub w_exception: TypeId,
    pub w_empty_list: TypeId,
    pub w_opspec: TypeId,
    pub w_metaarg: TypeId,
    pub w_object_is: FuncId,
    pub w_object_isnot: FuncId,
    pub w_raise: FuncId,
    exception_types: AHashMap<ErrorKind, TypeId>,
}

impl Builtins {
    /// A zeroed table, replaced during `Vm::new` before anything runs.
    pub(crate) fn placeholder() -> Self {
        let t0 = TypeId::new(0);
        let f0 = FuncId::new(0);
        Self {
            w_object: t0,
            w_dynamic: t0,
            w_none_type: t0,
            w_bool: t0,
            w_i8: t0,
            w_u8: t0,
            w_i32: t0,
            w_f64: t0,
            w_str: t0,
            w_tuple: t0,
            w_loc: t0,
            w_type: t0,
            w_module: t0,
            w_exception: t0,
            w_empty_list: t0,
            w_opspec: t0,
            w_metaarg: t0,
            w_object_is: f0,
            w_object_isnot: f0,
            w_raise: f0,
            exception_types: AHashMap::new(),
        }
    }

    pub fn exception_type(&self, kind: ErrorKind) -> Option<TypeId> {
        self.exception_types.get(&kind).copied()
    }
}

fn add_builtin_type(vm: &mut Vm, name: &str, pyclass: PyClass) -> TypeId {
    let fqn = Fqn::from_parts(["builtins", name]);
    let id = vm.add_type(WType::new(fqn.clone(), pyclass));
    vm.add_global(fqn.clone(), WObject::Type(id));
    let module_id = vm.lookup_module("builtins").expect("builtins module");
    vm.module_mut(module_id)
        .items
        .insert(fqn, WObject::Type(id));
    id
}

fn reg_func(
    vm: &mut Vm,
    modname: &str,
    name: &str,
    params: &[TypeId],
    w_restype: TypeId,
    pure: bool,
    imp: BuiltinImpl,
) -> FuncId {
    let fqn = Fqn::from_parts([modname, name]);
    let functype = Rc::new(FuncType::new(
        params.iter().copied().map(FuncParam::simple).collect(),
        w_restype,
        Color::Red,
        FuncKind::Plain,
    ));
    let w_func = vm.add_func(FuncData::Builtin(BuiltinFunc {
        fqn: fqn.clone(),
        functype,
        pure,
        imp,
        def_loc: None,
    }));
    vm.add_global(fqn.clone(), WObject::Func(w_func));
    if let Some(module_id) = vm.lookup_module(modname) {
        vm.module_mut(module_id)
            .items
            .insert(fqn, WObject::Func(w_func));
    }
    w_func
}

// ==== generic host implementations ====
//
// One implementation function can back several registered builtins
// (`operator::i8_add`, `operator::i32_add`, ...): the registered functype
// constrains the operand types and typecheck inserts conversions, so by
// the time a host fn runs its arguments have the advertised variants.

fn zero_division(op: &str) -> SpyError {
    SpyError::new(ErrorKind::ZeroDivisionError, format!("{op} by zero"))
}

fn host_add(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a.wrapping_add(*b)),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a.wrapping_add(*b)),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a.wrapping_add(*b)),
        (WObject::F64(a), WObject::F64(b)) => WObject::F64(a + b),
        (WObject::Str(a), WObject::Str(b)) => WObject::str(format!("{a}{b}")),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for add")),
    })
}

fn host_sub(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a.wrapping_sub(*b)),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a.wrapping_sub(*b)),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a.wrapping_sub(*b)),
        (WObject::F64(a), WObject::F64(b)) => WObject::F64(a - b),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for sub")),
    })
}

fn host_mul(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a.wrapping_mul(*b)),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a.wrapping_mul(*b)),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a.wrapping_mul(*b)),
        (WObject::F64(a), WObject::F64(b)) => WObject::F64(a * b),
        (WObject::Str(a), WObject::I32(n)) => WObject::str(a.repeat((*n).max(0) as usize)),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for mul")),
    })
}

fn host_div(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => {
            WObject::I8(a.checked_div(*b).ok_or_else(|| zero_division("division"))?)
        }
        (WObject::U8(a), WObject::U8(b)) => {
            WObject::U8(a.checked_div(*b).ok_or_else(|| zero_division("division"))?)
        }
        (WObject::I32(a), WObject::I32(b)) => {
            WObject::I32(a.checked_div(*b).ok_or_else(|| zero_division("division"))?)
        }
        (WObject::F64(a), WObject::F64(b)) => WObject::F64(a / b),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for div")),
    })
}

fn host_floordiv(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(
            a.checked_div_euclid(*b)
                .ok_or_else(|| zero_division("division"))?,
        ),
        (WObject::U8(a), WObject::U8(b)) => {
            WObject::U8(a.checked_div(*b).ok_or_else(|| zero_division("division"))?)
        }
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(
            a.checked_div_euclid(*b)
                .ok_or_else(|| zero_division("division"))?,
        ),
        (WObject::F64(a), WObject::F64(b)) => WObject::F64((a / b).floor()),
        _ => {
            return Err(SpyError::new(
                ErrorKind::PanicError,
                "bad operands for floordiv",
            ))
        }
    })
}

fn host_mod(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(
            a.checked_rem_euclid(*b)
                .ok_or_else(|| zero_division("modulo"))?,
        ),
        (WObject::U8(a), WObject::U8(b)) => {
            WObject::U8(a.checked_rem(*b).ok_or_else(|| zero_division("modulo"))?)
        }
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(
            a.checked_rem_euclid(*b)
                .ok_or_else(|| zero_division("modulo"))?,
        ),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for mod")),
    })
}

fn host_lshift(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a.wrapping_shl(*b as u32)),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a.wrapping_shl(u32::from(*b))),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a.wrapping_shl(*b as u32)),
        _ => {
            return Err(SpyError::new(
                ErrorKind::PanicError,
                "bad operands for lshift",
            ))
        }
    })
}

fn host_rshift(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a.wrapping_shr(*b as u32)),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a.wrapping_shr(u32::from(*b))),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a.wrapping_shr(*b as u32)),
        _ => {
            return Err(SpyError::new(
                ErrorKind::PanicError,
                "bad operands for rshift",
            ))
        }
    })
}

fn host_bitand(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a & b),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a & b),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a & b),
        (WObject::Bool(a), WObject::Bool(b)) => WObject::Bool(a & b),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for and")),
    })
}

fn host_bitor(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a | b),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a | b),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a | b),
        (WObject::Bool(a), WObject::Bool(b)) => WObject::Bool(a | b),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for or")),
    })
}

fn host_bitxor(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => WObject::I8(a ^ b),
        (WObject::U8(a), WObject::U8(b)) => WObject::U8(a ^ b),
        (WObject::I32(a), WObject::I32(b)) => WObject::I32(a ^ b),
        (WObject::Bool(a), WObject::Bool(b)) => WObject::Bool(a ^ b),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operands for xor")),
    })
}

fn host_eq(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(args[0] == args[1]))
}

fn host_ne(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(args[0] != args[1]))
}

fn host_cmp(args: &[WObject]) -> SpyResult<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match (&args[0], &args[1]) {
        (WObject::I8(a), WObject::I8(b)) => Ok(a.cmp(b)),
        (WObject::U8(a), WObject::U8(b)) => Ok(a.cmp(b)),
        (WObject::I32(a), WObject::I32(b)) => Ok(a.cmp(b)),
        (WObject::Bool(a), WObject::Bool(b)) => Ok(a.cmp(b)),
        (WObject::F64(a), WObject::F64(b)) => {
            Ok(a.partial_cmp(b).unwrap_or(Ordering::Greater))
        }
        _ => Err(SpyError::new(ErrorKind::PanicError, "bad operands for cmp")),
    }
}

fn host_lt(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(host_cmp(args)?.is_lt()))
}

fn host_le(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(host_cmp(args)?.is_le()))
}

fn host_gt(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(host_cmp(args)?.is_gt()))
}

fn host_ge(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(host_cmp(args)?.is_ge()))
}

fn host_neg(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(match &args[0] {
        WObject::I8(a) => WObject::I8(a.wrapping_neg()),
        WObject::I32(a) => WObject::I32(a.wrapping_neg()),
        WObject::F64(a) => WObject::F64(-a),
        _ => return Err(SpyError::new(ErrorKind::PanicError, "bad operand for neg")),
    })
}

/// Identity comparison, the reference-equality fallback target.
fn host_is(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(args[0].const_key() == args[1].const_key()))
}

fn host_isnot(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    Ok(WObject::Bool(args[0].const_key() != args[1].const_key()))
}

fn host_i8_to_i32(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    match &args[0] {
        WObject::I8(a) => Ok(WObject::I32(i32::from(*a))),
        _ => Err(SpyError::new(ErrorKind::PanicError, "expected i8")),
    }
}

fn host_u8_to_i32(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    match &args[0] {
        WObject::U8(a) => Ok(WObject::I32(i32::from(*a))),
        _ => Err(SpyError::new(ErrorKind::PanicError, "expected u8")),
    }
}

fn host_i32_to_f64(_vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    match &args[0] {
        WObject::I32(a) => Ok(WObject::F64(f64::from(*a))),
        _ => Err(SpyError::new(ErrorKind::PanicError, "expected i32")),
    }
}

/// Downcast of a `dynamic` value to the concrete target type baked into
/// the builtin. The actual type is only checkable at run time.
fn host_dynamic_downcast(vm: &mut Vm, ctx: BuiltinCtx, args: &[WObject]) -> SpyResult<WObject> {
    let BuiltinCtx::Type(w_target) = ctx else {
        return Err(SpyError::new(ErrorKind::PanicError, "bad downcast ctx"));
    };
    let w_got = vm.dynamic_type(&args[0]);
    if crate::operators::convop::is_assignable(vm, w_target, w_got) {
        Ok(args[0].clone())
    } else {
        let exp = vm.type_(w_target).human_name();
        let got = vm.type_(w_got).human_name();
        Err(SpyError::new(
            ErrorKind::TypeError,
            format!("Invalid cast. Expected `{exp}`, got `{got}`"),
        ))
    }
}

/// The conversion function casting `dynamic` down to `w_target`, minted on
/// first use and cached in the conversion table so residual FQNs stay
/// stable.
pub fn dynamic_downcast_func(vm: &mut Vm, w_target: TypeId) -> FuncId {
    let w_dynamic = vm.b.w_dynamic;
    if let Some(w_conv) = vm.conv_table.get(&(w_dynamic, w_target)) {
        return *w_conv;
    }
    let target_fqn = vm.type_(w_target).fqn.clone();
    let base = Fqn::from_parts(["operator", "downcast"]).with_qualifiers(vec![target_fqn]);
    let fqn = vm.get_unique_fqn(&base);
    let functype = Rc::new(FuncType::new(
        vec![FuncParam::simple(w_dynamic)],
        w_target,
        Color::Red,
        FuncKind::Plain,
    ));
    let w_conv = vm.add_func(FuncData::Builtin(BuiltinFunc {
        fqn: fqn.clone(),
        functype,
        pure: true,
        imp: BuiltinImpl::HostCtx(BuiltinCtx::Type(w_target), host_dynamic_downcast),
        def_loc: None,
    }));
    vm.add_global(fqn.clone(), WObject::Func(w_conv));
    if let Some(module_id) = vm.lookup_module("operator") {
        vm.module_mut(module_id)
            .items
            .insert(fqn, WObject::Func(w_conv));
    }
    vm.conv_table.insert((w_dynamic, w_target), w_conv);
    w_conv
}

/// `Exception.__new__(cls, message)`: the kind comes from the class name.
fn host_exception_new(vm: &mut Vm, args: &[WObject]) -> SpyResult<WObject> {
    let w_cls = args[0]
        .as_type()
        .ok_or_else(|| SpyError::new(ErrorKind::PanicError, "expected an exception type"))?;
    let name = vm.type_(w_cls).fqn.symbol_name().to_owned();
    let kind = ErrorKind::from_str(&name).unwrap_or(ErrorKind::Exception);
    let message = vm.unwrap_str(&args[1])?;
    Ok(WObject::Exception(Rc::new(ExceptionValue {
        kind,
        message: message.to_string(),
    })))
}

// ==== builtins minted per user type ====

fn host_struct_new(_vm: &mut Vm, ctx: BuiltinCtx, args: &[WObject]) -> SpyResult<WObject> {
    let BuiltinCtx::Type(w_type) = ctx else {
        return Err(SpyError::new(ErrorKind::PanicError, "bad constructor ctx"));
    };
    Ok(WObject::Instance(Rc::new(InstanceValue {
        w_type,
        fields_w: std::cell::RefCell::new(args.to_vec()),
    })))
}

fn host_field_get(_vm: &mut Vm, ctx: BuiltinCtx, args: &[WObject]) -> SpyResult<WObject> {
    let BuiltinCtx::Field(_, i) = ctx else {
        return Err(SpyError::new(ErrorKind::PanicError, "bad accessor ctx"));
    };
    match &args[0] {
        WObject::Instance(instance) => Ok(instance.fields_w.borrow()[i].clone()),
        _ => Err(SpyError::new(ErrorKind::PanicError, "expected an instance")),
    }
}

fn host_field_set(_vm: &mut Vm, ctx: BuiltinCtx, args: &[WObject]) -> SpyResult<WObject> {
    let BuiltinCtx::Field(_, i) = ctx else {
        return Err(SpyError::new(ErrorKind::PanicError, "bad accessor ctx"));
    };
    match &args[0] {
        WObject::Instance(instance) => {
            instance.fields_w.borrow_mut()[i] = args[1].clone();
            Ok(WObject::None)
        }
        _ => Err(SpyError::new(ErrorKind::PanicError, "expected an instance")),
    }
}

fn host_list_new(_vm: &mut Vm, ctx: BuiltinCtx, _args: &[WObject]) -> SpyResult<WObject> {
    let BuiltinCtx::Type(w_type) = ctx else {
        return Err(SpyError::new(ErrorKind::PanicError, "bad list ctx"));
    };
    Ok(WObject::List(Rc::new(ListValue {
        w_type,
        items_w: Vec::new(),
    })))
}

fn host_list_push(_vm: &mut Vm, _ctx: BuiltinCtx, args: &[WObject]) -> SpyResult<WObject> {
    match &args[0] {
        WObject::List(list) => {
            let mut items_w = list.items_w.clone();
            items_w.push(args[1].clone());
            Ok(WObject::List(Rc::new(ListValue {
                w_type: list.w_type,
                items_w,
            })))
        }
        _ => Err(SpyError::new(ErrorKind::PanicError, "expected a list")),
    }
}

/// Mints a per-type builtin and binds it both as a global under the type's
/// namespace and in the type's method dictionary.
fn mint_type_func(
    vm: &mut Vm,
    w_type: TypeId,
    name: &str,
    params: Vec<TypeId>,
    w_restype: TypeId,
    color: Color,
    pure: bool,
    imp: BuiltinImpl,
) -> FuncId {
    let base = vm.type_(w_type).fqn.join(name);
    let fqn = vm.get_unique_fqn(&base);
    let functype = Rc::new(FuncType::new(
        params.into_iter().map(FuncParam::simple).collect(),
        w_restype,
        color,
        FuncKind::Plain,
    ));
    let w_func = vm.add_func(FuncData::Builtin(BuiltinFunc {
        fqn: fqn.clone(),
        functype,
        pure,
        imp,
        def_loc: None,
    }));
    vm.add_global(fqn, WObject::Func(w_func));
    vm.type_mut(w_type)
        .dict_w
        .insert(name.to_owned(), WObject::Func(w_func));
    w_func
}

/// Constructor and field accessors of a freshly-defined struct type.
pub fn define_struct_methods(vm: &mut Vm, w_type: TypeId) {
    let fields: Vec<(String, TypeId)> = vm
        .type_(w_type)
        .fields_w
        .iter()
        .map(|(name, w_ftype)| (name.clone(), *w_ftype))
        .collect();
    let field_types: Vec<TypeId> = fields.iter().map(|(_, t)| *t).collect();
    mint_type_func(
        vm,
        w_type,
        "__new__",
        field_types,
        w_type,
        Color::Red,
        true,
        BuiltinImpl::HostCtx(BuiltinCtx::Type(w_type), host_struct_new),
    );
    for (i, (name, w_ftype)) in fields.iter().enumerate() {
        mint_type_func(
            vm,
            w_type,
            &format!("__get_{name}__"),
            vec![w_type],
            *w_ftype,
            Color::Red,
            true,
            BuiltinImpl::HostCtx(BuiltinCtx::Field(w_type, i), host_field_get),
        );
        mint_type_func(
            vm,
            w_type,
            &format!("__set_{name}__"),
            vec![w_type, *w_ftype],
            vm.b.w_none_type,
            Color::Red,
            false,
            BuiltinImpl::HostCtx(BuiltinCtx::Field(w_type, i), host_field_set),
        );
    }
}

/// Constructor, payload accessor and the implicit wrap/unwrap conversions
/// of a typelift type.
pub fn define_lifted_methods(vm: &mut Vm, w_type: TypeId) {
    define_struct_methods(vm, w_type);
    let w_payload = vm.type_(w_type).fields_w.get("__ll__").copied();
    let Some(w_payload) = w_payload else {
        return;
    };
    vm.type_mut(w_type).itemtype_w = Some(w_payload);
    let w_lift = vm
        .type_(w_type)
        .lookup_func("__new__")
        .expect("just minted");
    let w_unlift = vm
        .type_(w_type)
        .lookup_func("__get___ll____")
        .expect("just minted");
    vm.conv_table.insert((w_payload, w_type), w_lift);
    vm.conv_table.insert((w_type, w_payload), w_unlift);
}

/// `__new__` and `_push` of a freshly-instantiated `list[T]` type.
pub fn define_list_methods(vm: &mut Vm, w_type: TypeId) {
    let w_item = vm.type_(w_type).itemtype_w.expect("list item type");
    mint_type_func(
        vm,
        w_type,
        "__new__",
        vec![],
        w_type,
        Color::Red,
        false,
        BuiltinImpl::HostCtx(BuiltinCtx::Type(w_type), host_list_new),
    );
    mint_type_func(
        vm,
        w_type,
        "_push",
        vec![w_type, w_item],
        w_type,
        Color::Red,
        false,
        BuiltinImpl::HostCtx(BuiltinCtx::Type(w_type), host_list_push),
    );
}

/// Builds the whole builtin world inside a fresh VM.
pub fn register_builtins(vm: &mut Vm) {
    vm.register_module("builtins", None);
    vm.register_module("operator", None);

    let w_object = add_builtin_type(vm, "object", PyClass::Object);
    let w_dynamic = add_builtin_type(vm, "dynamic", PyClass::Dynamic);
    let w_none_type = add_builtin_type(vm, "NoneType", PyClass::NoneType);
    let w_bool = add_builtin_type(vm, "bool", PyClass::Bool);
    let w_i8 = add_builtin_type(vm, "i8", PyClass::I8);
    let w_u8 = add_builtin_type(vm, "u8", PyClass::U8);
    let w_i32 = add_builtin_type(vm, "i32", PyClass::I32);
    let w_f64 = add_builtin_type(vm, "f64", PyClass::F64);
    let w_str = add_builtin_type(vm, "str", PyClass::Str);
    let w_tuple = add_builtin_type(vm, "tuple", PyClass::Tuple);
    let w_loc = add_builtin_type(vm, "Loc", PyClass::Loc);
    let w_type = add_builtin_type(vm, "type", PyClass::Type);
    let w_module = add_builtin_type(vm, "module", PyClass::Module);
    let w_empty_list = add_builtin_type(vm, "EmptyList", PyClass::EmptyList);
    let w_opspec = add_builtin_type(vm, "OpSpec", PyClass::OpSpec);
    let w_metaarg = add_builtin_type(vm, "MetaArg", PyClass::MetaArg);

    // exception types, each with its `__new__`
    let mut exception_types = AHashMap::new();
    let mut w_exception = TypeId::new(0);
    for kind in [
        ErrorKind::Exception,
        ErrorKind::StaticError,
        ErrorKind::TypeError,
        ErrorKind::ScopeError,
        ErrorKind::NameError,
        ErrorKind::ParseError,
        ErrorKind::ImportError,
        ErrorKind::ValueError,
        ErrorKind::IndexError,
        ErrorKind::ZeroDivisionError,
        ErrorKind::PanicError,
        ErrorKind::AssertionError,
        ErrorKind::KeyError,
        ErrorKind::Wip,
    ] {
        let name: &'static str = kind.into();
        let w_exc_type = add_builtin_type(vm, name, PyClass::Exception);
        if kind == ErrorKind::Exception {
            w_exception = w_exc_type;
        }
        exception_types.insert(kind, w_exc_type);
    }

    // partially fill the table now: the per-exception `__new__` and the
    // operator registrations below need the primitive ids
    vm.b = Builtins {
        w_object,
        w_dynamic,
        w_none_type,
        w_bool,
        w_i8,
        w_u8,
        w_i32,
        w_f64,
        w_str,
        w_tuple,
        w_loc,
        w_type,
        w_module,
        w_exception,
        w_empty_list,
        w_opspec,
        w_metaarg,
        w_object_is: FuncId::new(0),
        w_object_isnot: FuncId::new(0),
        w_raise: FuncId::new(0),
        exception_types: exception_types.clone(),
    };

    // the C backend can raise only blue exceptions, so `Exception(...)`
    // must fold at compile time: `__new__` is pure and blue
    for (_, w_exc_type) in exception_types {
        mint_type_func(
            vm,
            w_exc_type,
            "__new__",
            vec![w_type, w_str],
            w_exc_type,
            Color::Blue,
            true,
            BuiltinImpl::Host(host_exception_new),
        );
    }

    // the empty-list singleton
    let empty_list_fqn = Fqn::from_parts(["builtins", "empty_list"]);
    vm.add_global(empty_list_fqn.clone(), WObject::EmptyList);
    vm.prime_const_fqn(&WObject::EmptyList, empty_list_fqn);

    // ==== operator module ====

    type HostFn = fn(&mut Vm, &[WObject]) -> SpyResult<WObject>;

    let int_types = [("i8", w_i8), ("u8", w_u8), ("i32", w_i32)];
    for (tyname, w_ty) in int_types {
        let bin = |vm: &mut Vm, op: &str, f: HostFn| {
            reg_func(
                vm,
                "operator",
                &format!("{tyname}_{op}"),
                &[w_ty, w_ty],
                w_ty,
                true,
                BuiltinImpl::Host(f),
            )
        };
        let cmp = |vm: &mut Vm, op: &str, f: HostFn| {
            reg_func(
                vm,
                "operator",
                &format!("{tyname}_{op}"),
                &[w_ty, w_ty],
                w_bool,
                true,
                BuiltinImpl::Host(f),
            )
        };
        let w_add = bin(vm, "add", host_add);
        let w_sub = bin(vm, "sub", host_sub);
        let w_mul = bin(vm, "mul", host_mul);
        let w_div = bin(vm, "div", host_div);
        let w_floordiv = bin(vm, "floordiv", host_floordiv);
        let w_mod = bin(vm, "mod", host_mod);
        let w_lshift = bin(vm, "lshift", host_lshift);
        let w_rshift = bin(vm, "rshift", host_rshift);
        let w_and = bin(vm, "and", host_bitand);
        let w_or = bin(vm, "or", host_bitor);
        let w_xor = bin(vm, "xor", host_bitxor);
        let w_eq = cmp(vm, "eq", host_eq);
        let w_ne = cmp(vm, "ne", host_ne);
        let w_lt = cmp(vm, "lt", host_lt);
        let w_le = cmp(vm, "le", host_le);
        let w_gt = cmp(vm, "gt", host_gt);
        let w_ge = cmp(vm, "ge", host_ge);
        let w_neg = reg_func(
            vm,
            "operator",
            &format!("{tyname}_neg"),
            &[w_ty],
            w_ty,
            true,
            BuiltinImpl::Host(host_neg),
        );

        vm.mm.register("+", Some(w_ty), Some(w_ty), w_add);
        vm.mm.register("-", Some(w_ty), Some(w_ty), w_sub);
        vm.mm.register("*", Some(w_ty), Some(w_ty), w_mul);
        vm.mm.register("/", Some(w_ty), Some(w_ty), w_div);
        vm.mm.register("//", Some(w_ty), Some(w_ty), w_floordiv);
        vm.mm.register("%", Some(w_ty), Some(w_ty), w_mod);
        vm.mm.register("<<", Some(w_ty), Some(w_ty), w_lshift);
        vm.mm.register(">>", Some(w_ty), Some(w_ty), w_rshift);
        vm.mm.register("&", Some(w_ty), Some(w_ty), w_and);
        vm.mm.register("|", Some(w_ty), Some(w_ty), w_or);
        vm.mm.register("^", Some(w_ty), Some(w_ty), w_xor);
        vm.mm.register("==", Some(w_ty), Some(w_ty), w_eq);
        vm.mm.register("!=", Some(w_ty), Some(w_ty), w_ne);
        vm.mm.register("<", Some(w_ty), Some(w_ty), w_lt);
        vm.mm.register("<=", Some(w_ty), Some(w_ty), w_le);
        vm.mm.register(">", Some(w_ty), Some(w_ty), w_gt);
        vm.mm.register(">=", Some(w_ty), Some(w_ty), w_ge);
        vm.mm.register_unary("-", w_ty, w_neg);
    }

    // f64 ops
    {
        let bin = |vm: &mut Vm, op: &str, f: HostFn| {
            reg_func(
                vm,
                "operator",
                &format!("f64_{op}"),
                &[w_f64, w_f64],
                w_f64,
                true,
                BuiltinImpl::Host(f),
            )
        };
        let cmp = |vm: &mut Vm, op: &str, f: HostFn| {
            reg_func(
                vm,
                "operator",
                &format!("f64_{op}"),
                &[w_f64, w_f64],
                w_bool,
                true,
                BuiltinImpl::Host(f),
            )
        };
        let w_add = bin(vm, "add", host_add);
        let w_sub = bin(vm, "sub", host_sub);
        let w_mul = bin(vm, "mul", host_mul);
        let w_div = bin(vm, "div", host_div);
        let w_floordiv = bin(vm, "floordiv", host_floordiv);
        let w_eq = cmp(vm, "eq", host_eq);
        let w_ne = cmp(vm, "ne", host_ne);
        let w_lt = cmp(vm, "lt", host_lt);
        let w_le = cmp(vm, "le", host_le);
        let w_gt = cmp(vm, "gt", host_gt);
        let w_ge = cmp(vm, "ge", host_ge);
        let w_neg = reg_func(
            vm,
            "operator",
            "f64_neg",
            &[w_f64],
            w_f64,
            true,
            BuiltinImpl::Host(host_neg),
        );

        vm.mm.register("+", Some(w_f64), Some(w_f64), w_add);
        vm.mm.register("-", Some(w_f64), Some(w_f64), w_sub);
        vm.mm.register("*", Some(w_f64), Some(w_f64), w_mul);
        vm.mm.register("/", Some(w_f64), Some(w_f64), w_div);
        vm.mm.register("//", Some(w_f64), Some(w_f64), w_floordiv);
        vm.mm.register("==", Some(w_f64), Some(w_f64), w_eq);
        vm.mm.register("!=", Some(w_f64), Some(w_f64), w_ne);
        vm.mm.register("<", Some(w_f64), Some(w_f64), w_lt);
        vm.mm.register("<=", Some(w_f64), Some(w_f64), w_le);
        vm.mm.register(">", Some(w_f64), Some(w_f64), w_gt);
        vm.mm.register(">=", Some(w_f64), Some(w_f64), w_ge);
        vm.mm.register_unary("-", w_f64, w_neg);

        // mixed int/f64 ops resolve to the f64 implementation; typecheck
        // inserts the int-to-float conversion on the int side
        for (_, w_int) in int_types {
            for (token, w_impl) in [
                ("+", w_add),
                ("-", w_sub),
                ("*", w_mul),
                ("/", w_div),
                ("==", w_eq),
                ("!=", w_ne),
                ("<", w_lt),
                ("<=", w_le),
                (">", w_gt),
                (">=", w_ge),
            ] {
                vm.mm.register(token, Some(w_f64), Some(w_int), w_impl);
                vm.mm.register(token, Some(w_int), Some(w_f64), w_impl);
            }
        }
    }

    // str ops
    {
        let w_add = reg_func(
            vm,
            "operator",
            "str_add",
            &[w_str, w_str],
            w_str,
            true,
            BuiltinImpl::Host(host_add),
        );
        let w_mul = reg_func(
            vm,
            "operator",
            "str_mul",
            &[w_str, w_i32],
            w_str,
            true,
            BuiltinImpl::Host(host_mul),
        );
        let w_eq = reg_func(
            vm,
            "operator",
            "str_eq",
            &[w_str, w_str],
            w_bool,
            true,
            BuiltinImpl::Host(host_eq),
        );
        let w_ne = reg_func(
            vm,
            "operator",
            "str_ne",
            &[w_str, w_str],
            w_bool,
            true,
            BuiltinImpl::Host(host_ne),
        );
        vm.mm.register("+", Some(w_str), Some(w_str), w_add);
        vm.mm.register("*", Some(w_str), Some(w_i32), w_mul);
        vm.mm.register("==", Some(w_str), Some(w_str), w_eq);
        vm.mm.register("!=", Some(w_str), Some(w_str), w_ne);
    }

    // bool ops
    {
        let cmp = |vm: &mut Vm, op: &str, f: HostFn| {
            reg_func(
                vm,
                "operator",
                &format!("bool_{op}"),
                &[w_bool, w_bool],
                w_bool,
                true,
                BuiltinImpl::Host(f),
            )
        };
        let w_eq = cmp(vm, "eq", host_eq);
        let w_ne = cmp(vm, "ne", host_ne);
        let w_and = cmp(vm, "and", host_bitand);
        let w_or = cmp(vm, "or", host_bitor);
        let w_xor = cmp(vm, "xor", host_bitxor);
        let w_lt = cmp(vm, "lt", host_lt);
        let w_le = cmp(vm, "le", host_le);
        let w_gt = cmp(vm, "gt", host_gt);
        let w_ge = cmp(vm, "ge", host_ge);
        vm.mm.register("==", Some(w_bool), Some(w_bool), w_eq);
        vm.mm.register("!=", Some(w_bool), Some(w_bool), w_ne);
        vm.mm.register("&", Some(w_bool), Some(w_bool), w_and);
        vm.mm.register("|", Some(w_bool), Some(w_bool), w_or);
        vm.mm.register("^", Some(w_bool), Some(w_bool), w_xor);
        vm.mm.register("<", Some(w_bool), Some(w_bool), w_lt);
        vm.mm.register("<=", Some(w_bool), Some(w_bool), w_le);
        vm.mm.register(">", Some(w_bool), Some(w_bool), w_gt);
        vm.mm.register(">=", Some(w_bool), Some(w_bool), w_ge);
    }

    // identity comparison and raise
    let w_object_is = reg_func(
        vm,
        "operator",
        "is",
        &[w_object, w_object],
        w_bool,
        true,
        BuiltinImpl::Host(host_is),
    );
    let w_object_isnot = reg_func(
        vm,
        "operator",
        "isnot",
        &[w_object, w_object],
        w_bool,
        true,
        BuiltinImpl::Host(host_isnot),
    );
    let w_raise = reg_func(
        vm,
        "operator",
        "raise",
        &[w_str, w_str, w_str, w_i32],
        w_none_type,
        false,
        BuiltinImpl::Host(crate::operators::raiseop::raise_builtin),
    );

    // the implicit conversion lattice
    let w_i8_to_i32 = reg_func(
        vm,
        "operator",
        "i8_to_i32",
        &[w_i8],
        w_i32,
        true,
        BuiltinImpl::Host(host_i8_to_i32),
    );
    let w_u8_to_i32 = reg_func(
        vm,
        "operator",
        "u8_to_i32",
        &[w_u8],
        w_i32,
        true,
        BuiltinImpl::Host(host_u8_to_i32),
    );
    let w_i32_to_f64 = reg_func(
        vm,
        "operator",
        "i32_to_f64",
        &[w_i32],
        w_f64,
        true,
        BuiltinImpl::Host(host_i32_to_f64),
    );
    vm.conv_table.insert((w_i8, w_i32), w_i8_to_i32);
    vm.conv_table.insert((w_u8, w_i32), w_u8_to_i32);
    vm.conv_table.insert((w_i32, w_f64), w_i32_to_f64);

    vm.b.w_object_is = w_object_is;
    vm.b.w_object_isnot = w_object_isnot;
    vm.b.w_raise = w_raise;
}
