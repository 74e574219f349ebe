//! The FQN wire format and the VM-side name registry.

mod support;

use pretty_assertions::assert_eq;
use spy::fqn::Fqn;
use spy::object::WObject;
use spy::vm::Vm;
use support::fqn;

/// Parse/serialize round trip over representative shapes, including
/// nested qualifiers.
#[test]
fn wire_format_roundtrip() {
    for s in [
        "builtins::i32",
        "a.b.c::xxx",
        "mod::make_Point[builtins::i32]::Point",
        "mod::dict[mod::str, mod::list[mod::i32]]::get",
        "mod::f[mod::g[mod::h[mod::k]]]",
        "mod::lambda#3",
    ] {
        let parsed = Fqn::parse(s).unwrap();
        assert_eq!(parsed.to_string(), s);
        // parsing the serialization gives a structurally-equal FQN
        assert_eq!(Fqn::parse(&parsed.to_string()).unwrap(), parsed);
    }
}

/// Whitespace inside qualifier lists is insignificant.
#[test]
fn wire_format_ignores_whitespace() {
    let a = Fqn::parse("m::f[m::a,m::b]").unwrap();
    let b = Fqn::parse("m::f[ m::a , m::b ]").unwrap();
    assert_eq!(a, b);
}

/// `get_unique_fqn` never hands out the same name twice.
#[test]
fn unique_fqn_appends_suffixes() {
    let mut vm = Vm::new();
    let base = fqn("x::closure");
    let first = vm.get_unique_fqn(&base);
    let second = vm.get_unique_fqn(&base);
    let third = vm.get_unique_fqn(&base);
    assert_eq!(first.to_string(), "x::closure");
    assert_eq!(second.to_string(), "x::closure#1");
    assert_eq!(third.to_string(), "x::closure#2");
}

/// `make_fqn_const` is idempotent and the minted FQN resolves back to the
/// same value.
#[test]
fn make_fqn_const_is_idempotent() {
    let mut vm = Vm::new();
    let w_val = WObject::str("hello");
    let first = vm.make_fqn_const(&w_val);
    let second = vm.make_fqn_const(&w_val);
    assert_eq!(first, second);
    assert_eq!(first.modname(), "const");
    assert_eq!(vm.lookup_global(&first), Some(&w_val));
}

/// Values which already carry a name (types, functions) keep it.
#[test]
fn make_fqn_const_reuses_intrinsic_names() {
    let mut vm = Vm::new();
    let w_i32 = WObject::Type(vm.b.w_i32);
    assert_eq!(vm.make_fqn_const(&w_i32).to_string(), "builtins::i32");
}

/// C-name flattening, including the qualifier encoding through the VM's
/// uniqueness table.
#[test]
fn c_name_encoding() {
    let mut vm = Vm::new();
    assert_eq!(fqn("a.b.c::xxx").c_name(), "spy_a_b_c__xxx");
    assert_eq!(fqn("x::f#2").c_name(), "spy_x__f__2");

    let qualified = fqn("m::make_Point[builtins::i32]::Point");
    let c1 = vm.c_name_of(&qualified);
    let c2 = vm.c_name_of(&qualified);
    // deterministic: the same qualifier always encodes to the same index
    assert_eq!(c1, c2);
    assert_eq!(c1, "spy_m__make_Point_0__Point");

    let other = fqn("m::make_Point[builtins::f64]::Point");
    assert_eq!(vm.c_name_of(&other), "spy_m__make_Point_1__Point");
}
