use kiln_ir::insn::{decode, Operand};
use kiln_ir::opcode::Opcode;
use kiln_ir::{well_known, Access, Constant, MethodDef, MethodDesc, Signature, Type, UnitDef};
use pretty_assertions::assert_eq;

use crate::{EmitError, TypeEmitter};

fn new_type(access: Access) -> TypeEmitter {
    TypeEmitter::begin_type(access, "test/Holder", None, vec![], Some("test"))
}

fn method<'u>(unit: &'u UnitDef, name: &str) -> &'u MethodDef {
    unit.methods
        .iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no method {name}"))
}

fn static_calls(unit: &UnitDef, m: &MethodDef) -> Vec<String> {
    let code = m.code.as_ref().unwrap();
    decode(&code.bytes)
        .unwrap()
        .into_iter()
        .filter(|i| i.op == Opcode::Invokestatic)
        .map(|i| match i.operand {
            Operand::Pool(idx) => match unit.pool.get(idx) {
                Some(Constant::Method { name, .. }) => name.clone(),
                other => panic!("unexpected constant {other:?}"),
            },
            other => panic!("unexpected operand {other:?}"),
        })
        .collect()
}

#[test]
fn super_defaults_to_root() {
    let unit = new_type(Access::PUBLIC).end_type().unwrap();
    assert_eq!(unit.super_name.as_deref(), Some(well_known::OBJECT));
    assert_eq!(unit.source.as_deref(), Some("test"));
    assert!(unit.methods.is_empty());
}

#[test]
fn identical_field_redeclaration_is_a_no_op() {
    let mut te = new_type(Access::PUBLIC);
    te.declare_field(Access::PRIVATE, "count", Type::Int, None)
        .unwrap();
    te.declare_field(Access::PRIVATE, "count", Type::Int, None)
        .unwrap();
    let err = te
        .declare_field(Access::PUBLIC, "count", Type::Int, None)
        .unwrap_err();
    assert_eq!(
        err,
        EmitError::FieldDeclaredDifferently {
            name: "count".to_owned()
        }
    );
    let unit = te.end_type().unwrap();
    assert_eq!(unit.fields.len(), 1);
}

#[test]
fn static_contributions_merge_into_one_initializer() {
    let mut te = new_type(Access::PUBLIC);
    te.declare_field(Access::STATIC, "a", Type::Int, None).unwrap();
    te.declare_field(Access::STATIC, "b", Type::Int, None).unwrap();

    let mut e = te.begin_static();
    e.push_int(1);
    e.put_own_field("a").unwrap();
    e.end_method().unwrap();

    let mut hook = te.static_hook().unwrap();
    hook.push_int(2);
    hook.put_own_field("b").unwrap();
    hook.end_method().unwrap();

    // Routed through the initializer signature.
    let mut e = te.begin_method(Access::STATIC, &Signature::static_init(), &[]);
    assert!(e.is_static_init());
    e.push_int(3);
    e.put_own_field("a").unwrap();
    e.end_method().unwrap();

    let mut hook = te.static_hook().unwrap();
    hook.push_int(4);
    hook.put_own_field("b").unwrap();
    hook.end_method().unwrap();

    let unit = te.end_type().unwrap();
    let inits: Vec<_> = unit
        .methods
        .iter()
        .filter(|m| m.name == well_known::STATIC_INIT)
        .collect();
    assert_eq!(inits.len(), 1);

    let hooks: Vec<_> = unit
        .methods
        .iter()
        .filter(|m| m.name == "kiln$static_hook")
        .collect();
    assert_eq!(hooks.len(), 1);

    let calls = static_calls(&unit, inits[0]);
    assert_eq!(calls, vec![hooks[0].name.clone()]);

    let hook_ops: Vec<Opcode> = decode(&hooks[0].code.as_ref().unwrap().bytes)
        .unwrap()
        .into_iter()
        .map(|i| i.op)
        .collect();
    assert_eq!(
        hook_ops,
        vec![
            Opcode::Iconst2,
            Opcode::Putstatic,
            Opcode::Iconst4,
            Opcode::Putstatic,
            Opcode::Return,
        ]
    );
}

#[test]
fn hook_alone_synthesizes_the_initializer() {
    let mut te = new_type(Access::PUBLIC);
    let hook = te.static_hook().unwrap();
    hook.end_method().unwrap();
    let unit = te.end_type().unwrap();
    let init = method(&unit, well_known::STATIC_INIT);
    assert_eq!(static_calls(&unit, init).len(), 1);
}

#[test]
fn hooks_are_rejected_on_interfaces() {
    let mut te = new_type(Access::PUBLIC | Access::INTERFACE | Access::ABSTRACT);
    assert!(matches!(
        te.static_hook(),
        Err(EmitError::StaticHookOnInterface { .. })
    ));
    te.declare_method(
        Access::PUBLIC,
        &Signature::new("size", MethodDesc::new([], Type::Int)),
        &[],
    );
    let unit = te.end_type().unwrap();
    assert!(unit.is_interface());
    assert!(method(&unit, "size").code.is_none());
}

#[test]
fn unknown_own_field_is_an_error() {
    let mut te = new_type(Access::PUBLIC);
    let mut e = te.begin_method(Access::STATIC, &Signature::new("f", MethodDesc::void()), &[]);
    assert_eq!(
        e.get_own_field("missing").unwrap_err(),
        EmitError::UnknownField {
            owner: "test/Holder".to_owned(),
            name: "missing".to_owned(),
        }
    );
}

#[test]
fn abandoned_body_fails_end_type() {
    let mut te = new_type(Access::PUBLIC);
    let e = te.begin_method(Access::PUBLIC, &Signature::new("f", MethodDesc::void()), &[]);
    drop(e);
    assert!(matches!(
        te.end_type(),
        Err(EmitError::MethodNotEnded { .. })
    ));
}

#[test]
fn equal_descriptions_encode_identically() {
    let build = || {
        let mut te = new_type(Access::PUBLIC);
        te.declare_field(Access::STATIC, "b", Type::Int, None).unwrap();
        let mut hook = te.static_hook().unwrap();
        hook.push_int(2);
        hook.put_own_field("b").unwrap();
        hook.end_method().unwrap();
        te.end_type().unwrap().to_bytes().unwrap()
    };
    assert_eq!(build(), build());
}

#[test]
fn full_constant_pool_is_reported_by_end_method() {
    let mut te = new_type(Access::PUBLIC);
    let sig = Signature::new("many", MethodDesc::void());
    let mut e = te.begin_method(Access::PUBLIC | Access::STATIC, &sig, &[]);
    for i in 0..=i64::from(u16::MAX) {
        e.push_long(i + 2);
        e.pop2();
    }
    e.return_value();
    assert_eq!(
        e.end_method().unwrap_err(),
        EmitError::TooManyConstants {
            unit: "test/Holder".to_owned()
        }
    );
}
