//! Defining emitted units and running them.

#![allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]

use std::sync::Arc;

use kiln_emit::emit_utils::{add_properties, null_constructor};
use kiln_emit::{CodeEmitter, FieldRef, TypeEmitter};
use kiln_ir::{well_known as wk, Access, Constant, MethodDesc, Signature, Type, UnitDef};
use kiln_vm::{box_value, invoke_virtual, unbox, Class, DefineError, ModuleScope, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn simple_type(name: &str) -> UnitDef {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, name, None, vec![], None);
    null_constructor(&mut te).unwrap();
    te.end_type().unwrap()
}

fn static_method(
    te: &mut TypeEmitter,
    name: &str,
    params: &[Type],
    ret: Type,
    body: impl FnOnce(&mut CodeEmitter<'_>),
) {
    let sig = Signature::new(name, MethodDesc::new(params.iter().cloned(), ret));
    let mut e = te.begin_method(Access::PUBLIC | Access::STATIC, &sig, &[]);
    body(&mut e);
    e.end_method().unwrap();
}

// ── Definition ──────────────────────────────────────────────────────

#[test]
fn duplicate_names_are_rejected() {
    let scope = ModuleScope::new("dup");
    scope.define_unit(&simple_type("test/A").to_bytes().unwrap()).unwrap();
    let err = scope
        .define_unit(&simple_type("test/A").to_bytes().unwrap())
        .unwrap_err();
    assert!(matches!(err, DefineError::Duplicate { ref name } if name == "test/A"));
}

#[test]
fn core_names_are_taken_in_every_scope() {
    let scope = ModuleScope::new("core-clash");
    assert!(scope.is_name_taken(wk::STRING));
    let err = scope
        .define_unit(&simple_type(wk::STRING).to_bytes().unwrap())
        .unwrap_err();
    assert!(matches!(err, DefineError::Duplicate { .. }));
}

#[test]
fn missing_supertype_is_reported() {
    let te = TypeEmitter::begin_type(
        Access::PUBLIC,
        "test/Child",
        Some(Type::object("test/Missing")),
        vec![],
        None,
    );
    let unit = te.end_type().unwrap();
    let err = ModuleScope::new("orphans").define(unit).unwrap_err();
    assert!(matches!(
        err,
        DefineError::SuperNotFound { ref super_name, .. } if super_name == "test/Missing"
    ));
}

#[test]
fn malformed_bytes_fail_to_decode() {
    let err = ModuleScope::new("junk").define_unit(b"nope").unwrap_err();
    assert!(matches!(err, DefineError::Decode(_)));
}

#[test]
fn child_scope_sees_parent_classes() {
    let parent = ModuleScope::new("parent");
    parent.define_unit(&simple_type("test/Base").to_bytes().unwrap()).unwrap();
    let child = ModuleScope::with_parent("child", &parent);
    let te = TypeEmitter::begin_type(
        Access::PUBLIC,
        "test/Derived",
        Some(Type::object("test/Base")),
        vec![],
        None,
    );
    let derived = child.define(te.end_type().unwrap()).unwrap();
    assert!(derived.is_subclass_of("test/Base"));
    assert!(child.find_class("test/Base").is_none());
    assert!(child.load_class("test/Base").is_some());
    assert_eq!(child.class_names(), vec!["test/Derived".to_owned()]);
}

#[test]
fn dropping_the_scope_releases_its_classes() {
    let scope = ModuleScope::new("short-lived");
    let class = scope.define_unit(&simple_type("test/Gone").to_bytes().unwrap()).unwrap();
    let weak = scope.weak();
    let class_weak = Arc::downgrade(&class);
    drop(class);
    assert!(weak.is_alive());
    drop(scope);
    assert!(!weak.is_alive());
    assert!(class_weak.upgrade().is_none());
}

// ── Static initialization ───────────────────────────────────────────

#[test]
fn static_init_and_hook_run_once_at_define() {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Statics", None, vec![], None);
    te.declare_field(Access::PUBLIC | Access::STATIC, "A", Type::Int, None)
        .unwrap();
    te.declare_field(Access::PUBLIC | Access::STATIC, "B", Type::Int, None)
        .unwrap();
    te.declare_field(
        Access::PUBLIC | Access::STATIC | Access::FINAL,
        "C",
        Type::string(),
        Some(Constant::Str("const".to_owned())),
    )
    .unwrap();
    let owner = te.class_type().clone();

    let mut init = te.begin_static();
    init.push_int(1);
    init.put_field(&FieldRef::of_static(owner.clone(), "A", Type::Int));
    init.end_method().unwrap();

    let mut hook = te.static_hook().unwrap();
    hook.push_int(2);
    hook.put_field(&FieldRef::of_static(owner.clone(), "B", Type::Int));
    hook.end_method().unwrap();

    // A later contribution to the initializer reads what the hook wrote.
    let mut init = te.begin_static();
    init.get_field(&FieldRef::of_static(owner.clone(), "B", Type::Int));
    init.push_int(10);
    init.math(kiln_emit::MathOp::Mul, &Type::Int).unwrap();
    init.put_field(&FieldRef::of_static(owner, "A", Type::Int));
    init.end_method().unwrap();

    let unit = te.end_type().unwrap();
    let scope = ModuleScope::new("statics");
    let class = scope.define(unit).unwrap();
    assert_eq!(class.get_static("A"), Some(Value::Int(20)));
    assert_eq!(class.get_static("B"), Some(Value::Int(2)));
    let c = class.get_static("C").unwrap();
    assert_eq!(c.as_object().and_then(|o| o.as_str()), Some("const"));
}

fn hooked_type(name: &str, super_name: Option<&str>, field: &str, value: i32) -> UnitDef {
    let super_type = super_name.map(Type::object);
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, name, super_type, vec![], None);
    te.declare_field(Access::PUBLIC | Access::STATIC, field, Type::Int, None)
        .unwrap();
    let owner = te.class_type().clone();
    let mut hook = te.static_hook().unwrap();
    hook.push_int(value);
    hook.put_field(&FieldRef::of_static(owner, field, Type::Int));
    hook.end_method().unwrap();
    te.end_type().unwrap()
}

#[test]
fn subclass_and_supertype_hooks_stay_separate() {
    let scope = ModuleScope::new("hooks");
    let base = scope
        .define(hooked_type("test/HookBase", None, "BASE", 1))
        .unwrap();
    let sub = scope
        .define(hooked_type("test/HookSub", Some("test/HookBase"), "SUB", 2))
        .unwrap();
    assert_eq!(base.get_static("BASE"), Some(Value::Int(1)));
    assert_eq!(sub.get_static("SUB"), Some(Value::Int(2)));
    assert_eq!(sub.get_static("BASE"), Some(Value::Int(1)));
}

#[test]
fn failing_initializer_leaves_no_class_behind() {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Broken", None, vec![], None);
    let mut init = te.begin_static();
    init.throw_exception(&Type::object(wk::ILLEGAL_STATE), "no");
    init.end_method().unwrap();
    let unit = te.end_type().unwrap();

    let scope = ModuleScope::new("broken");
    match scope.define(unit).unwrap_err() {
        DefineError::Initializer { name, source } => {
            assert_eq!(name, "test/Broken");
            assert_eq!(source.thrown_class(), Some(wk::ILLEGAL_STATE));
        }
        other => panic!("expected an initializer failure, got {other:?}"),
    }
    assert!(scope.find_class("test/Broken").is_none());
}

// ── Instances ───────────────────────────────────────────────────────

fn bean_class(scope: &ModuleScope) -> Arc<Class> {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Bean", None, vec![], None);
    null_constructor(&mut te).unwrap();
    add_properties(&mut te, &[("count", Type::Int), ("label", Type::string())]).unwrap();
    scope.define(te.end_type().unwrap()).unwrap()
}

#[test]
fn generated_accessors_store_and_load() {
    let scope = ModuleScope::new("beans");
    let class = bean_class(&scope);
    let bean = class.new_instance().unwrap();
    invoke_virtual(&bean, "setCount", "(I)V", vec![Value::Int(9)]).unwrap();
    let label = Value::object(kiln_vm::new_string("nine"));
    invoke_virtual(&bean, "setLabel", "(Lcore/String;)V", vec![label.clone()]).unwrap();
    assert_eq!(
        invoke_virtual(&bean, "getCount", "()I", vec![]).unwrap(),
        Some(Value::Int(9))
    );
    assert_eq!(
        invoke_virtual(&bean, "getLabel", "()Lcore/String;", vec![]).unwrap(),
        Some(label)
    );
}

#[test]
fn inherited_to_string_reaches_the_root() {
    let scope = ModuleScope::new("root-methods");
    let class = bean_class(&scope);
    let bean = class.new_instance().unwrap();
    let text = invoke_virtual(&bean, "toString", "()Lcore/String;", vec![])
        .unwrap()
        .unwrap();
    let text = text.as_object().and_then(|o| o.as_str()).unwrap().to_owned();
    assert!(text.starts_with("test/Bean@"), "{text}");
}

// ── Boxing ──────────────────────────────────────────────────────────

/// `run(x)` boxes its argument and unboxes it again.
fn round_trip_class(scope: &ModuleScope, ty: &Type) -> Arc<Class> {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Boxing", None, vec![], None);
    static_method(&mut te, "run", std::slice::from_ref(ty), ty.clone(), |e| {
        e.load_arg(0);
        e.box_value(ty);
        e.unbox(ty);
        e.return_value();
    });
    static_method(&mut te, "orZero", &[Type::object_root()], ty.clone(), |e| {
        e.load_arg(0);
        e.unbox_or_zero(ty);
        e.return_value();
    });
    scope.define(te.end_type().unwrap()).unwrap()
}

fn desc(params: &[Type], ret: &Type) -> String {
    MethodDesc::new(params.iter().cloned(), ret.clone()).descriptor()
}

#[test]
fn unbox_or_zero_maps_null_to_zero() {
    for (ty, zero) in [
        (Type::Int, Value::Int(0)),
        (Type::Long, Value::Long(0)),
        (Type::Double, Value::Double(0.0)),
        (Type::Boolean, Value::Int(0)),
    ] {
        let scope = ModuleScope::new("or-zero");
        let class = round_trip_class(&scope, &ty);
        let d = desc(&[Type::object_root()], &ty);
        assert_eq!(
            class.invoke_static("orZero", &d, vec![Value::NULL]).unwrap(),
            Some(zero)
        );
        let boxed = Value::object(box_value(&ty, Value::zero(&ty)).unwrap());
        assert!(class.invoke_static("orZero", &d, vec![boxed]).is_ok());
    }
}

#[test]
fn unbox_of_wrong_box_is_a_class_cast() {
    let scope = ModuleScope::new("wrong-box");
    let class = round_trip_class(&scope, &Type::Boolean);
    let d = desc(&[Type::object_root()], &Type::Boolean);
    let wrong = Value::object(box_value(&Type::Int, Value::Int(1)).unwrap());
    let err = class.invoke_static("orZero", &d, vec![wrong]).unwrap_err();
    assert_eq!(err.thrown_class(), Some(wk::CLASS_CAST));
}

fn primitive() -> impl Strategy<Value = (Type, Value)> {
    prop_oneof![
        any::<i32>().prop_map(|v| (Type::Int, Value::Int(v))),
        any::<i64>().prop_map(|v| (Type::Long, Value::Long(v))),
        any::<f32>().prop_map(|v| (Type::Float, Value::Float(v))),
        any::<f64>().prop_map(|v| (Type::Double, Value::Double(v))),
        any::<bool>().prop_map(|v| (Type::Boolean, Value::Int(i32::from(v)))),
        any::<u16>().prop_map(|v| (Type::Char, Value::Int(i32::from(v)))),
        any::<i8>().prop_map(|v| (Type::Byte, Value::Int(i32::from(v)))),
        any::<i16>().prop_map(|v| (Type::Short, Value::Int(i32::from(v)))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn box_then_unbox_is_identity((ty, value) in primitive()) {
        let scope = ModuleScope::new("round-trip");
        let class = round_trip_class(&scope, &ty);
        let d = desc(std::slice::from_ref(&ty), &ty);
        let out = class.invoke_static("run", &d, vec![value.clone()]).unwrap();
        prop_assert_eq!(out, Some(value.clone()));

        let host = box_value(&ty, value.clone()).unwrap();
        prop_assert_eq!(unbox(&host), Some(value));
    }
}
