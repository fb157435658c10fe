use std::sync::Arc;

use kiln_emit::emit_utils::null_constructor;
use kiln_emit::TypeEmitter;
use kiln_gen::{GenConfig, GeneratorBase, ScopeRegistry};
use kiln_ir::{Access, MethodDesc, Signature, Type};
use kiln_vm::{new_string, Class, ModuleScope, Value};
use pretty_assertions::assert_eq;

use super::{BeanMap, Require};
use crate::{BeanError, BeanGenerator};

fn base(scope: &ModuleScope) -> GeneratorBase {
    GeneratorBase::new()
        .with_scope(scope)
        .with_config(GenConfig::default())
        .with_registry(Arc::new(ScopeRegistry::new()))
}

fn person(scope: &ModuleScope) -> Arc<Class> {
    let mut gen = BeanGenerator::new().with_base(base(scope));
    gen.add_property("name", Type::string()).unwrap();
    gen.add_property("age", Type::Int).unwrap();
    gen.add_property("score", Type::Double).unwrap();
    gen.create_class().unwrap()
}

/// A bean with a read-only `id` and a write-only `secret`.
fn lopsided(scope: &ModuleScope) -> Arc<Class> {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Lopsided", None, vec![], None);
    null_constructor(&mut te).unwrap();
    let getter = Signature::new("getId", MethodDesc::new([], Type::Long));
    let mut e = te.begin_method(Access::PUBLIC, &getter, &[]);
    e.push_long(77);
    e.return_value();
    e.end_method().unwrap();
    let setter = Signature::new("setSecret", MethodDesc::new([Type::Int], Type::Void));
    let mut e = te.begin_method(Access::PUBLIC, &setter, &[]);
    e.return_value();
    e.end_method().unwrap();
    scope.define(te.end_type().unwrap()).unwrap()
}

#[test]
fn keys_and_types_describe_the_bean() {
    let scope = ModuleScope::new("map-keys");
    let class = person(&scope);
    let map = BeanMap::for_class(&base(&scope), &class, Require::empty()).unwrap();
    assert_eq!(map.keys().unwrap(), vec!["age", "name", "score"]);
    assert_eq!(map.property_type("age").unwrap(), Some(Type::Int));
    assert_eq!(map.property_type("name").unwrap(), Some(Type::string()));
    assert_eq!(map.property_type("missing").unwrap(), None);
    assert_eq!(map.len().unwrap(), 3);
}

#[test]
fn get_and_put_reach_the_bean() {
    let scope = ModuleScope::new("map-get-put");
    let bean = person(&scope).new_instance().unwrap();
    let map = BeanMap::for_class(&base(&scope), bean.class(), Require::empty()).unwrap();
    map.set_bean(Some(&bean)).unwrap();

    assert_eq!(map.put("age", Value::Int(30)).unwrap(), Value::Int(0));
    assert_eq!(map.put("age", Value::Int(31)).unwrap(), Value::Int(30));
    assert_eq!(map.get("age").unwrap(), Value::Int(31));

    map.put("score", Value::Double(2.5)).unwrap();
    assert_eq!(map.get("score").unwrap(), Value::Double(2.5));

    map.put("name", Value::object(new_string("Grace"))).unwrap();
    let name = map.get("name").unwrap();
    assert_eq!(name.as_object().unwrap().as_str(), Some("Grace"));

    assert!(map.get("missing").unwrap().is_null());
    let err = map.put("missing", Value::Int(1)).unwrap_err();
    assert_eq!(err.thrown_class(), Some("core/IllegalArgumentException"));
}

#[test]
fn null_puts_reset_primitives() {
    let scope = ModuleScope::new("map-null");
    let bean = person(&scope).new_instance().unwrap();
    let map = BeanMap::for_class(&base(&scope), bean.class(), Require::empty()).unwrap();
    map.set_bean(Some(&bean)).unwrap();
    map.put("age", Value::Int(5)).unwrap();
    map.put("age", Value::NULL).unwrap();
    assert_eq!(map.get("age").unwrap(), Value::Int(0));
}

#[test]
fn requirements_filter_keys() {
    let scope = ModuleScope::new("map-require");
    let class = lopsided(&scope);
    let base = base(&scope);
    let keys = |require| {
        BeanMap::for_class(&base, &class, require)
            .unwrap()
            .keys()
            .unwrap()
    };
    assert_eq!(keys(Require::empty()), vec!["id", "secret"]);
    assert_eq!(keys(Require::GETTER), vec!["id"]);
    assert_eq!(keys(Require::SETTER), vec!["secret"]);
    assert!(keys(Require::GETTER | Require::SETTER).is_empty());
}

#[test]
fn read_only_and_write_only_properties() {
    let scope = ModuleScope::new("map-lopsided");
    let bean = lopsided(&scope).new_instance().unwrap();
    let map = BeanMap::for_class(&base(&scope), bean.class(), Require::empty()).unwrap();
    map.set_bean(Some(&bean)).unwrap();

    assert_eq!(map.get("id").unwrap(), Value::Long(77));
    assert!(map.get("secret").unwrap().is_null());
    assert!(map.put("secret", Value::Int(1)).unwrap().is_null());
    let err = map.put("id", Value::Long(1)).unwrap_err();
    assert_eq!(err.thrown_class(), Some("core/IllegalArgumentException"));
}

#[test]
fn a_view_without_setters_refuses_every_put() {
    let scope = ModuleScope::new("map-no-setters");
    let bean = lopsided(&scope).new_instance().unwrap();
    let map = BeanMap::for_class(&base(&scope), bean.class(), Require::GETTER).unwrap();
    map.set_bean(Some(&bean)).unwrap();
    let err = map.put("id", Value::Long(1)).unwrap_err();
    assert_eq!(err.thrown_class(), Some("core/IllegalArgumentException"));
}

#[test]
fn unattached_views_report_the_missing_bean() {
    let scope = ModuleScope::new("map-unattached");
    let class = person(&scope);
    let map = BeanMap::for_class(&base(&scope), &class, Require::empty()).unwrap();
    assert!(map.bean().is_none());
    assert!(matches!(map.get("age"), Err(BeanError::NoBean)));
}
