use std::sync::Arc;

use kiln_emit::emit_utils::null_constructor;
use kiln_emit::{CodeEmitter, TypeEmitter};
use kiln_gen::{GenConfig, GeneratorBase, ScopeRegistry};
use kiln_ir::{Access, Type};
use kiln_vm::{invoke_virtual, throwable_cause, Class, ModuleScope, ObjRef, Value, VmError};
use pretty_assertions::assert_eq;

use super::{members, BeanCopier};
use crate::converter::{convert_signature, converter_interface, CONVERTER};
use crate::{BeanError, BeanGenerator};

fn base(scope: &ModuleScope) -> GeneratorBase {
    GeneratorBase::new()
        .with_scope(scope)
        .with_config(GenConfig::default())
        .with_registry(Arc::new(ScopeRegistry::new()))
}

fn bean(scope: &ModuleScope, props: &[(&str, Type)]) -> Arc<Class> {
    let mut gen = BeanGenerator::new().with_base(base(scope));
    for (name, ty) in props {
        gen.add_property(name, ty.clone()).unwrap();
    }
    gen.create_class().unwrap()
}

fn converter(scope: &ModuleScope, name: &str, body: impl FnOnce(&mut CodeEmitter<'_>)) -> ObjRef {
    converter_interface().unwrap();
    let mut te =
        TypeEmitter::begin_type(Access::PUBLIC, name, None, vec![Type::object(CONVERTER)], None);
    null_constructor(&mut te).unwrap();
    let mut e = te.begin_method(Access::PUBLIC, &convert_signature(), &[]);
    body(&mut e);
    e.return_value();
    e.end_method().unwrap();
    let class = scope.define(te.end_type().unwrap()).unwrap();
    class.new_instance().unwrap()
}

fn get(obj: &ObjRef, getter: &str, desc: &str) -> Value {
    invoke_virtual(obj, getter, desc, vec![]).unwrap().unwrap()
}

#[test]
fn members_pair_properties_by_name() {
    let scope = ModuleScope::new("members");
    let source = bean(&scope, &[("x", Type::Int), ("y", Type::string()), ("z", Type::Long)]);
    let target = bean(&scope, &[("x", Type::Int), ("y", Type::Int), ("w", Type::Int)]);

    let names = |use_converter| -> Vec<String> {
        members(&source, &target, use_converter)
            .into_iter()
            .map(|m| m.name)
            .collect()
    };
    assert_eq!(names(false), vec!["x"]);
    assert_eq!(names(true), vec!["x", "y"]);
}

#[test]
fn references_copy_into_supertypes() {
    let scope = ModuleScope::new("members-super");
    let source = bean(&scope, &[("label", Type::string())]);
    let target = bean(&scope, &[("label", Type::object_root())]);
    assert_eq!(members(&source, &target, false).len(), 1);
    assert!(members(&target, &source, false).is_empty());
}

#[test]
fn converter_sees_every_value() {
    let scope = ModuleScope::new("convert");
    let source = bean(&scope, &[("n", Type::Int)]);
    let target = bean(&scope, &[("n", Type::Long)]);
    let copier = BeanCopier::create_with(&base(&scope), &source, &target, true).unwrap();
    assert!(copier.uses_converter());

    // Every value becomes null, which unboxes to zero.
    let nulls = converter(&scope, "test/Nulls", |e| e.push_null());
    let from = source.new_instance().unwrap();
    invoke_virtual(&from, "setN", "(I)V", vec![Value::Int(5)]).unwrap();
    let to = target.new_instance().unwrap();
    invoke_virtual(&to, "setN", "(J)V", vec![Value::Long(9)]).unwrap();
    copier.copy(&from, &to, Some(&nulls)).unwrap();
    assert_eq!(get(&to, "getN", "()J"), Value::Long(0));
}

#[test]
fn failures_carry_the_member_index() {
    let scope = ModuleScope::new("indexed");
    let source = bean(&scope, &[("a", Type::Int), ("b", Type::string())]);
    let target = bean(&scope, &[("a", Type::Int), ("b", Type::Int)]);
    let copier = BeanCopier::create_with(&base(&scope), &source, &target, true).unwrap();

    // Identity: fine for `a`, a class cast for the string in `b`.
    let identity = converter(&scope, "test/Identity", |e| e.load_arg(0));
    let from = source.new_instance().unwrap();
    invoke_virtual(&from, "setA", "(I)V", vec![Value::Int(3)]).unwrap();
    let to = target.new_instance().unwrap();

    let err = copier.copy(&from, &to, Some(&identity)).unwrap_err();
    assert_eq!(err.thrown_class(), Some("core/IndexedMemberException"));
    let BeanError::Runtime(VmError::Thrown(thrown)) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(thrown.get_field("index"), Some(Value::Int(1)));
    let cause = throwable_cause(thrown).unwrap();
    assert_eq!(cause.class().name(), "core/ClassCastException");
    // Members before the failing one were copied.
    assert_eq!(get(&to, "getA", "()I"), Value::Int(3));
}

#[test]
fn converter_is_required_when_requested() {
    let scope = ModuleScope::new("missing-converter");
    let class = bean(&scope, &[("a", Type::Int)]);
    let copier = BeanCopier::create_with(&base(&scope), &class, &class, true).unwrap();
    let obj = class.new_instance().unwrap();
    assert!(matches!(
        copier.copy(&obj, &obj, None),
        Err(BeanError::MissingConverter)
    ));
}

#[test]
fn wrong_argument_classes_are_rejected() {
    let scope = ModuleScope::new("wrong-args");
    let source = bean(&scope, &[("a", Type::Int)]);
    let other = bean(&scope, &[("q", Type::Int)]);
    let copier = BeanCopier::create_with(&base(&scope), &source, &source, false).unwrap();
    let err = copier
        .copy(&other.new_instance().unwrap(), &source.new_instance().unwrap(), None)
        .unwrap_err();
    assert_eq!(err.thrown_class(), Some("core/ClassCastException"));
}

#[test]
fn equal_requests_share_the_copier_class() {
    let scope = ModuleScope::new("copier-reuse");
    let base = base(&scope);
    let source = bean(&scope, &[("a", Type::Int)]);
    let target = bean(&scope, &[("a", Type::Int)]);
    let plain = BeanCopier::create_with(&base, &source, &target, false).unwrap();
    let again = BeanCopier::create_with(&base, &source, &target, false).unwrap();
    let converting = BeanCopier::create_with(&base, &source, &target, true).unwrap();
    assert!(Arc::ptr_eq(plain.class(), again.class()));
    assert!(!Arc::ptr_eq(plain.class(), converting.class()));
    assert!(plain.class().name().starts_with(source.name()));
}
