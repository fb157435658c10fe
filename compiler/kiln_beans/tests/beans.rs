//! End-to-end bean scenarios: generated beans, copiers and map views
//! working together through one scope.

#![allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

use std::sync::Arc;

use kiln_beans::{BeanCopier, BeanGenerator, BeanMap, Require};
use kiln_gen::{GenConfig, GeneratorBase, ScopeRegistry};
use kiln_ir::Type;
use kiln_vm::{Class, ModuleScope, Value};
use pretty_assertions::assert_eq;
use rayon::prelude::*;

fn base(scope: &ModuleScope) -> GeneratorBase {
    GeneratorBase::new()
        .with_scope(scope)
        .with_config(GenConfig::default())
        .with_registry(Arc::new(ScopeRegistry::new()))
}

fn bean(base: &GeneratorBase, props: &[(&str, Type)]) -> Arc<Class> {
    let mut gen = BeanGenerator::new().with_base(base.clone());
    for (name, ty) in props {
        gen.add_property(name, ty.clone()).unwrap();
    }
    gen.create_class().unwrap()
}

fn view(base: &GeneratorBase, class: &Arc<Class>) -> BeanMap {
    BeanMap::for_class(base, class, Require::empty()).unwrap()
}

#[test]
fn copy_touches_only_shared_members() {
    let scope = ModuleScope::new("copy-shared");
    let base = base(&scope);
    let source = bean(&base, &[("x", Type::Int), ("label", Type::string())]);
    let target = bean(&base, &[("x", Type::Int), ("y", Type::Int)]);

    let from = source.new_instance().unwrap();
    let to = target.new_instance().unwrap();
    let from_map = view(&base, &source).new_instance(&from).unwrap();
    let to_map = view(&base, &target).new_instance(&to).unwrap();
    from_map.put("x", Value::Int(42)).unwrap();
    to_map.put("y", Value::Int(7)).unwrap();

    let copier = BeanCopier::create_with(&base, &source, &target, false).unwrap();
    copier.copy(&from, &to, None).unwrap();

    assert_eq!(to_map.get("x").unwrap(), Value::Int(42));
    assert_eq!(to_map.get("y").unwrap(), Value::Int(7));
    assert_eq!(from_map.get("x").unwrap(), Value::Int(42));
}

#[test]
fn map_views_of_one_class_are_interchangeable() {
    let scope = ModuleScope::new("map-twice");
    let base = base(&scope);
    let class = bean(&base, &[("count", Type::Long)]);

    let first = view(&base, &class);
    let second = view(&base, &class);
    assert!(Arc::ptr_eq(first.class(), second.class()));

    let a = class.new_instance().unwrap();
    let b = class.new_instance().unwrap();
    let over_a = first.new_instance(&a).unwrap();
    let over_b = second.new_instance(&b).unwrap();
    over_a.put("count", Value::Long(1)).unwrap();
    over_b.put("count", Value::Long(2)).unwrap();

    assert!(Arc::ptr_eq(over_a.class(), first.class()));
    assert_eq!(over_a.get("count").unwrap(), Value::Long(1));
    assert_eq!(over_b.get("count").unwrap(), Value::Long(2));

    first.set_bean(Some(&b)).unwrap();
    assert_eq!(first.get("count").unwrap(), Value::Long(2));
}

#[test]
fn beans_generated_from_many_threads_share_classes() {
    let scope = ModuleScope::new("beans-parallel");
    let base = base(&scope);
    let classes: Vec<Arc<Class>> = (0..32)
        .into_par_iter()
        .map(|i| {
            let props = if i % 2 == 0 {
                vec![("even", Type::Int)]
            } else {
                vec![("odd", Type::Double)]
            };
            bean(&base, &props)
        })
        .collect();

    let even = &classes[0];
    let odd = &classes[1];
    assert!(!Arc::ptr_eq(even, odd));
    for (i, class) in classes.iter().enumerate() {
        let expected = if i % 2 == 0 { even } else { odd };
        assert!(Arc::ptr_eq(class, expected));
    }
}
