use std::sync::Arc;

use kiln_emit::emit_utils::{add_property, null_constructor};
use kiln_emit::TypeEmitter;
use kiln_ir::{Access, MethodDesc, Signature, Type};
use kiln_vm::{Class, ModuleScope};
use pretty_assertions::assert_eq;

use super::{decapitalize, properties, property, PropertyDescriptor};

/// Method returning the zero value of its return type.
fn stub(te: &mut TypeEmitter, access: Access, name: &str, params: Vec<Type>, ret: Type) {
    let sig = Signature::new(name, MethodDesc::new(params, ret.clone()));
    let mut e = te.begin_method(access, &sig, &[]);
    if ret != Type::Void {
        e.zero_or_null(&ret);
    }
    e.return_value();
    e.end_method().unwrap();
}

fn define(scope: &ModuleScope, te: TypeEmitter) -> Arc<Class> {
    scope.define(te.end_type().unwrap()).unwrap()
}

fn sample(scope: &ModuleScope) -> Arc<Class> {
    let mut te = TypeEmitter::begin_type(Access::PUBLIC, "test/Sample", None, vec![], None);
    null_constructor(&mut te).unwrap();
    add_property(&mut te, "name", &Type::string()).unwrap();
    stub(&mut te, Access::PUBLIC, "isActive", vec![], Type::Boolean);
    stub(&mut te, Access::PUBLIC, "getCount", vec![], Type::Int);
    stub(&mut te, Access::PUBLIC, "setCount", vec![Type::Long], Type::Void);
    stub(&mut te, Access::PUBLIC, "setOnly", vec![Type::Int], Type::Void);
    stub(&mut te, Access::PUBLIC, "getURL", vec![], Type::string());
    stub(&mut te, Access::PUBLIC | Access::STATIC, "getShared", vec![], Type::Int);
    stub(&mut te, Access::PRIVATE, "getHidden", vec![], Type::Int);
    stub(&mut te, Access::PUBLIC, "getter", vec![], Type::Int);
    stub(&mut te, Access::PUBLIC, "getNothing", vec![], Type::Void);
    define(scope, te)
}

fn prop(name: &str, ty: Type, read: Option<&str>, write: Option<&str>) -> PropertyDescriptor {
    PropertyDescriptor {
        name: name.to_owned(),
        ty,
        read: read.map(str::to_owned),
        write: write.map(str::to_owned),
    }
}

#[test]
fn decapitalize_keeps_acronyms() {
    assert_eq!(decapitalize("Name"), "name");
    assert_eq!(decapitalize("URL"), "URL");
    assert_eq!(decapitalize("X"), "x");
    assert_eq!(decapitalize(""), "");
}

#[test]
fn accessors_become_properties() {
    let scope = ModuleScope::new("introspect");
    let class = sample(&scope);
    assert_eq!(
        properties(&class),
        vec![
            prop("URL", Type::string(), Some("getURL"), None),
            prop("active", Type::Boolean, Some("isActive"), None),
            prop("count", Type::Int, Some("getCount"), None),
            prop("name", Type::string(), Some("getName"), Some("setName")),
            prop("only", Type::Int, None, Some("setOnly")),
        ]
    );
}

#[test]
fn inherited_accessors_are_found() {
    let scope = ModuleScope::new("inherit");
    sample(&scope);
    let mut te = TypeEmitter::begin_type(
        Access::PUBLIC,
        "test/Derived",
        Some(Type::object("test/Sample")),
        vec![],
        None,
    );
    null_constructor(&mut te).unwrap();
    add_property(&mut te, "extra", &Type::Double).unwrap();
    let derived = define(&scope, te);

    let names: Vec<String> = properties(&derived).into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["URL", "active", "count", "extra", "name", "only"]);
    let name = property(&derived, "name").unwrap();
    assert_eq!(
        name.setter().unwrap().desc().descriptor(),
        "(Lcore/String;)V"
    );
    assert!(property(&derived, "missing").is_none());
}

#[test]
fn core_classes_have_no_properties() {
    let object = ModuleScope::system().find_class("core/Object").unwrap();
    assert!(properties(&object).is_empty());
}
