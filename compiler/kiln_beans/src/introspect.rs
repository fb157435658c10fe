//! Property discovery on loaded classes.
//!
//! A property `x` of type `T` is readable through a public instance
//! `getX()T` (or `isX()Z` when `T` is boolean) and writable through a
//! public instance `setX(T)V`. A setter whose parameter type differs from
//! the getter's return type does not belong to the property.

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_ir::{MethodDesc, Signature, Type};
use kiln_vm::{Class, Method};

/// A property and the accessors that expose it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: Type,
    /// Name of the read method.
    pub read: Option<String>,
    /// Name of the write method.
    pub write: Option<String>,
}

impl PropertyDescriptor {
    pub fn is_readable(&self) -> bool {
        self.read.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    pub fn getter(&self) -> Option<Signature> {
        let name = self.read.as_deref()?;
        Some(Signature::new(name, MethodDesc::new([], self.ty.clone())))
    }

    pub fn setter(&self) -> Option<Signature> {
        let name = self.write.as_deref()?;
        Some(Signature::new(name, MethodDesc::new([self.ty.clone()], Type::Void)))
    }
}

/// `URL` stays `URL`, `Name` becomes `name`.
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    if chars.next().is_some_and(char::is_uppercase) && first.is_uppercase() {
        return name.to_owned();
    }
    first.to_lowercase().chain(name.chars().skip(1)).collect()
}

fn accessor_suffix<'a>(method: &'a Method, prefix: &str) -> Option<&'a str> {
    if !method.access().contains(kiln_ir::Access::PUBLIC) || method.is_static() {
        return None;
    }
    method
        .name()
        .strip_prefix(prefix)
        .filter(|rest| rest.chars().next().is_some_and(char::is_uppercase))
}

fn as_getter(method: &Method) -> Option<(String, Type)> {
    let desc = method.sig().desc();
    if !desc.params().is_empty() {
        return None;
    }
    if let Some(rest) = accessor_suffix(method, "get") {
        return (*desc.ret() != Type::Void).then(|| (decapitalize(rest), desc.ret().clone()));
    }
    let rest = accessor_suffix(method, "is")?;
    (*desc.ret() == Type::Boolean).then(|| (decapitalize(rest), Type::Boolean))
}

fn as_setter(method: &Method) -> Option<(String, Type)> {
    let desc = method.sig().desc();
    let rest = accessor_suffix(method, "set")?;
    match desc.params() {
        [param] if *desc.ret() == Type::Void => Some((decapitalize(rest), param.clone())),
        _ => None,
    }
}

/// Properties of `class` and its supertypes, sorted by name.
pub fn properties(class: &Arc<Class>) -> Vec<PropertyDescriptor> {
    let methods = class.all_methods();
    let mut found: BTreeMap<String, PropertyDescriptor> = BTreeMap::new();

    for (_, method) in &methods {
        let Some((name, ty)) = as_getter(method) else {
            continue;
        };
        let entry = found.entry(name.clone()).or_insert_with(|| PropertyDescriptor {
            name,
            ty: ty.clone(),
            read: None,
            write: None,
        });
        // `isX` wins over `getX` for booleans.
        let prefer = entry.read.is_none() || method.name().starts_with("is");
        if prefer && entry.ty == ty {
            entry.read = Some(method.name().to_owned());
        }
    }

    for (_, method) in &methods {
        let Some((name, ty)) = as_setter(method) else {
            continue;
        };
        let entry = found.entry(name.clone()).or_insert_with(|| PropertyDescriptor {
            name,
            ty: ty.clone(),
            read: None,
            write: None,
        });
        if entry.write.is_none() && entry.ty == ty {
            entry.write = Some(method.name().to_owned());
        }
    }

    found.into_values().collect()
}

/// The property `name` of `class`, if any.
pub fn property(class: &Arc<Class>, name: &str) -> Option<PropertyDescriptor> {
    properties(class).into_iter().find(|p| p.name == name)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
