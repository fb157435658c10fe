//! Plain bean classes built from a property list.

use std::collections::BTreeMap;
use std::sync::Arc;

use kiln_emit::emit_utils::{add_property, null_constructor};
use kiln_emit::TypeEmitter;
use kiln_gen::{DynSpec, GenError, Generator, GeneratorBase};
use kiln_ir::{Access, Type, UnitDef};
use kiln_vm::{Class, ModuleScope, ObjRef};

use crate::introspect::properties;
use crate::BeanError;

#[derive(Debug, PartialEq, Eq, Hash)]
struct BeanSpec {
    superclass: Option<String>,
    properties: Vec<(String, Type)>,
}

/// Generates a class with a private field and public `getX`/`setX` pair
/// per property, optionally extending an existing class.
#[derive(Clone, Debug, Default)]
pub struct BeanGenerator {
    base: GeneratorBase,
    superclass: Option<Arc<Class>>,
    properties: BTreeMap<String, Type>,
}

fn is_property_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl BeanGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base(mut self, base: GeneratorBase) -> Self {
        self.base = base;
        self
    }

    /// Extend `superclass`, which needs a public no-argument constructor.
    /// The root class means no superclass.
    pub fn set_superclass(&mut self, superclass: &Arc<Class>) -> Result<(), BeanError> {
        if superclass.is_interface() || superclass.access().contains(Access::FINAL) {
            return Err(BeanError::NotExtensible(superclass.name().to_owned()));
        }
        self.superclass = (superclass.name() != kiln_ir::well_known::OBJECT)
            .then(|| Arc::clone(superclass));
        Ok(())
    }

    pub fn add_property(&mut self, name: &str, ty: Type) -> Result<(), BeanError> {
        if !is_property_name(name) || ty == Type::Void {
            return Err(BeanError::InvalidPropertyName(name.to_owned()));
        }
        if self.properties.contains_key(name) {
            return Err(BeanError::DuplicateProperty(name.to_owned()));
        }
        self.properties.insert(name.to_owned(), ty);
        Ok(())
    }

    /// Add every property of `class` that has both accessors.
    pub fn add_properties_from(&mut self, class: &Arc<Class>) -> Result<(), BeanError> {
        for prop in properties(class) {
            if prop.is_readable() && prop.is_writable() {
                self.add_property(&prop.name, prop.ty)?;
            }
        }
        Ok(())
    }

    pub fn properties(&self) -> &BTreeMap<String, Type> {
        &self.properties
    }

    pub fn create(&self) -> Result<ObjRef, BeanError> {
        Ok(self.base.create(self)?)
    }

    pub fn create_class(&self) -> Result<Arc<Class>, BeanError> {
        Ok(self.base.create_class(self)?)
    }
}

impl Generator for BeanGenerator {
    fn source_name(&self) -> &str {
        "kiln.beans.BeanGenerator"
    }

    fn spec(&self) -> DynSpec {
        DynSpec::new(BeanSpec {
            superclass: self.superclass.as_ref().map(|c| c.name().to_owned()),
            properties: self
                .properties
                .iter()
                .map(|(name, ty)| (name.clone(), ty.clone()))
                .collect(),
        })
    }

    fn name_prefix(&self) -> Option<&str> {
        self.superclass.as_ref().map(|c| c.name())
    }

    fn default_scope(&self) -> Option<ModuleScope> {
        self.superclass.as_ref().and_then(|c| c.scope())
    }

    fn generate_unit(&self, name: &str) -> Result<UnitDef, GenError> {
        let super_type = self.superclass.as_ref().map(|c| Type::object(c.name()));
        let mut te = TypeEmitter::begin_type(
            Access::PUBLIC,
            name,
            super_type,
            vec![],
            Some("BeanGenerator"),
        );
        null_constructor(&mut te)?;
        for (prop, ty) in &self.properties {
            add_property(&mut te, prop, ty)?;
        }
        Ok(te.end_type()?)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
