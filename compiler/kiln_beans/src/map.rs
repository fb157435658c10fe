//! Map views over beans.
//!
//! A generated map class knows the properties of one bean class. Its
//! `KEYS` array is filled by the static initializer and its `TYPES` array
//! (property type descriptors, parallel to `KEYS`) by the static hook.
//! Lookups dispatch on the key with a string switch.

use std::sync::Arc;

use bitflags::bitflags;

use kiln_emit::emit_utils::{
    null_constructor, push_string_array, string_switch, throw_illegal_argument,
    StringSwitchCallback,
};
use kiln_emit::{CodeEmitter, EmitError, Label, TypeEmitter};
use kiln_gen::{DynSpec, GenError, Generator, GeneratorBase};
use kiln_ir::{Access, MethodDesc, Signature, Type, UnitDef};
use kiln_vm::{box_value, invoke_virtual, new_string, unbox, Class, ModuleScope, ObjRef, Value};

use crate::introspect::{properties, PropertyDescriptor};
use crate::BeanError;

bitflags! {
    /// Accessors a property needs to appear in the map.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Require: u8 {
        const GETTER = 0x1;
        const SETTER = 0x2;
    }
}

const BEAN_FIELD: &str = "$kiln_bean";
const KEYS_FIELD: &str = "KEYS";
const TYPES_FIELD: &str = "TYPES";

fn string_array() -> Type {
    Type::array_of(Type::string())
}

fn method(name: &str, params: usize, ret: Type) -> Signature {
    Signature::new(
        name,
        MethodDesc::new(vec![Type::object_root(); params], ret),
    )
}

fn get_signature() -> Signature {
    method("get", 2, Type::object_root())
}

fn put_signature() -> Signature {
    method("put", 3, Type::object_root())
}

fn new_instance_signature() -> Signature {
    method("newInstance", 1, Type::object_root())
}

fn property_type_signature() -> Signature {
    method("propertyType", 1, Type::string())
}

fn keys_signature() -> Signature {
    method("keys", 0, string_array())
}

// ── Generation ──────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq, Hash)]
struct MapSpec {
    class: String,
    require: Require,
}

struct MapGenerator {
    class: Arc<Class>,
    require: Require,
}

fn find<'a>(
    props: &'a [PropertyDescriptor],
    key: &str,
) -> Result<&'a PropertyDescriptor, EmitError> {
    props
        .iter()
        .find(|p| p.name == key)
        .ok_or_else(|| EmitError::UnknownField {
            owner: "bean".to_owned(),
            name: key.to_owned(),
        })
}

/// `get`: box the property's value; unknown keys give null.
struct GetCases<'a> {
    bean: Type,
    props: &'a [PropertyDescriptor],
}

impl StringSwitchCallback for GetCases<'_> {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: &str,
        end: Label,
    ) -> Result<(), EmitError> {
        let prop = find(self.props, key)?;
        let getter = prop.getter().ok_or_else(|| EmitError::UnknownField {
            owner: self.bean.to_string(),
            name: key.to_owned(),
        })?;
        e.load_arg(0);
        e.checkcast(&self.bean);
        e.invoke_virtual(&self.bean, &getter);
        e.box_value(&prop.ty);
        e.goto(end);
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        e.push_null();
        Ok(())
    }
}

/// `put`: return the previous value (null when unreadable), then set.
struct PutCases<'a> {
    bean: Type,
    props: &'a [PropertyDescriptor],
}

impl StringSwitchCallback for PutCases<'_> {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: &str,
        end: Label,
    ) -> Result<(), EmitError> {
        let prop = find(self.props, key)?;
        match prop.getter() {
            Some(getter) => {
                e.load_arg(0);
                e.checkcast(&self.bean);
                e.invoke_virtual(&self.bean, &getter);
                e.box_value(&prop.ty);
            }
            None => e.push_null(),
        }
        let setter = prop.setter().ok_or_else(|| EmitError::UnknownField {
            owner: self.bean.to_string(),
            name: key.to_owned(),
        })?;
        e.load_arg(0);
        e.checkcast(&self.bean);
        e.load_arg(2);
        e.unbox_or_zero(&prop.ty);
        e.invoke_virtual(&self.bean, &setter);
        e.goto(end);
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        throw_illegal_argument(e, "no writable property with that name");
        Ok(())
    }
}

/// `propertyType`: the descriptor of the property's type.
struct TypeCases<'a> {
    props: &'a [PropertyDescriptor],
}

impl StringSwitchCallback for TypeCases<'_> {
    fn process_case(
        &mut self,
        e: &mut CodeEmitter<'_>,
        key: &str,
        end: Label,
    ) -> Result<(), EmitError> {
        let prop = find(self.props, key)?;
        e.push_string(&prop.ty.descriptor());
        e.goto(end);
        Ok(())
    }

    fn process_default(&mut self, e: &mut CodeEmitter<'_>) -> Result<(), EmitError> {
        e.push_null();
        Ok(())
    }
}

impl MapGenerator {
    fn selected(&self) -> Vec<PropertyDescriptor> {
        properties(&self.class)
            .into_iter()
            .filter(|p| !self.require.contains(Require::GETTER) || p.is_readable())
            .filter(|p| !self.require.contains(Require::SETTER) || p.is_writable())
            .collect()
    }
}

impl Generator for MapGenerator {
    fn source_name(&self) -> &str {
        "kiln.beans.BeanMap"
    }

    fn spec(&self) -> DynSpec {
        DynSpec::new(MapSpec {
            class: self.class.name().to_owned(),
            require: self.require,
        })
    }

    fn name_prefix(&self) -> Option<&str> {
        Some(self.class.name())
    }

    fn default_scope(&self) -> Option<ModuleScope> {
        self.class.scope()
    }

    fn generate_unit(&self, name: &str) -> Result<UnitDef, GenError> {
        let props = self.selected();
        let bean = Type::object(self.class.name());
        let names: Vec<&str> = props.iter().map(|p| p.name.as_str()).collect();
        let descriptors: Vec<String> = props.iter().map(|p| p.ty.descriptor()).collect();
        let descriptors: Vec<&str> = descriptors.iter().map(String::as_str).collect();
        let readable: Vec<&str> = props
            .iter()
            .filter(|p| p.is_readable())
            .map(|p| p.name.as_str())
            .collect();
        let writable: Vec<&str> = props
            .iter()
            .filter(|p| p.is_writable())
            .map(|p| p.name.as_str())
            .collect();
        tracing::debug!(bean = self.class.name(), keys = names.len(), "generating bean map");

        let mut te = TypeEmitter::begin_type(Access::PUBLIC, name, None, vec![], Some("BeanMap"));
        let statics = Access::PUBLIC | Access::STATIC | Access::FINAL;
        te.declare_field(statics, KEYS_FIELD, string_array(), None)?;
        te.declare_field(statics, TYPES_FIELD, string_array(), None)?;
        te.declare_field(Access::PRIVATE, BEAN_FIELD, Type::object_root(), None)?;

        let mut e = te.begin_static();
        push_string_array(&mut e, &names);
        e.put_own_field(KEYS_FIELD)?;
        e.end_method()?;
        let mut e = te.static_hook()?;
        push_string_array(&mut e, &descriptors);
        e.put_own_field(TYPES_FIELD)?;
        e.end_method()?;

        null_constructor(&mut te)?;

        let mut e = te.begin_method(Access::PUBLIC, &new_instance_signature(), &[]);
        e.new_instance_this();
        e.dup();
        e.invoke_constructor_this(&[]);
        e.dup();
        e.load_arg(0);
        e.put_own_field(BEAN_FIELD)?;
        e.return_value();
        e.end_method()?;

        let mut e = te.begin_method(Access::PUBLIC, &keys_signature(), &[]);
        e.get_own_field(KEYS_FIELD)?;
        e.return_value();
        e.end_method()?;

        let mut e = te.begin_method(Access::PUBLIC, &get_signature(), &[]);
        e.load_arg(1);
        e.checkcast(&Type::string());
        let mut cases = GetCases {
            bean: bean.clone(),
            props: &props,
        };
        string_switch(&mut e, &readable, &mut cases)?;
        e.return_value();
        e.end_method()?;

        let mut e = te.begin_method(Access::PUBLIC, &put_signature(), &[]);
        if writable.is_empty() {
            throw_illegal_argument(&mut e, "no writable property with that name");
        } else {
            e.load_arg(1);
            e.checkcast(&Type::string());
            let mut cases = PutCases {
                bean,
                props: &props,
            };
            string_switch(&mut e, &writable, &mut cases)?;
            e.return_value();
        }
        e.end_method()?;

        let mut e = te.begin_method(Access::PUBLIC, &property_type_signature(), &[]);
        e.load_arg(0);
        e.checkcast(&Type::string());
        string_switch(&mut e, &names, &mut TypeCases { props: &props })?;
        e.return_value();
        e.end_method()?;

        Ok(te.end_type()?)
    }
}

// ── Host view ───────────────────────────────────────────────────────

/// A map view of one bean: property names to property values.
#[derive(Debug)]
pub struct BeanMap {
    map: ObjRef,
}

fn value_type(value: &Value) -> Type {
    match value {
        Value::Long(_) => Type::Long,
        Value::Float(_) => Type::Float,
        Value::Double(_) => Type::Double,
        _ => Type::Int,
    }
}

impl BeanMap {
    /// A view of `bean` with every property of its class.
    pub fn create(bean: &ObjRef) -> Result<Self, BeanError> {
        let map = Self::for_class(&GeneratorBase::new(), bean.class(), Require::empty())?;
        map.set_bean(Some(bean))?;
        Ok(map)
    }

    /// A view over instances of `class` with no bean attached yet.
    pub fn for_class(
        base: &GeneratorBase,
        class: &Arc<Class>,
        require: Require,
    ) -> Result<Self, BeanError> {
        let generator = MapGenerator {
            class: Arc::clone(class),
            require,
        };
        Ok(BeanMap {
            map: base.create(&generator)?,
        })
    }

    /// The generated map class.
    pub fn class(&self) -> &Arc<Class> {
        self.map.class()
    }

    /// A view of `bean` sharing this view's generated class.
    pub fn new_instance(&self, bean: &ObjRef) -> Result<BeanMap, BeanError> {
        let sig = new_instance_signature();
        let map = self
            .call(&sig, vec![Value::object(Arc::clone(bean))])?
            .as_object()
            .cloned()
            .ok_or_else(|| GenError::invalid_spec("newInstance returned null"))?;
        Ok(BeanMap { map })
    }

    pub fn bean(&self) -> Option<ObjRef> {
        self.map.get_field(BEAN_FIELD)?.as_object().cloned()
    }

    pub fn set_bean(&self, bean: Option<&ObjRef>) -> Result<(), BeanError> {
        let value = bean.map_or(Value::NULL, |b| Value::object(Arc::clone(b)));
        self.map.set_field(BEAN_FIELD, value)?;
        Ok(())
    }

    fn call(&self, sig: &Signature, args: Vec<Value>) -> Result<Value, BeanError> {
        let result = invoke_virtual(&self.map, sig.name(), &sig.desc().descriptor(), args)?;
        Ok(result.unwrap_or(Value::NULL))
    }

    fn bean_value(&self) -> Result<Value, BeanError> {
        self.bean()
            .map(Value::object)
            .ok_or(BeanError::NoBean)
    }

    /// Unbox `value` when `key` names a primitive property.
    fn unboxed(&self, key: &str, value: Value) -> Result<Value, BeanError> {
        if !self.property_type(key)?.is_some_and(|ty| ty.is_primitive()) {
            return Ok(value);
        }
        let unboxed = value.as_object().and_then(unbox);
        Ok(unboxed.unwrap_or(value))
    }

    /// The value of property `key`; null for unknown keys.
    pub fn get(&self, key: &str) -> Result<Value, BeanError> {
        let args = vec![self.bean_value()?, Value::object(new_string(key))];
        let value = self.call(&get_signature(), args)?;
        self.unboxed(key, value)
    }

    /// Set property `key`, returning its previous value. Primitive values
    /// are boxed as the property's type.
    pub fn put(&self, key: &str, value: Value) -> Result<Value, BeanError> {
        let value = if value.as_reference().is_some() {
            value
        } else {
            let ty = match self.property_type(key)? {
                Some(ty) if ty.is_primitive() => ty,
                _ => value_type(&value),
            };
            Value::object(box_value(&ty, value)?)
        };
        let args = vec![self.bean_value()?, Value::object(new_string(key)), value];
        let previous = self.call(&put_signature(), args)?;
        self.unboxed(key, previous)
    }

    /// Property names, sorted.
    pub fn keys(&self) -> Result<Vec<String>, BeanError> {
        let keys = self.call(&keys_signature(), Vec::new())?;
        let items = keys
            .as_object()
            .and_then(|array| array.array_items())
            .unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|item| item.as_object()?.as_str().map(str::to_owned))
            .collect())
    }

    pub fn contains_key(&self, key: &str) -> Result<bool, BeanError> {
        Ok(self.keys()?.iter().any(|k| k == key))
    }

    pub fn len(&self) -> Result<usize, BeanError> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, BeanError> {
        Ok(self.len()? == 0)
    }

    /// Type of property `key`, `None` for unknown keys.
    pub fn property_type(&self, key: &str) -> Result<Option<Type>, BeanError> {
        let desc = self.call(&property_type_signature(), vec![Value::object(new_string(key))])?;
        Ok(desc
            .as_object()
            .and_then(|d| d.as_str())
            .and_then(|d| Type::parse(d).ok()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
