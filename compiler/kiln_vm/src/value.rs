//! Runtime values and heap objects.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use kiln_ir::Type;

use crate::class::Class;
use crate::VmError;

/// Shared handle to a heap object.
pub type ObjRef = Arc<Object>;

/// A value on the operand stack, in a local or in a field.
///
/// `long` and `double` are single values here; their two-slot width only
/// matters to the local layout (the second slot holds [`Value::Top`]).
#[derive(Clone, Default)]
pub enum Value {
    /// Unusable slot: the upper half of a wide local, or never written.
    #[default]
    Top,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Option<ObjRef>),
}

impl Value {
    pub const NULL: Value = Value::Ref(None);

    pub fn object(obj: ObjRef) -> Self {
        Value::Ref(Some(obj))
    }

    /// Default value of a field or array element of `ty`.
    pub fn zero(ty: &Type) -> Self {
        match ty {
            Type::Long => Value::Long(0),
            Type::Float => Value::Float(0.0),
            Type::Double => Value::Double(0.0),
            Type::Object(_) | Type::Array(_) | Type::Void => Value::NULL,
            _ => Value::Int(0),
        }
    }

    /// Two-slot values.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub(crate) fn slots(&self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The reference: `Some(None)` for null, `None` for a non-reference.
    pub fn as_reference(&self) -> Option<Option<&ObjRef>> {
        match self {
            Value::Ref(r) => Some(r.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Ref(Some(obj)) => Some(obj),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Ref(None))
    }
}

/// Exact comparison: floats by bit pattern, references by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Top, Value::Top) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Ref(a), Value::Ref(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Top => f.write_str("top"),
            Value::Int(v) => write!(f, "{v}i"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}d"),
            Value::Ref(None) => f.write_str("null"),
            Value::Ref(Some(obj)) => write!(f, "{obj:?}"),
        }
    }
}

// ── Objects ─────────────────────────────────────────────────────────

/// Payload of a heap object.
pub enum ObjectKind {
    /// Ordinary instance; one slot per field of the class layout.
    Plain(Mutex<Vec<Value>>),
    /// Immutable string.
    Str(Arc<str>),
    /// Array of `elem`.
    Array { elem: Type, items: Mutex<Vec<Value>> },
}

/// A heap object: its class and payload.
pub struct Object {
    class: Arc<Class>,
    kind: ObjectKind,
}

impl Object {
    pub(crate) fn new(class: Arc<Class>, kind: ObjectKind) -> ObjRef {
        Arc::new(Object { class, kind })
    }

    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Snapshot of an array's elements.
    pub fn array_items(&self) -> Option<Vec<Value>> {
        match &self.kind {
            ObjectKind::Array { items, .. } => Some(items.lock().clone()),
            _ => None,
        }
    }

    /// Identity hash, stable for the object's lifetime.
    pub fn identity_hash(self: &Arc<Self>) -> i32 {
        let addr = Arc::as_ptr(self) as usize as u64;
        ((addr >> 4) ^ (addr >> 36)) as i32
    }

    /// Read an instance field by name (searching the class layout).
    pub fn get_field(&self, name: &str) -> Option<Value> {
        let slot = self.class.instance_slot(name)?;
        match &self.kind {
            ObjectKind::Plain(fields) => fields.lock().get(slot).cloned(),
            _ => None,
        }
    }

    /// Write an instance field by name.
    pub fn set_field(&self, name: &str, value: Value) -> Result<(), VmError> {
        let slot = self
            .class
            .instance_slot(name)
            .ok_or_else(|| VmError::link(format!("no field {name} on {}", self.class.name())))?;
        self.set_slot(slot, value)
    }

    pub(crate) fn get_slot(&self, slot: usize) -> Result<Value, VmError> {
        match &self.kind {
            ObjectKind::Plain(fields) => fields
                .lock()
                .get(slot)
                .cloned()
                .ok_or_else(|| VmError::link(format!("bad field slot {slot}"))),
            _ => Err(VmError::link(format!(
                "field access on non-instance {}",
                self.class.name()
            ))),
        }
    }

    pub(crate) fn set_slot(&self, slot: usize, value: Value) -> Result<(), VmError> {
        match &self.kind {
            ObjectKind::Plain(fields) => match fields.lock().get_mut(slot) {
                Some(field) => {
                    *field = value;
                    Ok(())
                }
                None => Err(VmError::link(format!("bad field slot {slot}"))),
            },
            _ => Err(VmError::link(format!(
                "field access on non-instance {}",
                self.class.name()
            ))),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ObjectKind::Str(s) => write!(f, "{s:?}"),
            ObjectKind::Array { elem, items } => write!(f, "{elem}[{}]", items.lock().len()),
            ObjectKind::Plain(_) => write!(f, "{}@{:p}", self.class.name(), self),
        }
    }
}
