//! Structural cache keys.
//!
//! A [`KeyShape`] lists the kinds of a key's fields. [`KeyFactory::for_shape`]
//! hands out one process-wide factory per shape; the factory validates
//! values against the shape and produces [`Key`]s whose equality and hash
//! are structural. A `None` reference field is an ordinary value: two keys
//! with `None` in the same slot agree on that slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Kind of one key field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Str,
    Bool,
    Int,
    Long,
    Double,
    /// Internal name of a class.
    TypeName,
    /// A nested key.
    Key,
}

/// Field kinds of a key, in order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyShape(SmallVec<[KeyKind; 4]>);

impl KeyShape {
    pub fn new(kinds: impl IntoIterator<Item = KeyKind>) -> Self {
        KeyShape(kinds.into_iter().collect())
    }

    pub fn kinds(&self) -> &[KeyKind] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One field value.
#[derive(Clone, Debug)]
pub enum KeyValue {
    Str(Option<Arc<str>>),
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    TypeName(Option<Arc<str>>),
    Key(Option<Key>),
}

impl KeyValue {
    pub fn type_name(name: &str) -> Self {
        KeyValue::TypeName(Some(Arc::from(name)))
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            KeyValue::Str(_) => KeyKind::Str,
            KeyValue::Bool(_) => KeyKind::Bool,
            KeyValue::Int(_) => KeyKind::Int,
            KeyValue::Long(_) => KeyKind::Long,
            KeyValue::Double(_) => KeyKind::Double,
            KeyValue::TypeName(_) => KeyKind::TypeName,
            KeyValue::Key(_) => KeyKind::Key,
        }
    }

    /// Doubles compare by bit pattern with every NaN collapsed to one.
    fn double_bits(v: f64) -> u64 {
        if v.is_nan() {
            f64::NAN.to_bits()
        } else {
            v.to_bits()
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeyValue::Str(a), KeyValue::Str(b))
            | (KeyValue::TypeName(a), KeyValue::TypeName(b)) => a == b,
            (KeyValue::Bool(a), KeyValue::Bool(b)) => a == b,
            (KeyValue::Int(a), KeyValue::Int(b)) => a == b,
            (KeyValue::Long(a), KeyValue::Long(b)) => a == b,
            (KeyValue::Double(a), KeyValue::Double(b)) => {
                Self::double_bits(*a) == Self::double_bits(*b)
            }
            (KeyValue::Key(a), KeyValue::Key(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            KeyValue::Str(s) | KeyValue::TypeName(s) => s.hash(state),
            KeyValue::Bool(b) => b.hash(state),
            KeyValue::Int(v) => v.hash(state),
            KeyValue::Long(v) => v.hash(state),
            KeyValue::Double(v) => Self::double_bits(*v).hash(state),
            KeyValue::Key(k) => k.hash(state),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Str(Some(Arc::from(s)))
    }
}

impl From<Option<&str>> for KeyValue {
    fn from(s: Option<&str>) -> Self {
        KeyValue::Str(s.map(Arc::from))
    }
}

impl From<bool> for KeyValue {
    fn from(b: bool) -> Self {
        KeyValue::Bool(b)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        KeyValue::Int(v)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Long(v)
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Double(v)
    }
}

impl From<Key> for KeyValue {
    fn from(k: Key) -> Self {
        KeyValue::Key(Some(k))
    }
}

/// A structural key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    shape: Arc<KeyShape>,
    values: Arc<[KeyValue]>,
}

impl Key {
    pub fn shape(&self) -> &KeyShape {
        &self.shape
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&KeyValue> {
        self.values.get(index)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&&*self.values).finish()
    }
}

/// A value did not fit the factory's shape.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key expects {expected} values, got {found}")]
    Arity { expected: usize, found: usize },

    #[error("key field {index} expects {expected:?}, got {found:?}")]
    Kind {
        index: usize,
        expected: KeyKind,
        found: KeyKind,
    },
}

/// Builds keys of one shape.
#[derive(Debug)]
pub struct KeyFactory {
    shape: Arc<KeyShape>,
}

impl KeyFactory {
    /// The process-wide factory for `shape`.
    pub fn for_shape(shape: &KeyShape) -> Arc<KeyFactory> {
        static FACTORIES: OnceLock<Mutex<FxHashMap<KeyShape, Arc<KeyFactory>>>> = OnceLock::new();
        let mut factories = FACTORIES.get_or_init(Mutex::default).lock();
        Arc::clone(factories.entry(shape.clone()).or_insert_with(|| {
            tracing::trace!(?shape, "new key factory");
            Arc::new(KeyFactory {
                shape: Arc::new(shape.clone()),
            })
        }))
    }

    pub fn shape(&self) -> &KeyShape {
        &self.shape
    }

    /// Build a key, checking arity and field kinds.
    pub fn create(&self, values: impl IntoIterator<Item = KeyValue>) -> Result<Key, KeyError> {
        let values: Arc<[KeyValue]> = values.into_iter().collect();
        if values.len() != self.shape.len() {
            return Err(KeyError::Arity {
                expected: self.shape.len(),
                found: values.len(),
            });
        }
        for (index, (value, &expected)) in values.iter().zip(self.shape.kinds()).enumerate() {
            let found = value.kind();
            if found != expected {
                return Err(KeyError::Kind {
                    index,
                    expected,
                    found,
                });
            }
        }
        Ok(Key {
            shape: Arc::clone(&self.shape),
            values,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
