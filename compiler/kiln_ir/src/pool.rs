//! Constant pool.
//!
//! Entries are deduplicated on insertion; index 0 is never used so a zero
//! index can mean "absent" in encoded form.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::IrError;

/// A constant pool entry.
///
/// Floating-point constants are stored by bit pattern so entries can be
/// hashed and compared exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    /// String literal.
    Str(String),
    /// Class reference by class name (internal name or array descriptor).
    Class(String),
    Field {
        owner: String,
        name: String,
        desc: String,
    },
    Method {
        owner: String,
        name: String,
        desc: String,
        /// Owner is an interface type.
        interface: bool,
    },
}

impl Constant {
    pub fn float(value: f32) -> Self {
        Constant::Float(value.to_bits())
    }

    pub fn double(value: f64) -> Self {
        Constant::Double(value.to_bits())
    }

    /// Wide constants occupy two stack slots when loaded.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Constant::Int(_) => 1,
            Constant::Long(_) => 2,
            Constant::Float(_) => 3,
            Constant::Double(_) => 4,
            Constant::Str(_) => 5,
            Constant::Class(_) => 6,
            Constant::Field { .. } => 7,
            Constant::Method {
                interface: false, ..
            } => 8,
            Constant::Method {
                interface: true, ..
            } => 9,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "int {v}"),
            Constant::Long(v) => write!(f, "long {v}"),
            Constant::Float(bits) => write!(f, "float {}", f32::from_bits(*bits)),
            Constant::Double(bits) => write!(f, "double {}", f64::from_bits(*bits)),
            Constant::Str(s) => write!(f, "string {s:?}"),
            Constant::Class(name) => write!(f, "class {name}"),
            Constant::Field { owner, name, desc } => write!(f, "field {owner}.{name}:{desc}"),
            Constant::Method {
                owner,
                name,
                desc,
                interface,
            } => {
                let kind = if *interface { "imethod" } else { "method" };
                write!(f, "{kind} {owner}.{name}{desc}")
            }
        }
    }
}

/// Deduplicating constant pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: FxHashMap<Constant, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `constant` (or find the existing entry) and return its 1-based index.
    ///
    /// Fails once the pool holds `u16::MAX` entries.
    pub fn add(&mut self, constant: Constant) -> Result<u16, IrError> {
        if let Some(&idx) = self.index.get(&constant) {
            return Ok(idx);
        }
        let len = self.entries.len() + 1;
        let idx = u16::try_from(len).map_err(|_| IrError::TooLarge {
            what: "constant pool",
            len,
            limit: usize::from(u16::MAX),
        })?;
        self.entries.push(constant.clone());
        self.index.insert(constant, idx);
        Ok(idx)
    }

    /// Look up a 1-based index.
    pub fn get(&self, idx: u16) -> Option<&Constant> {
        usize::from(idx)
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
    }

    /// Class name at `idx`, or an error naming the expected kind.
    pub fn class_at(&self, idx: u16) -> Result<&str, IrError> {
        match self.get(idx) {
            Some(Constant::Class(name)) => Ok(name),
            _ => Err(IrError::BadPoolIndex {
                index: idx,
                expected: "class",
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order (index `i` in the slice is pool index `i + 1`).
    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }

    pub(crate) fn from_entries(entries: Vec<Constant>) -> Self {
        let mut pool = Self::new();
        for entry in entries {
            // Decoded pools may legitimately hold duplicates; keep positions.
            let idx = pool.entries.len() + 1;
            pool.entries.push(entry.clone());
            if let Ok(idx) = u16::try_from(idx) {
                pool.index.entry(entry).or_insert(idx);
            }
        }
        pool
    }
}
