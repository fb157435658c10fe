//! The unit definition: everything a module scope needs to define a class.

use crate::{Access, ConstantPool, MethodDesc, Type};

/// Format version written into encoded units.
pub const UNIT_VERSION: u16 = 1;

/// A complete, emitted type definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitDef {
    pub access: Access,
    /// Internal name, e.g. `kiln/beans/BeanCopier$$SourceByKiln$$1f`.
    pub name: String,
    /// Supertype internal name; `None` only for the root class.
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    /// Logical source the unit was generated from, if recorded.
    pub source: Option<String>,
    pub pool: ConstantPool,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

impl UnitDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.desc == desc)
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }
}

/// A declared field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub access: Access,
    pub name: String,
    pub ty: Type,
    /// Pool index of the initial constant value for static fields.
    pub constant: Option<u16>,
}

/// A declared method, with code unless abstract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDef {
    pub access: Access,
    pub name: String,
    pub desc: String,
    pub exceptions: Vec<String>,
    pub code: Option<Code>,
}

impl MethodDef {
    /// Parsed descriptor. Descriptors in emitted units are always valid.
    pub fn method_desc(&self) -> Result<MethodDesc, crate::IrError> {
        MethodDesc::parse(&self.desc)
    }
}

/// A method body: the frozen instruction stream plus bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    pub handlers: Vec<Handler>,
}

/// One exception table entry. Offsets are byte offsets into [`Code::bytes`];
/// the protected range is `start..end`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handler {
    pub start: u32,
    pub end: u32,
    pub handler: u32,
    /// Caught class name; `None` catches everything.
    pub catch_type: Option<String>,
}
