//! Value types and method descriptors.
//!
//! Descriptors use the classic stack-machine notation:
//!
//! | Type      | Descriptor       |
//! |-----------|------------------|
//! | `void`    | `V`              |
//! | `boolean` | `Z`              |
//! | `byte`    | `B`              |
//! | `char`    | `C`              |
//! | `short`   | `S`              |
//! | `int`     | `I`              |
//! | `long`    | `J`              |
//! | `float`   | `F`              |
//! | `double`  | `D`              |
//! | object    | `Lcore/String;`  |
//! | array     | `[I`, `[[Lx/Y;`  |
//!
//! A method descriptor is `(<params>)<ret>`, e.g. `(ILcore/String;)V`.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::well_known;
use crate::IrError;

/// A value type understood by the emitter and the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Reference to a named class, by internal name (`core/String`).
    Object(Arc<str>),
    /// Array of the element type.
    Array(Arc<Type>),
}

impl Type {
    /// Reference type for an internal class name.
    pub fn object(name: &str) -> Self {
        Type::Object(Arc::from(name))
    }

    /// Array of `elem`.
    pub fn array_of(elem: Type) -> Self {
        Type::Array(Arc::new(elem))
    }

    /// `core/Object`.
    pub fn object_root() -> Self {
        Self::object(well_known::OBJECT)
    }

    /// `core/String`.
    pub fn string() -> Self {
        Self::object(well_known::STRING)
    }

    /// Number of local/stack slots a value of this type occupies.
    pub fn size(&self) -> u16 {
        match self {
            Type::Void => 0,
            Type::Long | Type::Double => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.size() == 2
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Type::Object(_) | Type::Array(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Object(_) | Type::Array(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    /// Types carried as `int` on the operand stack.
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            Type::Boolean | Type::Byte | Type::Char | Type::Short | Type::Int
        )
    }

    /// Element type of an array, `None` for non-arrays.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Name used in class constants: the internal name for objects, the
    /// descriptor for arrays, `None` for primitives.
    pub fn class_name(&self) -> Option<String> {
        match self {
            Type::Object(name) => Some(name.to_string()),
            Type::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    /// Inverse of [`Type::class_name`].
    pub fn from_class_name(name: &str) -> Result<Self, IrError> {
        if name.starts_with('[') {
            Self::parse(name)
        } else if name.is_empty() || name.contains(';') {
            Err(IrError::InvalidDescriptor(name.to_owned()))
        } else {
            Ok(Self::object(name))
        }
    }

    /// Internal name of the box class for a primitive type.
    pub fn boxed_class(&self) -> Option<&'static str> {
        Some(match self {
            Type::Boolean => well_known::BOOLEAN,
            Type::Byte => well_known::BYTE,
            Type::Char => well_known::CHARACTER,
            Type::Short => well_known::SHORT,
            Type::Int => well_known::INTEGER,
            Type::Long => well_known::LONG,
            Type::Float => well_known::FLOAT,
            Type::Double => well_known::DOUBLE,
            _ => return None,
        })
    }

    /// Array type code used by `NEWARRAY`.
    pub fn array_type_code(&self) -> Option<u8> {
        Some(match self {
            Type::Boolean => 4,
            Type::Char => 5,
            Type::Float => 6,
            Type::Double => 7,
            Type::Byte => 8,
            Type::Short => 9,
            Type::Int => 10,
            Type::Long => 11,
            _ => return None,
        })
    }

    /// Inverse of [`Type::array_type_code`].
    pub fn from_array_type_code(code: u8) -> Result<Self, IrError> {
        Ok(match code {
            4 => Type::Boolean,
            5 => Type::Char,
            6 => Type::Float,
            7 => Type::Double,
            8 => Type::Byte,
            9 => Type::Short,
            10 => Type::Int,
            11 => Type::Long,
            other => return Err(IrError::BadArrayType(other)),
        })
    }

    /// Render the descriptor string.
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            Type::Void => out.push('V'),
            Type::Boolean => out.push('Z'),
            Type::Byte => out.push('B'),
            Type::Char => out.push('C'),
            Type::Short => out.push('S'),
            Type::Int => out.push('I'),
            Type::Long => out.push('J'),
            Type::Float => out.push('F'),
            Type::Double => out.push('D'),
            Type::Object(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            Type::Array(elem) => {
                out.push('[');
                elem.write_descriptor(out);
            }
        }
    }

    /// Parse a complete type descriptor.
    pub fn parse(desc: &str) -> Result<Self, IrError> {
        match Self::parse_prefix(desc) {
            Ok((ty, "")) => Ok(ty),
            _ => Err(IrError::InvalidDescriptor(desc.to_owned())),
        }
    }

    /// Parse one type from the front of `desc`, returning the rest.
    fn parse_prefix(desc: &str) -> Result<(Self, &str), IrError> {
        let invalid = || IrError::InvalidDescriptor(desc.to_owned());
        let mut chars = desc.chars();
        let first = chars.next().ok_or_else(invalid)?;
        let rest = chars.as_str();
        let ty = match first {
            'V' => Type::Void,
            'Z' => Type::Boolean,
            'B' => Type::Byte,
            'C' => Type::Char,
            'S' => Type::Short,
            'I' => Type::Int,
            'J' => Type::Long,
            'F' => Type::Float,
            'D' => Type::Double,
            'L' => {
                let end = rest.find(';').ok_or_else(invalid)?;
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(invalid());
                }
                return Ok((Type::object(name), &rest[end + 1..]));
            }
            '[' => {
                let (elem, rest) = Self::parse_prefix(rest)?;
                if elem == Type::Void {
                    return Err(invalid());
                }
                return Ok((Type::array_of(elem), rest));
            }
            _ => return Err(invalid()),
        };
        Ok((ty, rest))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Boolean => f.write_str("boolean"),
            Type::Byte => f.write_str("byte"),
            Type::Char => f.write_str("char"),
            Type::Short => f.write_str("short"),
            Type::Int => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Object(name) => f.write_str(name),
            Type::Array(elem) => write!(f, "{elem}[]"),
        }
    }
}

/// Parameter and return types of a method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDesc {
    params: SmallVec<[Type; 4]>,
    ret: Type,
}

impl MethodDesc {
    pub fn new(params: impl IntoIterator<Item = Type>, ret: Type) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
        }
    }

    /// `()V`
    pub fn void() -> Self {
        Self::new([], Type::Void)
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn ret(&self) -> &Type {
        &self.ret
    }

    /// Total slot width of the parameters (excluding any receiver).
    pub fn arg_size(&self) -> u16 {
        self.params.iter().map(Type::size).sum()
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for param in &self.params {
            param.write_descriptor(&mut out);
        }
        out.push(')');
        self.ret.write_descriptor(&mut out);
        out
    }

    pub fn parse(desc: &str) -> Result<Self, IrError> {
        let invalid = || IrError::InvalidMethodDescriptor(desc.to_owned());
        let mut rest = desc.strip_prefix('(').ok_or_else(invalid)?;
        let mut params = SmallVec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (param, after) = Type::parse_prefix(rest).map_err(|_| invalid())?;
            if param == Type::Void {
                return Err(invalid());
            }
            params.push(param);
            rest = after;
        }
        let ret = Type::parse(rest).map_err(|_| invalid())?;
        Ok(Self { params, ret })
    }
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// A method name together with its descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    name: Arc<str>,
    desc: MethodDesc,
}

impl Signature {
    pub fn new(name: &str, desc: MethodDesc) -> Self {
        Self {
            name: Arc::from(name),
            desc,
        }
    }

    /// Build a signature from a name and a descriptor string.
    pub fn parse(name: &str, desc: &str) -> Result<Self, IrError> {
        Ok(Self::new(name, MethodDesc::parse(desc)?))
    }

    /// Constructor signature taking `params`.
    pub fn constructor(params: impl IntoIterator<Item = Type>) -> Self {
        Self::new(well_known::CONSTRUCTOR, MethodDesc::new(params, Type::Void))
    }

    /// The static initializer signature `<clinit>()V`.
    pub fn static_init() -> Self {
        Self::new(well_known::STATIC_INIT, MethodDesc::void())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &MethodDesc {
        &self.desc
    }

    pub fn is_constructor(&self) -> bool {
        &*self.name == well_known::CONSTRUCTOR
    }

    pub fn is_static_init(&self) -> bool {
        &*self.name == well_known::STATIC_INIT && self.desc == MethodDesc::void()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.desc)
    }
}
