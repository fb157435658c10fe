//! Binary encoding of [`UnitDef`].
//!
//! Layout (all integers big-endian, strings u16-length-prefixed UTF-8):
//!
//! ```text
//! magic "KILN"  version:u16
//! access:u16 name  [super]  interfaces:u16 * name  [source]
//! pool:u16 * (tag:u8 payload)
//! fields:u16 * (access:u16 name descriptor constant:u16)
//! methods:u16 * (access:u16 name descriptor exceptions:u16 * name [code])
//! code := max_stack:u16 max_locals:u16 len:u32 bytes handlers:u16 * handler
//! handler := start:u32 end:u32 handler:u32 [catch_type]
//! ```
//!
//! `[x]` is a presence byte (0/1) followed by `x` when present.

use crate::bytes::{put_string, ByteReader};
use crate::unit::UNIT_VERSION;
use crate::{
    Access, Code, Constant, ConstantPool, FieldDef, Handler, IrError, MethodDef, Type, UnitDef,
};

const MAGIC: &[u8; 4] = b"KILN";

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Write the item count of a unit section as u16.
fn put_len(out: &mut Vec<u8>, what: &'static str, len: usize) -> Result<(), IrError> {
    let count = u16::try_from(len).map_err(|_| IrError::TooLarge {
        what,
        len,
        limit: usize::from(u16::MAX),
    })?;
    put_u16(out, count);
    Ok(())
}

fn put_opt_string(out: &mut Vec<u8>, s: Option<&str>) -> Result<(), IrError> {
    match s {
        Some(s) => {
            out.push(1);
            put_string(out, s)
        }
        None => {
            out.push(0);
            Ok(())
        }
    }
}

fn read_opt_string(r: &mut ByteReader<'_>) -> Result<Option<String>, IrError> {
    Ok(match r.u8()? {
        0 => None,
        _ => Some(r.string()?),
    })
}

impl UnitDef {
    /// Encode into the defining byte form.
    ///
    /// Fails when a string or a section outgrows the format's u16 limits.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IrError> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(MAGIC);
        put_u16(&mut out, UNIT_VERSION);
        put_u16(&mut out, self.access.bits());
        put_string(&mut out, &self.name)?;
        put_opt_string(&mut out, self.super_name.as_deref())?;
        put_len(&mut out, "interface list", self.interfaces.len())?;
        for iface in &self.interfaces {
            put_string(&mut out, iface)?;
        }
        put_opt_string(&mut out, self.source.as_deref())?;

        put_len(&mut out, "constant pool", self.pool.len())?;
        for constant in self.pool.entries() {
            encode_constant(&mut out, constant)?;
        }

        put_len(&mut out, "field list", self.fields.len())?;
        for field in &self.fields {
            put_u16(&mut out, field.access.bits());
            put_string(&mut out, &field.name)?;
            put_string(&mut out, &field.ty.descriptor())?;
            put_u16(&mut out, field.constant.unwrap_or(0));
        }

        put_len(&mut out, "method list", self.methods.len())?;
        for method in &self.methods {
            put_u16(&mut out, method.access.bits());
            put_string(&mut out, &method.name)?;
            put_string(&mut out, &method.desc)?;
            put_len(&mut out, "exception list", method.exceptions.len())?;
            for exc in &method.exceptions {
                put_string(&mut out, exc)?;
            }
            match &method.code {
                Some(code) => {
                    out.push(1);
                    encode_code(&mut out, code)?;
                }
                None => out.push(0),
            }
        }
        Ok(out)
    }

    /// Decode the defining byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IrError> {
        let mut r = ByteReader::new(bytes);
        if r.take(4).map_err(|_| IrError::BadMagic)? != MAGIC {
            return Err(IrError::BadMagic);
        }
        let version = r.u16()?;
        if version != UNIT_VERSION {
            return Err(IrError::UnsupportedVersion {
                found: version,
                expected: UNIT_VERSION,
            });
        }
        let access = Access::from_bits_retain(r.u16()?);
        let name = r.string()?;
        let super_name = read_opt_string(&mut r)?;
        let interfaces = (0..r.u16()?)
            .map(|_| r.string())
            .collect::<Result<Vec<_>, _>>()?;
        let source = read_opt_string(&mut r)?;

        let pool_len = usize::from(r.u16()?);
        let mut entries = Vec::with_capacity(pool_len);
        for index in 1..=pool_len {
            entries.push(decode_constant(&mut r, index)?);
        }
        let pool = ConstantPool::from_entries(entries);

        let mut fields = Vec::new();
        for _ in 0..r.u16()? {
            let access = Access::from_bits_retain(r.u16()?);
            let name = r.string()?;
            let ty = Type::parse(&r.string()?)?;
            let constant = match r.u16()? {
                0 => None,
                idx => Some(idx),
            };
            fields.push(FieldDef {
                access,
                name,
                ty,
                constant,
            });
        }

        let mut methods = Vec::new();
        for _ in 0..r.u16()? {
            let access = Access::from_bits_retain(r.u16()?);
            let name = r.string()?;
            let desc = r.string()?;
            let exceptions = (0..r.u16()?)
                .map(|_| r.string())
                .collect::<Result<Vec<_>, _>>()?;
            let code = match r.u8()? {
                0 => None,
                _ => Some(decode_code(&mut r)?),
            };
            methods.push(MethodDef {
                access,
                name,
                desc,
                exceptions,
                code,
            });
        }

        if !r.is_empty() {
            return Err(IrError::TrailingBytes {
                count: r.remaining(),
            });
        }

        Ok(UnitDef {
            access,
            name,
            super_name,
            interfaces,
            source,
            pool,
            fields,
            methods,
        })
    }
}

fn encode_constant(out: &mut Vec<u8>, constant: &Constant) -> Result<(), IrError> {
    out.push(constant.tag());
    match constant {
        Constant::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
        Constant::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        Constant::Float(bits) => out.extend_from_slice(&bits.to_be_bytes()),
        Constant::Double(bits) => out.extend_from_slice(&bits.to_be_bytes()),
        Constant::Str(s) | Constant::Class(s) => put_string(out, s)?,
        Constant::Field { owner, name, desc } | Constant::Method { owner, name, desc, .. } => {
            put_string(out, owner)?;
            put_string(out, name)?;
            put_string(out, desc)?;
        }
    }
    Ok(())
}

fn decode_constant(r: &mut ByteReader<'_>, index: usize) -> Result<Constant, IrError> {
    let tag = r.u8()?;
    Ok(match tag {
        1 => Constant::Int(r.i32()?),
        2 => Constant::Long(r.i64()?),
        3 => Constant::Float(r.u32()?),
        4 => Constant::Double(r.u64()?),
        5 => Constant::Str(r.string()?),
        6 => Constant::Class(r.string()?),
        7 => Constant::Field {
            owner: r.string()?,
            name: r.string()?,
            desc: r.string()?,
        },
        8 | 9 => Constant::Method {
            owner: r.string()?,
            name: r.string()?,
            desc: r.string()?,
            interface: tag == 9,
        },
        _ => return Err(IrError::UnknownConstantTag { tag, index }),
    })
}

fn encode_code(out: &mut Vec<u8>, code: &Code) -> Result<(), IrError> {
    put_u16(out, code.max_stack);
    put_u16(out, code.max_locals);
    let len = u32::try_from(code.bytes.len()).map_err(|_| IrError::TooLarge {
        what: "code body",
        len: code.bytes.len(),
        limit: usize::try_from(u32::MAX).unwrap_or(usize::MAX),
    })?;
    put_u32(out, len);
    out.extend_from_slice(&code.bytes);
    put_len(out, "handler table", code.handlers.len())?;
    for handler in &code.handlers {
        put_u32(out, handler.start);
        put_u32(out, handler.end);
        put_u32(out, handler.handler);
        put_opt_string(out, handler.catch_type.as_deref())?;
    }
    Ok(())
}

fn decode_code(r: &mut ByteReader<'_>) -> Result<Code, IrError> {
    let max_stack = r.u16()?;
    let max_locals = r.u16()?;
    let len = r.u32()? as usize;
    let bytes = r.take(len)?.to_vec();
    let mut handlers = Vec::new();
    for _ in 0..r.u16()? {
        handlers.push(Handler {
            start: r.u32()?,
            end: r.u32()?,
            handler: r.u32()?,
            catch_type: read_opt_string(r)?,
        });
    }
    Ok(Code {
        max_stack,
        max_locals,
        bytes,
        handlers,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
