//! Decoded instructions.
//!
//! [`decode`] turns a frozen instruction stream back into a list of
//! [`Insn`]s with branch targets resolved to absolute byte offsets. It is the
//! single decoder shared by the disassembler and the runtime linker.

use rustc_hash::FxHashSet;

use crate::bytes::ByteReader;
use crate::opcode::{Opcode, OperandKind};
use crate::{IrError, Type};

/// Decoded operand of an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Immediate from `BIPUSH`/`SIPUSH`.
    Int(i32),
    Local(u16),
    Iinc { local: u16, delta: i16 },
    Pool(u16),
    /// Absolute byte offset of the branch target.
    Branch(u32),
    ArrayType(Type),
    Table {
        default: u32,
        low: i32,
        targets: Vec<u32>,
    },
    Lookup {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
}

/// One decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Insn {
    /// Byte offset of the opcode within the stream.
    pub offset: u32,
    pub op: Opcode,
    pub operand: Operand,
}

impl Insn {
    /// All branch targets of this instruction (absolute offsets).
    pub fn targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Branch(t) => vec![*t],
            Operand::Table {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Operand::Lookup { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, t)| *t))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn target(base: u32, rel: i32) -> Result<u32, IrError> {
    let abs = i64::from(base) + i64::from(rel);
    u32::try_from(abs).map_err(|_| IrError::BadBranchTarget {
        offset: base,
        target: abs,
    })
}

fn offset_of(pos: usize) -> Result<u32, IrError> {
    u32::try_from(pos).map_err(|_| IrError::Truncated {
        offset: pos,
        needed: 0,
    })
}

/// Decode an instruction stream, verifying every branch lands on an
/// instruction boundary.
pub fn decode(code: &[u8]) -> Result<Vec<Insn>, IrError> {
    let mut reader = ByteReader::new(code);
    let mut insns = Vec::new();

    while !reader.is_empty() {
        let offset = offset_of(reader.pos())?;
        let byte = reader.u8()?;
        let op = Opcode::from_byte(byte).ok_or(IrError::UnknownOpcode {
            byte,
            offset: reader.pos() - 1,
        })?;

        let operand = match op.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::I8 => Operand::Int(i32::from(reader.i8()?)),
            OperandKind::I16 => Operand::Int(i32::from(reader.i16()?)),
            OperandKind::Local => Operand::Local(reader.u16()?),
            OperandKind::Iinc => Operand::Iinc {
                local: reader.u16()?,
                delta: reader.i16()?,
            },
            OperandKind::Pool => Operand::Pool(reader.u16()?),
            OperandKind::Branch => Operand::Branch(target(offset, reader.i32()?)?),
            OperandKind::ArrayType => Operand::ArrayType(Type::from_array_type_code(reader.u8()?)?),
            OperandKind::TableSwitch => {
                let default = target(offset, reader.i32()?)?;
                let low = reader.i32()?;
                let high = reader.i32()?;
                let count = i64::from(high) - i64::from(low) + 1;
                let count = usize::try_from(count).map_err(|_| IrError::Truncated {
                    offset: reader.pos(),
                    needed: 0,
                })?;
                let mut targets = Vec::with_capacity(count.min(reader.remaining() / 4));
                for _ in 0..count {
                    targets.push(target(offset, reader.i32()?)?);
                }
                Operand::Table {
                    default,
                    low,
                    targets,
                }
            }
            OperandKind::LookupSwitch => {
                let default = target(offset, reader.i32()?)?;
                let npairs = reader.u32()? as usize;
                let mut pairs = Vec::with_capacity(npairs.min(reader.remaining() / 8));
                for _ in 0..npairs {
                    let key = reader.i32()?;
                    pairs.push((key, target(offset, reader.i32()?)?));
                }
                Operand::Lookup { default, pairs }
            }
        };

        insns.push(Insn {
            offset,
            op,
            operand,
        });
    }

    let boundaries: FxHashSet<u32> = insns.iter().map(|i| i.offset).collect();
    for insn in &insns {
        for t in insn.targets() {
            if !boundaries.contains(&t) {
                return Err(IrError::BadBranchTarget {
                    offset: insn.offset,
                    target: i64::from(t),
                });
            }
        }
    }

    Ok(insns)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
