//! Unit format for the Kiln code generator.
//!
//! This crate defines everything that crosses the boundary between the
//! emitters (`kiln_emit`) and the host runtime (`kiln_vm`):
//!
//! - **Types** ([`Type`], [`MethodDesc`], [`Signature`]) and their descriptor
//!   strings.
//! - **Access flags** ([`Access`]).
//! - **Opcodes** ([`Opcode`]) and the shared instruction decoder
//!   ([`insn::decode`]).
//! - **Constant pool** ([`ConstantPool`], [`Constant`]).
//! - **Unit definitions** ([`UnitDef`], [`FieldDef`], [`MethodDef`],
//!   [`Code`]) with a binary encoding ([`UnitDef::to_bytes`],
//!   [`UnitDef::from_bytes`]) and a disassembler ([`disassemble`]).
//!
//! The encoded byte form is what a generator hands to a module scope; the
//! scope decodes, links and defines it.

mod bytes;
mod codec;
mod disasm;
mod error;
mod flags;
mod hash;
pub mod insn;
pub mod opcode;
mod pool;
mod types;
mod unit;
pub mod well_known;

pub use disasm::disassemble;
pub use error::IrError;
pub use flags::Access;
pub use hash::string_hash;
pub use insn::{Insn, Operand};
pub use opcode::{Opcode, OperandKind};
pub use pool::{Constant, ConstantPool};
pub use types::{MethodDesc, Signature, Type};
pub use unit::{Code, FieldDef, Handler, MethodDef, UnitDef, UNIT_VERSION};
