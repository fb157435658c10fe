//! Errors produced while parsing descriptors or decoding unit bytes.

use thiserror::Error;

/// Failure to parse a descriptor or decode an encoded unit.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("invalid type descriptor `{0}`")]
    InvalidDescriptor(String),

    #[error("invalid method descriptor `{0}`")]
    InvalidMethodDescriptor(String),

    #[error("unit bytes do not start with the kiln magic")]
    BadMagic,

    #[error("unsupported unit format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("unexpected end of input at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown opcode 0x{byte:02x} at code offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("unknown constant tag {tag} at pool index {index}")]
    UnknownConstantTag { tag: u8, index: usize },

    #[error("constant pool index {index} out of range or of the wrong kind (expected {expected})")]
    BadPoolIndex { index: u16, expected: &'static str },

    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    BadBranchTarget { offset: u32, target: i64 },

    #[error("invalid array type code {0}")]
    BadArrayType(u8),

    #[error("string at byte {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("{count} trailing bytes after unit end")]
    TrailingBytes { count: usize },

    #[error("{what} of {len} exceeds the unit format limit of {limit}")]
    TooLarge {
        what: &'static str,
        len: usize,
        limit: usize,
    },
}
