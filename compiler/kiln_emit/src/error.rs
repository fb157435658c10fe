//! Emitter errors.
//!
//! These report misuse of the emitters (an inconsistent field redeclaration,
//! an ordering comparison on references, a label that was never bound).
//! Structural problems detected while emitting individual instructions are
//! recorded on the method body and reported once by `end_method`.

use kiln_ir::{IrError, Type};

use crate::code::CmpMode;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    #[error("field `{name}` already declared with different access, type or value")]
    FieldDeclaredDifferently { name: String },

    #[error("no field `{name}` declared on `{owner}`")]
    UnknownField { owner: String, name: String },

    #[error("cannot compare values of type {ty} with {mode:?}")]
    ReferenceOrdering { ty: Type, mode: CmpMode },

    #[error("invalid arithmetic: {op} on {ty}")]
    InvalidMath { op: &'static str, ty: Type },

    #[error("switch keys must be strictly ascending (key #{index} is out of order)")]
    UnsortedSwitchKeys { index: usize },

    #[error("static hook requested on interface type `{name}`")]
    StaticHookOnInterface { name: String },

    #[error("catch requested for a block whose end is not marked")]
    BlockNotEnded,

    #[error("label L{label} is used but never marked in `{method}`")]
    UnboundLabel { label: u32, method: String },

    #[error("label L{label} marked twice")]
    LabelRebound { label: u32 },

    #[error("operand stack underflow at offset {offset} in `{method}`")]
    StackUnderflow { offset: u32, method: String },

    #[error("inconsistent stack depth at offset {offset}: {expected} vs {found}")]
    StackMismatch {
        offset: u32,
        expected: u16,
        found: u16,
    },

    #[error("argument {index} out of range; method takes {count}")]
    ArgumentOutOfRange { index: usize, count: usize },

    #[error("`this` is not available in static method `{method}`")]
    NoReceiver { method: String },

    #[error("method `{method}` is still open")]
    MethodNotEnded { method: String },

    #[error("too many locals in `{method}`")]
    TooManyLocals { method: String },

    #[error("method body for `{method}` exceeds the maximum code size")]
    CodeTooLarge { method: String },

    #[error("constant pool of `{unit}` is full")]
    TooManyConstants { unit: String },

    /// The finished unit does not fit the encoded form.
    #[error("cannot encode unit: {0}")]
    Encoding(#[from] IrError),
}
