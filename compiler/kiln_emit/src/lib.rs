//! Emitters for Kiln units.
//!
//! # Architecture
//!
//! - [`TypeEmitter`] builds a whole unit: supertype, interfaces, fields,
//!   methods and the merged static initializer. [`TypeEmitter::end_type`]
//!   yields a [`kiln_ir::UnitDef`].
//! - [`CodeEmitter`] builds one method body on behalf of its type emitter:
//!   locals, constants, arithmetic, branches, boxing, arrays, field and
//!   method access, exception regions and switches.
//! - [`emit_utils`] holds recipes built from both (string switch, null
//!   constructor, property accessors).
//!
//! # Stack accounting
//!
//! Every instruction updates a tracked operand stack depth, so `max_stack`
//! and `max_locals` never need to be supplied by hand. Labels remember the
//! depth they are first reached with; a later branch or fall-through with a
//! different depth is reported when the method ends.

mod body;
mod code;
pub mod emit_utils;
mod error;
mod refs;
mod switch;
mod type_emitter;

pub use body::{Label, Local};
pub use code::{Block, CmpMode, CodeEmitter, MathOp};
pub use error::EmitError;
pub use refs::{FieldRef, MethodRef};
pub use switch::{SwitchCallback, SwitchStrategy};
pub use type_emitter::TypeEmitter;
