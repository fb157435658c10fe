//! Host runtime for Kiln units.
//!
//! Generated units are defined into a [`ModuleScope`]. A scope decodes the
//! unit, links it against classes visible from the scope (parent chain
//! first, ending at the [system scope](ModuleScope::system) that holds the
//! core class library), runs its static initializer, and from then on hands
//! out the [`Class`].
//!
//! Classes hold their scope weakly. Dropping every handle to a scope drops
//! the classes defined in it once no instance keeps them alive, which is
//! what lets generator caches key on scope liveness.

mod class;
mod core;
mod error;
mod interp;
mod scope;
mod value;

pub use class::{invoke_virtual, is_instance_of, Class, FieldInfo, Method, NativeFn};
pub use core::{box_value, new_array, new_string, throwable_cause, throwable_message, unbox};
pub use error::{DefineError, VmError};
pub use scope::{CurrentScopeGuard, ModuleScope, ScopeId, WeakScope};
pub use value::{ObjRef, Object, ObjectKind, Value};
