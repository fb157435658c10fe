//! Runtime and definition errors.

use kiln_ir::IrError;

use crate::value::ObjRef;

/// Failure while executing guest code or resolving its references.
#[derive(Clone, Debug, thiserror::Error)]
pub enum VmError {
    /// A guest exception escaped to the host.
    #[error("uncaught {}", describe(.0))]
    Thrown(ObjRef),

    /// A symbolic reference could not be resolved.
    #[error("link error: {0}")]
    Link(String),

    /// Guest code did something its instruction stream cannot mean.
    #[error("verify error in {method}: {message}")]
    Verify { method: String, message: String },

    /// The scope owning a class went away while it was still in use.
    #[error("module scope was dropped")]
    ScopeDropped,
}

impl VmError {
    pub(crate) fn link(message: impl Into<String>) -> Self {
        VmError::Link(message.into())
    }

    pub(crate) fn verify(method: impl Into<String>, message: impl Into<String>) -> Self {
        VmError::Verify {
            method: method.into(),
            message: message.into(),
        }
    }

    /// The thrown guest object, if this is a guest exception.
    pub fn thrown(&self) -> Option<&ObjRef> {
        match self {
            VmError::Thrown(obj) => Some(obj),
            _ => None,
        }
    }

    /// Class name of the thrown guest object.
    pub fn thrown_class(&self) -> Option<&str> {
        self.thrown().map(|obj| obj.class().name())
    }
}

fn describe(obj: &ObjRef) -> String {
    match crate::core::throwable_message(obj) {
        Some(message) => format!("{}: {message}", obj.class().name()),
        None => obj.class().name().to_owned(),
    }
}

/// Failure while defining a unit into a module scope.
#[derive(Debug, thiserror::Error)]
pub enum DefineError {
    #[error("malformed unit: {0}")]
    Decode(#[from] IrError),

    #[error("`{name}` is already defined in this scope")]
    Duplicate { name: String },

    #[error("supertype `{super_name}` of `{name}` not found")]
    SuperNotFound { name: String, super_name: String },

    #[error("interface `{interface}` of `{name}` not found")]
    InterfaceNotFound { name: String, interface: String },

    #[error("cannot link `{name}`: {message}")]
    Link { name: String, message: String },

    #[error("static initializer of `{name}` failed")]
    Initializer {
        name: String,
        #[source]
        source: VmError,
    },
}
