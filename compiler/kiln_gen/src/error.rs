//! Engine errors.

use std::path::PathBuf;

use kiln_emit::EmitError;
use kiln_vm::{DefineError, VmError};

use crate::key::KeyError;

/// Failure of a generation request.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// The emitters rejected the described unit.
    #[error("code generation failed: {0}")]
    CodeGeneration(#[from] EmitError),

    /// The generation spec cannot be realized.
    #[error("invalid generation spec: {0}")]
    InvalidSpec(String),

    /// A structural key could not be built.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The host scope refused the unit.
    #[error("cannot define `{name}`")]
    Define {
        name: String,
        #[source]
        source: DefineError,
    },

    /// Guest code failed while instantiating or running a generated unit.
    #[error(transparent)]
    Runtime(#[from] VmError),

    /// The debug sink could not write a dump.
    #[error("cannot write debug dump {}", path.display())]
    DebugSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GenError {
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        GenError::InvalidSpec(message.into())
    }

    /// The guest exception behind this error, if any.
    pub fn thrown_class(&self) -> Option<&str> {
        match self {
            GenError::Runtime(err) => err.thrown_class(),
            _ => None,
        }
    }
}
