//! Bean errors.

use kiln_emit::EmitError;
use kiln_gen::GenError;
use kiln_vm::VmError;

#[derive(Debug, thiserror::Error)]
pub enum BeanError {
    #[error(transparent)]
    Generation(#[from] GenError),

    /// Guest code threw while running a generated adapter.
    #[error(transparent)]
    Runtime(#[from] VmError),

    #[error("invalid property name `{0}`")]
    InvalidPropertyName(String),

    #[error("property `{0}` is declared twice")]
    DuplicateProperty(String),

    #[error("`{0}` cannot be extended")]
    NotExtensible(String),

    #[error("map view has no bean attached")]
    NoBean,

    #[error("copier was created with a converter but none was given")]
    MissingConverter,
}

impl From<EmitError> for BeanError {
    fn from(err: EmitError) -> Self {
        BeanError::Generation(GenError::CodeGeneration(err))
    }
}

impl BeanError {
    /// Class name of the guest exception behind this error, if any.
    pub fn thrown_class(&self) -> Option<&str> {
        match self {
            BeanError::Generation(err) => err.thrown_class(),
            BeanError::Runtime(err) => err.thrown_class(),
            _ => None,
        }
    }
}
