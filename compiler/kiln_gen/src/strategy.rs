//! Pluggable post-processing of generated units.

use kiln_ir::UnitDef;

use crate::GenError;

/// Two-stage transform applied to every generated unit: first to its
/// description, then to its encoded bytes.
pub trait GeneratorStrategy: Send + Sync {
    fn transform_unit(&self, unit: UnitDef) -> Result<UnitDef, GenError> {
        Ok(unit)
    }

    fn transform_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>, GenError> {
        Ok(bytes)
    }
}

/// Leaves units untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultGeneratorStrategy;

impl GeneratorStrategy for DefaultGeneratorStrategy {}
