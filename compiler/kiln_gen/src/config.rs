//! Engine configuration.
//!
//! | Variable              | Effect                                             |
//! |-----------------------|----------------------------------------------------|
//! | `KILN_DEBUG_LOCATION` | directory receiving `<name>.kunit` dumps           |
//! | `KILN_DEBUG_DISASM`   | also write `<name>.kasm` disassembly (any value)   |
//! | `KILN_STRESS_HASH`    | use a constant spec hash when naming (any value)   |

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Settings shared by generator bases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenConfig {
    /// Where generated units are dumped; `None` disables the debug sink.
    pub debug_location: Option<PathBuf>,
    /// Write a disassembly next to each dump.
    pub debug_disasm: bool,
    /// Replace spec hashes with a constant so every name goes through
    /// collision handling.
    pub stress_hash: bool,
}

impl GenConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var_os(var).filter(|v| !v.is_empty()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<std::ffi::OsString>) -> Self {
        GenConfig {
            debug_location: lookup("KILN_DEBUG_LOCATION").map(PathBuf::from),
            debug_disasm: lookup("KILN_DEBUG_DISASM").is_some(),
            stress_hash: lookup("KILN_STRESS_HASH").is_some(),
        }
    }

    /// Process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static GenConfig {
        static GLOBAL: OnceLock<GenConfig> = OnceLock::new();
        GLOBAL.get_or_init(GenConfig::from_env)
    }

    #[must_use]
    pub fn with_debug_location(mut self, dir: impl AsRef<Path>) -> Self {
        self.debug_location = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn with_debug_disasm(mut self, enabled: bool) -> Self {
        self.debug_disasm = enabled;
        self
    }

    #[must_use]
    pub fn with_stress_hash(mut self, enabled: bool) -> Self {
        self.stress_hash = enabled;
        self
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
