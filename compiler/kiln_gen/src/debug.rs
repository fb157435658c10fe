//! Dumps of generated units.

use std::fs;
use std::path::{Path, PathBuf};

use kiln_ir::{disassemble, UnitDef};

use crate::{GenConfig, GenError};

/// Writes `<dir>/<unit name>.kunit`, and `.kasm` beside it when
/// disassembly is on. Slashes in unit names become directories.
#[derive(Clone, Debug)]
pub struct DebugSink {
    dir: PathBuf,
    disasm: bool,
}

impl DebugSink {
    pub fn new(dir: impl Into<PathBuf>, disasm: bool) -> Self {
        DebugSink {
            dir: dir.into(),
            disasm,
        }
    }

    /// The sink configured by `config`, if any.
    pub fn from_config(config: &GenConfig) -> Option<Self> {
        config
            .debug_location
            .as_ref()
            .map(|dir| DebugSink::new(dir, config.debug_disasm))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str, extension: &str) -> PathBuf {
        let mut path = self.dir.clone();
        path.extend(name.split('/').filter(|part| !part.is_empty()));
        let mut file = path.into_os_string();
        file.push(".");
        file.push(extension);
        PathBuf::from(file)
    }

    /// Write the dump for unit `name`. Returns the path of the unit file.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, GenError> {
        let unit_path = self.path_for(name, "kunit");
        write_file(&unit_path, bytes)?;
        if self.disasm {
            let text = match UnitDef::from_bytes(bytes) {
                Ok(unit) => disassemble(&unit),
                Err(err) => format!("<undecodable unit: {err}>\n"),
            };
            write_file(&self.path_for(name, "kasm"), text.as_bytes())?;
        }
        tracing::debug!(path = %unit_path.display(), "dumped generated unit");
        Ok(unit_path)
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), GenError> {
    let io_err = |source| GenError::DebugSink {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, contents).map_err(io_err)
}
