//! Names of generated units.

/// Computes a unit name that is not yet taken in the target scope.
pub trait NamingPolicy: Send + Sync {
    /// `prefix` is the generator's preferred package-qualified stem (often
    /// the class the unit derives from), `source` the generator's name,
    /// `spec_hash` the stable hash of the generation spec. `taken` reports names
    /// already used in the scope.
    fn name(
        &self,
        prefix: Option<&str>,
        source: &str,
        spec_hash: u64,
        taken: &dyn Fn(&str) -> bool,
    ) -> String;
}

/// `<prefix>$$<Source>ByKiln$$<hash>`, then `_2`, `_3`, ... until free.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultNamingPolicy {
    /// Use a constant hash so every request collides.
    pub stress_hash: bool,
}

const EMPTY_PREFIX: &str = "kiln/empty/Object";

impl NamingPolicy for DefaultNamingPolicy {
    fn name(
        &self,
        prefix: Option<&str>,
        source: &str,
        spec_hash: u64,
        taken: &dyn Fn(&str) -> bool,
    ) -> String {
        let prefix = match prefix {
            None | Some("") => EMPTY_PREFIX.to_owned(),
            // Units may not live in the core namespace.
            Some(p) if p.starts_with("core/") => format!("kiln/{p}"),
            Some(p) => p.to_owned(),
        };
        let short = source.rsplit(['/', ':', '.']).next().unwrap_or(source);
        let hash = if self.stress_hash { 0 } else { fold_hash(spec_hash) };
        let base = format!("{prefix}$${short}ByKiln$${hash:08x}");

        let mut attempt = base.clone();
        let mut index = 2u32;
        while taken(&attempt) {
            attempt = format!("{base}_{index}");
            index += 1;
        }
        attempt
    }
}

/// Fold both halves of a spec hash into the 32 bits shown in unit names.
fn fold_hash(hash: u64) -> u32 {
    let folded = (hash ^ (hash >> 32)) & u64::from(u32::MAX);
    u32::try_from(folded).unwrap_or_default()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
