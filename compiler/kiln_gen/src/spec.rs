//! Generation specs and the keys they form in a scope cache.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

/// A value-comparable description of what a generator builds.
///
/// Blanket-implemented for every `Eq + Hash + Debug` value that can be
/// shared across threads.
pub trait GenerationSpec: Any + fmt::Debug + Send + Sync {
    fn dyn_eq(&self, other: &dyn GenerationSpec) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
}

impl<T> GenerationSpec for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn dyn_eq(&self, other: &dyn GenerationSpec) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A shared, type-erased spec with structural equality and hashing.
#[derive(Clone)]
pub struct DynSpec(Arc<dyn GenerationSpec>);

impl DynSpec {
    pub fn new(spec: impl GenerationSpec) -> Self {
        DynSpec(Arc::new(spec))
    }

    pub fn get(&self) -> &dyn GenerationSpec {
        &*self.0
    }

    /// The concrete spec, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Stable hash used in generated names.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.0.dyn_hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for DynSpec {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.get())
    }
}

impl Eq for DynSpec {}

impl Hash for DynSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for DynSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Key of a scope cache entry: which generator, asked for what.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: TypeId,
    spec: DynSpec,
}

impl CacheKey {
    pub fn new(kind: TypeId, spec: DynSpec) -> Self {
        CacheKey { kind, spec }
    }

    pub fn spec(&self) -> &DynSpec {
        &self.spec
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
