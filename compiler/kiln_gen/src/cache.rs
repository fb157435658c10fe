//! Per-scope caches and the registry that finds them.
//!
//! The registry maps a scope's [`ScopeId`] to its [`ScopeCache`]. Neither
//! holds a scope strongly: a cache keeps only a [`WeakScope`], and entries
//! whose scope is gone are swept whenever the registry is written or
//! [`ScopeRegistry::sweep`] is called.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use kiln_vm::{Class, ModuleScope, ObjRef, ScopeId, WeakScope};

use crate::naming::NamingPolicy;
use crate::spec::CacheKey;
use crate::GenError;

// ── Cached values ───────────────────────────────────────────────────

/// A generated unit as handed out by the cache.
#[derive(Clone, Debug)]
pub enum CachedUnit {
    /// The generated class; instances come from `first_instance`.
    Type(Arc<Class>),
    /// A prototype instance; instances come from `next_instance`.
    Instance(ObjRef),
}

impl CachedUnit {
    pub fn class(&self) -> Arc<Class> {
        match self {
            CachedUnit::Type(class) => Arc::clone(class),
            CachedUnit::Instance(obj) => Arc::clone(obj.class()),
        }
    }

    fn store(&self) -> Stored {
        match self {
            CachedUnit::Type(class) => Stored::Type(Arc::downgrade(class)),
            CachedUnit::Instance(obj) => Stored::Instance(Arc::clone(obj)),
        }
    }
}

/// What a cache slot holds. Types are held weakly.
#[derive(Debug)]
enum Stored {
    Type(Weak<Class>),
    Instance(ObjRef),
}

impl Stored {
    fn upgrade(&self) -> Option<CachedUnit> {
        match self {
            Stored::Type(weak) => weak.upgrade().map(CachedUnit::Type),
            Stored::Instance(obj) => Some(CachedUnit::Instance(Arc::clone(obj))),
        }
    }
}

type Slot = Arc<Mutex<Option<Stored>>>;

// ── ScopeCache ──────────────────────────────────────────────────────

/// Generated units of one scope, keyed by generator kind and spec.
pub struct ScopeCache {
    scope: WeakScope,
    slots: Mutex<FxHashMap<CacheKey, Slot>>,
    reserved: Mutex<FxHashSet<String>>,
}

impl ScopeCache {
    fn new(scope: WeakScope) -> Self {
        ScopeCache {
            scope,
            slots: Mutex::default(),
            reserved: Mutex::default(),
        }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope.id()
    }

    pub fn is_alive(&self) -> bool {
        self.scope.is_alive()
    }

    /// Number of keys with a slot (live or not).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The live unit for `key`, generating it with `generate` when absent
    /// or collected. Concurrent callers for one key wait for a single
    /// generation and share its result.
    pub fn get_or_generate(
        &self,
        key: CacheKey,
        generate: impl FnOnce() -> Result<CachedUnit, GenError>,
    ) -> Result<CachedUnit, GenError> {
        let slot = Arc::clone(self.slots.lock().entry(key).or_default());
        let mut stored = slot.lock();
        if let Some(unit) = stored.as_ref().and_then(Stored::upgrade) {
            trace!(scope = %self.scope.id(), "scope cache hit");
            return Ok(unit);
        }
        let unit = generate()?;
        *stored = Some(unit.store());
        Ok(unit)
    }

    /// Choose and reserve a unit name that is neither reserved here nor
    /// visible from the scope. The name is released again when the returned
    /// reservation is dropped without [`commit`](NameReservation::commit).
    pub fn reserve_name(
        &self,
        policy: &dyn NamingPolicy,
        prefix: Option<&str>,
        source: &str,
        spec_hash: u64,
        scope: &ModuleScope,
    ) -> NameReservation<'_> {
        let mut reserved = self.reserved.lock();
        let taken = |name: &str| reserved.contains(name) || scope.is_name_taken(name);
        let name = policy.name(prefix, source, spec_hash, &taken);
        reserved.insert(name.clone());
        NameReservation {
            cache: self,
            name,
            committed: false,
        }
    }

    /// Names reserved so far, sorted.
    pub fn reserved_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reserved.lock().iter().cloned().collect();
        names.sort();
        names
    }
}

/// A unit name held for one generation attempt.
pub struct NameReservation<'a> {
    cache: &'a ScopeCache,
    name: String,
    committed: bool,
}

impl NameReservation<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keep the name reserved for good, once a unit was defined under it.
    pub fn commit(mut self) -> String {
        self.committed = true;
        std::mem::take(&mut self.name)
    }
}

impl Drop for NameReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            trace!(name = %self.name, "releasing unused unit name");
            self.cache.reserved.lock().remove(&self.name);
        }
    }
}

// ── ScopeRegistry ───────────────────────────────────────────────────

type Snapshot = Arc<FxHashMap<ScopeId, Arc<ScopeCache>>>;

/// Maps scopes to their caches.
///
/// Readers clone the current snapshot; writers serialize on a mutex,
/// re-check, and publish a new snapshot.
pub struct ScopeRegistry {
    snapshot: RwLock<Snapshot>,
    writer: Mutex<()>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeRegistry {
    pub fn new() -> Self {
        ScopeRegistry {
            snapshot: RwLock::new(Arc::default()),
            writer: Mutex::new(()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<ScopeRegistry> {
        static GLOBAL: OnceLock<Arc<ScopeRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ScopeRegistry::new())))
    }

    fn current(&self) -> Snapshot {
        Arc::clone(&self.snapshot.read())
    }

    /// The cache of `scope`, created on first use.
    pub fn cache_for(&self, scope: &ModuleScope) -> Arc<ScopeCache> {
        let id = scope.id();
        if let Some(cache) = self.current().get(&id) {
            return Arc::clone(cache);
        }

        let _writer = self.writer.lock();
        let current = self.current();
        if let Some(cache) = current.get(&id) {
            return Arc::clone(cache);
        }
        let mut next: FxHashMap<ScopeId, Arc<ScopeCache>> = current
            .iter()
            .filter(|(_, cache)| cache.is_alive())
            .map(|(id, cache)| (*id, Arc::clone(cache)))
            .collect();
        let cache = Arc::new(ScopeCache::new(scope.weak()));
        next.insert(id, Arc::clone(&cache));
        debug!(scope = %id, caches = next.len(), "registered scope cache");
        *self.snapshot.write() = Arc::new(next);
        cache
    }

    /// Drop the caches of dead scopes. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let _writer = self.writer.lock();
        let current = self.current();
        let next: FxHashMap<ScopeId, Arc<ScopeCache>> = current
            .iter()
            .filter(|(_, cache)| cache.is_alive())
            .map(|(id, cache)| (*id, Arc::clone(cache)))
            .collect();
        let removed = current.len() - next.len();
        if removed > 0 {
            debug!(removed, "swept dead scope caches");
            *self.snapshot.write() = Arc::new(next);
        }
        removed
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.current().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
