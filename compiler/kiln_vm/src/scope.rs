//! Module scopes: the isolation boundary generated classes are defined into.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::debug;

use kiln_ir::{well_known, UnitDef};

use crate::class::Class;
use crate::DefineError;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<ModuleScope>> = const { RefCell::new(None) };
}

/// Process-unique identity of a scope. Never reused, so it stays a valid
/// map key after the scope is gone.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

struct ScopeState {
    id: ScopeId,
    name: String,
    parent: Option<ModuleScope>,
    classes: RwLock<FxHashMap<String, Arc<Class>>>,
    /// Serializes definitions so duplicate checks and inserts are atomic.
    define_lock: Mutex<()>,
}

impl Drop for ScopeState {
    fn drop(&mut self) {
        debug!(scope = %self.id, name = %self.name, "module scope dropped");
    }
}

/// Handle to a module scope. Clones share the scope; the scope and every
/// class defined in it live until the last handle is dropped.
///
/// Name lookup delegates to the parent first, so classes of the system
/// scope can never be shadowed.
#[derive(Clone)]
pub struct ModuleScope(Arc<ScopeState>);

/// Non-owning handle to a module scope.
#[derive(Clone)]
pub struct WeakScope {
    id: ScopeId,
    inner: Weak<ScopeState>,
}

impl WeakScope {
    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn upgrade(&self) -> Option<ModuleScope> {
        self.inner.upgrade().map(ModuleScope)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakScope({})", self.id)
    }
}

/// Restores the previous ambient scope when dropped.
#[must_use = "the ambient scope is reset when the guard is dropped"]
pub struct CurrentScopeGuard {
    previous: Option<ModuleScope>,
}

impl Drop for CurrentScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

impl ModuleScope {
    fn from_parts(name: &str, parent: Option<ModuleScope>) -> Self {
        let id = ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed));
        debug!(scope = %id, name, "module scope created");
        ModuleScope(Arc::new(ScopeState {
            id,
            name: name.to_owned(),
            parent,
            classes: RwLock::new(FxHashMap::default()),
            define_lock: Mutex::new(()),
        }))
    }

    /// A scope without a parent; only the system scope is built this way.
    pub(crate) fn root(name: &str) -> Self {
        Self::from_parts(name, None)
    }

    /// A new scope whose parent is the system scope.
    pub fn new(name: &str) -> Self {
        Self::with_parent(name, &Self::system())
    }

    pub fn with_parent(name: &str, parent: &ModuleScope) -> Self {
        Self::from_parts(name, Some(parent.clone()))
    }

    /// The process-wide scope holding the core class library.
    pub fn system() -> Self {
        crate::core::core().scope.clone()
    }

    /// The ambient scope of this thread, if one was entered.
    pub fn current() -> Option<Self> {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Make this scope the ambient scope of the thread until the guard drops.
    pub fn enter(&self) -> CurrentScopeGuard {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        CurrentScopeGuard { previous }
    }

    pub fn id(&self) -> ScopeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&ModuleScope> {
        self.0.parent.as_ref()
    }

    pub fn weak(&self) -> WeakScope {
        WeakScope {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }

    pub fn ptr_eq(&self, other: &ModuleScope) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A class defined directly in this scope.
    pub fn find_class(&self, name: &str) -> Option<Arc<Class>> {
        self.0.classes.read().get(name).cloned()
    }

    /// A class visible from this scope: the parent chain first, then here.
    pub fn load_class(&self, name: &str) -> Option<Arc<Class>> {
        if let Some(class) = self.parent().and_then(|p| p.load_class(name)) {
            return Some(class);
        }
        self.find_class(name)
    }

    /// Whether defining `name` here would collide with a visible class.
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.load_class(name).is_some()
    }

    /// Names of classes defined directly in this scope.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.classes.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn insert(&self, class: Arc<Class>) {
        self.0
            .classes
            .write()
            .insert(class.name().to_owned(), class);
    }

    /// Decode, link and define a unit from its byte form, then run its
    /// static initializer.
    #[tracing::instrument(level = "debug", skip_all, fields(scope = %self.0.id))]
    pub fn define_unit(&self, bytes: &[u8]) -> Result<Arc<Class>, DefineError> {
        let unit = UnitDef::from_bytes(bytes)?;
        self.define(unit)
    }

    /// Define an already decoded unit.
    pub fn define(&self, unit: UnitDef) -> Result<Arc<Class>, DefineError> {
        let _serial = self.0.define_lock.lock();
        let name = unit.name.clone();
        if self.is_name_taken(&name) {
            return Err(DefineError::Duplicate { name });
        }

        let super_class = match &unit.super_name {
            Some(super_name) => Some(self.load_class(super_name).ok_or_else(|| {
                DefineError::SuperNotFound {
                    name: name.clone(),
                    super_name: super_name.clone(),
                }
            })?),
            None => None,
        };
        let interfaces = unit
            .interfaces
            .iter()
            .map(|iface| {
                self.load_class(iface)
                    .ok_or_else(|| DefineError::InterfaceNotFound {
                        name: name.clone(),
                        interface: iface.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let class = Arc::new(Class::link(unit, self.weak(), super_class, interfaces)?);
        self.insert(Arc::clone(&class));

        if let Some((owner, idx)) = class.find_method(well_known::STATIC_INIT, "()V") {
            if Arc::ptr_eq(&owner, &class) {
                if let Err(source) = crate::interp::invoke(&owner, idx, Vec::new()) {
                    self.0.classes.write().remove(&name);
                    return Err(DefineError::Initializer { name, source });
                }
            }
        }
        debug!(name = %name, "defined class");
        Ok(class)
    }
}

impl fmt::Debug for ModuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleScope")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .finish_non_exhaustive()
    }
}
