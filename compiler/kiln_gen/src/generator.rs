//! The generator contract and the base that drives it.
//!
//! A concrete generator describes *what* to build ([`Generator`]); a
//! [`GeneratorBase`] decides *where* (scope resolution), under which name,
//! and whether an earlier result can be reused.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use kiln_emit::EmitError;
use kiln_ir::UnitDef;
use kiln_vm::{Class, ModuleScope, ObjRef};

use crate::cache::{CachedUnit, ScopeCache, ScopeRegistry};
use crate::debug::DebugSink;
use crate::naming::{DefaultNamingPolicy, NamingPolicy};
use crate::spec::{CacheKey, DynSpec};
use crate::strategy::{DefaultGeneratorStrategy, GeneratorStrategy};
use crate::{GenConfig, GenError};

/// A source of generated units.
///
/// Two requests share a cache entry when they come from the same generator
/// type ([`kind`](Generator::kind)) with equal [`spec`](Generator::spec)s in
/// the same scope.
pub trait Generator: Send + Sync + 'static {
    /// Short name of the generator, used in unit names.
    fn source_name(&self) -> &str;

    fn spec(&self) -> DynSpec;

    /// Preferred stem of the unit name, usually the type being extended.
    fn name_prefix(&self) -> Option<&str> {
        None
    }

    fn default_scope(&self) -> Option<ModuleScope> {
        None
    }

    /// Describe the unit. Its name must be `name`.
    fn generate_unit(&self, name: &str) -> Result<UnitDef, GenError>;

    /// Instantiate when the cache holds the class itself.
    fn first_instance(&self, class: &Arc<Class>) -> Result<ObjRef, GenError> {
        Ok(class.new_instance()?)
    }

    /// Instantiate when the cache holds a prototype instance.
    fn next_instance(&self, prototype: &ObjRef) -> Result<ObjRef, GenError> {
        Ok(prototype.class().new_instance()?)
    }

    /// Choose what the cache keeps for a freshly defined class.
    fn wrap_cached(&self, class: &Arc<Class>) -> Result<CachedUnit, GenError> {
        Ok(CachedUnit::Type(Arc::clone(class)))
    }

    fn kind(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// Per-generator settings and the lifecycle of a generation request.
#[derive(Clone)]
pub struct GeneratorBase {
    scope: Option<ModuleScope>,
    naming: Option<Arc<dyn NamingPolicy>>,
    strategy: Arc<dyn GeneratorStrategy>,
    prefix: Option<String>,
    use_cache: bool,
    config: GenConfig,
    registry: Arc<ScopeRegistry>,
}

impl Default for GeneratorBase {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorBase {
    /// A base using the global configuration and scope registry.
    pub fn new() -> Self {
        GeneratorBase {
            scope: None,
            naming: None,
            strategy: Arc::new(DefaultGeneratorStrategy),
            prefix: None,
            use_cache: true,
            config: GenConfig::global().clone(),
            registry: ScopeRegistry::global(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: &ModuleScope) -> Self {
        self.scope = Some(scope.clone());
        self
    }

    #[must_use]
    pub fn with_naming(mut self, naming: Arc<dyn NamingPolicy>) -> Self {
        self.naming = Some(naming);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn GeneratorStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the generator's name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_owned());
        self
    }

    #[must_use]
    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: GenConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ScopeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &GenConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    pub fn is_caching(&self) -> bool {
        self.use_cache
    }

    /// The scope a request from `generator` lands in: the base's own scope,
    /// else the generator's default, else the thread's ambient scope, else
    /// the system scope.
    pub fn resolve_scope(&self, generator: &dyn Generator) -> ModuleScope {
        self.scope
            .clone()
            .or_else(|| generator.default_scope())
            .or_else(ModuleScope::current)
            .unwrap_or_else(ModuleScope::system)
    }

    /// A new instance of the unit `generator` describes, generating and
    /// caching the unit on first request.
    #[tracing::instrument(level = "debug", skip_all, fields(source = generator.source_name()))]
    pub fn create(&self, generator: &dyn Generator) -> Result<ObjRef, GenError> {
        match self.cached_unit(generator)? {
            CachedUnit::Type(class) => generator.first_instance(&class),
            CachedUnit::Instance(prototype) => generator.next_instance(&prototype),
        }
    }

    /// The generated class itself, through the same cache as [`create`].
    ///
    /// [`create`]: GeneratorBase::create
    pub fn create_class(&self, generator: &dyn Generator) -> Result<Arc<Class>, GenError> {
        Ok(self.cached_unit(generator)?.class())
    }

    fn cached_unit(&self, generator: &dyn Generator) -> Result<CachedUnit, GenError> {
        let scope = self.resolve_scope(generator);
        let cache = self.registry.cache_for(&scope);
        if !self.use_cache {
            return self.generate(generator, &scope, &cache);
        }
        let key = CacheKey::new(generator.kind(), generator.spec());
        cache.get_or_generate(key, || self.generate(generator, &scope, &cache))
    }

    fn generate(
        &self,
        generator: &dyn Generator,
        scope: &ModuleScope,
        cache: &ScopeCache,
    ) -> Result<CachedUnit, GenError> {
        let default_naming = DefaultNamingPolicy {
            stress_hash: self.config.stress_hash,
        };
        let naming: &dyn NamingPolicy = match &self.naming {
            Some(naming) => &**naming,
            None => &default_naming,
        };
        let prefix = self.prefix.as_deref().or_else(|| generator.name_prefix());
        let reservation = cache.reserve_name(
            naming,
            prefix,
            generator.source_name(),
            generator.spec().stable_hash(),
            scope,
        );
        let name = reservation.name();
        debug!(name = %name, scope = %scope.id(), "generating unit");

        let unit = generator.generate_unit(name)?;
        if unit.name != name {
            return Err(GenError::invalid_spec(format!(
                "generator produced `{}` instead of `{name}`",
                unit.name
            )));
        }
        let unit = self.strategy.transform_unit(unit)?;
        let bytes = unit.to_bytes().map_err(EmitError::from)?;
        let bytes = self.strategy.transform_bytes(bytes)?;
        if let Some(sink) = DebugSink::from_config(&self.config) {
            sink.write(name, &bytes)?;
        }

        let class = scope
            .define_unit(&bytes)
            .map_err(|source| GenError::Define {
                name: name.to_owned(),
                source,
            })?;
        reservation.commit();
        generator.wrap_cached(&class)
    }
}

impl fmt::Debug for GeneratorBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorBase")
            .field("scope", &self.scope)
            .field("prefix", &self.prefix)
            .field("use_cache", &self.use_cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
