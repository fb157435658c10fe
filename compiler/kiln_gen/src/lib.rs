//! Generator base and caching for Kiln.
//!
//! A request flows through [`GeneratorBase::create`]:
//!
//! 1. resolve the target [`ModuleScope`](kiln_vm::ModuleScope);
//! 2. find that scope's [`ScopeCache`] in the [`ScopeRegistry`];
//! 3. look up `(generator kind, spec)`; on a live hit instantiate from it;
//! 4. otherwise reserve a name through the [`NamingPolicy`], let the
//!    generator describe the unit, run the [`GeneratorStrategy`], dump it to
//!    the [`DebugSink`] when configured, define it and cache it.
//!
//! Structural keys for specs built from loose values come from [`key`].

use std::sync::Once;

mod cache;
mod config;
mod debug;
mod error;
mod generator;
pub mod key;
mod naming;
mod spec;
mod strategy;

pub use cache::{CachedUnit, NameReservation, ScopeCache, ScopeRegistry};
pub use config::GenConfig;
pub use debug::DebugSink;
pub use error::GenError;
pub use generator::{Generator, GeneratorBase};
pub use naming::{DefaultNamingPolicy, NamingPolicy};
pub use spec::{CacheKey, DynSpec, GenerationSpec};
pub use strategy::{DefaultGeneratorStrategy, GeneratorStrategy};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call repeatedly.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            // Another subscriber may already be installed by the host.
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
