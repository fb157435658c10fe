//! Bean utilities generated with Kiln.
//!
//! - [`BeanGenerator`] builds plain bean classes from a property list.
//! - [`BeanCopier`] copies same-named properties between two bean classes,
//!   optionally through a guest [converter](converter::CONVERTER).
//! - [`BeanMap`] views a bean as a map from property names to values.
//!
//! Properties are discovered by [`introspect::properties`].

mod bean;
pub mod converter;
mod copier;
mod error;
pub mod introspect;
mod map;

pub use bean::BeanGenerator;
pub use copier::BeanCopier;
pub use error::BeanError;
pub use introspect::PropertyDescriptor;
pub use map::{BeanMap, Require};
