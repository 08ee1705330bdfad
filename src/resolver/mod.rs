//! # Dependency resolution for unit startup.
//!
//! - [`UnitManifest`] / [`load_manifests`] read `<dir>/<unit>/package.json` descriptions
//! - [`DependencyResolver`] orders units, leniently ([`resolve`](DependencyResolver::resolve))
//!   or strictly ([`resolve_strict`](DependencyResolver::resolve_strict))

mod manifest;
#[allow(clippy::module_inception)]
mod resolver;

pub use manifest::{MANIFEST_FILE, UnitManifest, load_manifests};
pub use resolver::{DependencyResolver, remove_duplicates, resolve_directory};
