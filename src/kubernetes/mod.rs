pub mod catalog;
mod client;
mod connection;
#[cfg(test)]
pub(crate) mod fake;

pub use catalog::CanonicalKind;
pub use client::{DEFAULT_PAGE_SIZE, KubeConnection};
pub use connection::{ApiFilters, ClusterConnection};
