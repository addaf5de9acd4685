//! Cluster API access for the bootstrap.
//!
//! Consumers depend on the [`ClusterClient`] trait rather than a concrete
//! transport, so tests can substitute an in-memory implementation. The
//! default client, [`http::HttpClusterClient`], talks to a live API server
//! through the [`kube`] crate using dynamic (untyped) objects, matching the
//! untyped manifests the bootstrap works with.

mod base;
pub mod http;

pub use base::*;
