//! Shared testing infrastructure for the bootstrap.

mod cluster;

pub use cluster::*;
