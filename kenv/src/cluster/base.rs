use async_trait::async_trait;
use serde_json::Value;

use crate::error::EnvResult;

/// Client interface describing the cluster operations used by the bootstrap.
///
/// All resources the bootstrap touches (CRDs and webhook configurations) are
/// cluster-scoped, and manifests are carried as untyped [`Value`] trees.
/// Implementations wrap failures with the owning resource's identity.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Creates a resource from its manifest.
    ///
    /// A duplicate create fails with
    /// [`crate::error::ErrorKind::AlreadyExists`]; callers decide whether
    /// that is tolerable.
    async fn create(&self, manifest: &Value) -> EnvResult<()>;

    /// Fetches a CustomResourceDefinition by name, with live status.
    /// Returns `Ok(None)` when the CRD does not exist.
    async fn get_crd(&self, name: &str) -> EnvResult<Option<Value>>;

    /// Replaces an existing resource with the given manifest. Never creates:
    /// the resource must already exist, and a write race surfaces as
    /// [`crate::error::ErrorKind::UpdateConflict`].
    async fn update(&self, manifest: &Value) -> EnvResult<()>;
}
