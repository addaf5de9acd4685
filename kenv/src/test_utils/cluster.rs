//! In-memory [`ClusterClient`] used by unit and integration tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cluster::ClusterClient;
use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::resources::{display_name, object_kind, CRD_KIND};
use crate::env_error;

#[derive(Default)]
struct MockState {
    /// Non-CRD resources, in creation order.
    created: Vec<Value>,
    /// CRDs by name, as last written.
    crds: BTreeMap<String, Value>,
    /// Number of `get_crd` calls per CRD before the Established condition
    /// starts appearing in responses.
    establish_after: u32,
    get_calls: BTreeMap<String, u32>,
    updated: Vec<Value>,
    fail_update_with_conflict: bool,
}

/// A cluster client that records writes and simulates CRD establishment.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    inner: Arc<Mutex<MockState>>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Established condition appears only after `calls` reads of a CRD.
    pub fn with_establish_after(self, calls: u32) -> Self {
        self.inner.lock().unwrap().establish_after = calls;
        self
    }

    /// Every update fails with an update conflict.
    pub fn with_update_conflicts(self) -> Self {
        self.inner.lock().unwrap().fail_update_with_conflict = true;
        self
    }

    /// Non-CRD resources created so far, in order.
    pub fn created(&self) -> Vec<Value> {
        self.inner.lock().unwrap().created.clone()
    }

    /// The last written manifest of a CRD.
    pub fn crd(&self, name: &str) -> Option<Value> {
        self.inner.lock().unwrap().crds.get(name).cloned()
    }

    /// Manifests passed to `update`, in order.
    pub fn updated(&self) -> Vec<Value> {
        self.inner.lock().unwrap().updated.clone()
    }

    fn already_exists(name: &str) -> EnvError {
        env_error!(
            ErrorKind::AlreadyExists,
            "resource already exists",
            name.to_string()
        )
    }
}

fn with_established_condition(crd: &Value) -> Value {
    let mut crd = crd.clone();
    crd["status"] = json!({
        "conditions": [{"type": "Established", "status": "True"}]
    });
    crd
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn create(&self, manifest: &Value) -> EnvResult<()> {
        let name = display_name(manifest);
        let mut state = self.inner.lock().unwrap();

        if object_kind(manifest) == CRD_KIND {
            if state.crds.contains_key(&name) {
                return Err(Self::already_exists(&name));
            }
            state.crds.insert(name, manifest.clone());
        } else {
            if state
                .created
                .iter()
                .any(|existing| display_name(existing) == name)
            {
                return Err(Self::already_exists(&name));
            }
            state.created.push(manifest.clone());
        }

        Ok(())
    }

    async fn get_crd(&self, name: &str) -> EnvResult<Option<Value>> {
        let mut state = self.inner.lock().unwrap();
        let calls = state.get_calls.entry(name.to_string()).or_insert(0);
        *calls += 1;
        let seen = *calls;
        let establish_after = state.establish_after;

        Ok(state.crds.get(name).map(|crd| {
            if seen > establish_after {
                with_established_condition(crd)
            } else {
                crd.clone()
            }
        }))
    }

    async fn update(&self, manifest: &Value) -> EnvResult<()> {
        let name = display_name(manifest);
        let mut state = self.inner.lock().unwrap();

        if state.fail_update_with_conflict {
            return Err(env_error!(
                ErrorKind::UpdateConflict,
                "conflicting write to resource",
                name
            ));
        }

        if !state.crds.contains_key(&name) {
            return Err(env_error!(
                ErrorKind::ClusterRequestFailed,
                "cannot update a resource that does not exist",
                name
            ));
        }

        // Strip the synthetic status so establishment simulation stays in
        // control of the condition.
        let mut stored = manifest.clone();
        if let Some(map) = stored.as_object_mut() {
            map.remove("status");
        }

        state.crds.insert(name, stored);
        state.updated.push(manifest.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::is_established;

    #[tokio::test]
    async fn test_crd_establishment_simulation() {
        let client = MockClusterClient::new().with_establish_after(2);
        let crd = json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.com"},
            "spec": {"group": "example.com", "names": {"kind": "Widget"}}
        });
        client.create(&crd).await.unwrap();

        let first = client.get_crd("widgets.example.com").await.unwrap().unwrap();
        assert!(!is_established(&first));
        let second = client.get_crd("widgets.example.com").await.unwrap().unwrap();
        assert!(!is_established(&second));
        let third = client.get_crd("widgets.example.com").await.unwrap().unwrap();
        assert!(is_established(&third));
    }

    #[tokio::test]
    async fn test_duplicate_create_reports_already_exists() {
        let client = MockClusterClient::new();
        let manifest = json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "ValidatingWebhookConfiguration",
            "metadata": {"name": "vwh"}
        });

        client.create(&manifest).await.unwrap();
        let err = client.create(&manifest).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_update_requires_existing_resource() {
        let client = MockClusterClient::new();
        let err = client
            .update(&json!({"metadata": {"name": "missing"}}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClusterRequestFailed);
    }
}
