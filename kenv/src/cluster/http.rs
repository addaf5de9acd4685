//! [`ClusterClient`] backed by a live API server through the [`kube`] crate.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, PostParams};
use kube::Client;
use serde_json::Value;

use crate::cluster::ClusterClient;
use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::resources::{self, CRD_KIND};
use crate::tree;
use crate::env_error;

/// Cluster client using the ambient kube configuration (in-cluster or a
/// local kubeconfig pointed at the ephemeral cluster).
#[derive(Clone)]
pub struct HttpClusterClient {
    client: Client,
}

impl HttpClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a cluster-scoped dynamic API for the manifest's group/version/
    /// kind.
    fn api_for(&self, manifest: &Value) -> EnvResult<Api<DynamicObject>> {
        let api_version: String = tree::query(manifest, ".apiVersion", &[])?;
        let kind: String = tree::query(manifest, ".kind", &[])?;
        if api_version.is_empty() || kind.is_empty() {
            return Err(env_error!(
                ErrorKind::MissingField,
                "manifest missing apiVersion or kind",
                resources::display_name(manifest)
            ));
        }

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version.as_str()),
        };

        let gvk = GroupVersionKind::gvk(group, version, &kind);
        let resource = ApiResource::from_gvk(&gvk);

        Ok(Api::all_with(self.client.clone(), &resource))
    }

    fn crd_api(&self) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("apiextensions.k8s.io", "v1", CRD_KIND);
        let resource = ApiResource::from_gvk(&gvk);
        Api::all_with(self.client.clone(), &resource)
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn create(&self, manifest: &Value) -> EnvResult<()> {
        let name = resources::display_name(manifest);
        let api = self.api_for(manifest)?;
        let object: DynamicObject = serde_json::from_value(manifest.clone())?;

        api.create(&PostParams::default(), &object)
            .await
            .map_err(|e| EnvError::from(e).with_resource(&name))?;

        Ok(())
    }

    async fn get_crd(&self, name: &str) -> EnvResult<Option<Value>> {
        let object = self
            .crd_api()
            .get_opt(name)
            .await
            .map_err(|e| EnvError::from(e).with_resource(&format!("CRD {name}")))?;

        match object {
            Some(object) => Ok(Some(serde_json::to_value(&object)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, manifest: &Value) -> EnvResult<()> {
        let name = resources::object_name(manifest)?;
        let api = self.api_for(manifest)?;
        let object: DynamicObject = serde_json::from_value(manifest.clone())?;

        api.replace(&name, &PostParams::default(), &object)
            .await
            .map_err(|e| EnvError::from(e).with_resource(&name))?;

        Ok(())
    }
}
