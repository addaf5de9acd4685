//! Bootstrap orchestration against a live cluster.
//!
//! [`WebhookEnv`] owns the certificate bundle and the categorized manifests
//! for one environment lifetime and sequences the install steps: patch and
//! create webhook configurations, verify their endpoints, then rewrite the
//! conversion block of every convertible, already-Established CRD. The first
//! error aborts the remaining steps; partially applied cluster state is left
//! as-is, since the ephemeral cluster is torn down by the caller anyway.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use kenv_config::shared::EnvConfig;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::cert::{self, CertificateBundle, DEFAULT_CERTIFICATE_SANS};
use crate::cluster::ClusterClient;
use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::registry::{convertible_group_kinds, TypeRegistry};
use crate::resources::{
    extract_endpoint_urls, filter_convertible_crds, is_established, object_name,
    patch_crd_conversion, patch_webhook_config, WebhookConfiguration, WebhookKind,
};
use crate::shutdown::ShutdownRx;
use crate::webhook::WebhookClient;
use crate::{bail, env_error};

/// Lifecycle phase of a CRD managed by the orchestrator.
///
/// `Submitted → Established → ConversionPatched`; a CRD stuck in
/// `Submitted` past its ready timeout is a fatal, name-qualified error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CrdPhase {
    Submitted,
    Established,
    ConversionPatched,
}

/// Manifests already categorized by the loading layer.
#[derive(Clone, Debug, Default)]
pub struct ManifestSet {
    pub crds: Vec<Value>,
    pub webhook_configs: Vec<WebhookConfiguration>,
}

impl ManifestSet {
    /// Builds a set from pre-filtered CRD, mutating-webhook, and
    /// validating-webhook manifests.
    pub fn new(crds: Vec<Value>, mutating: Vec<Value>, validating: Vec<Value>) -> Self {
        let webhook_configs = mutating
            .into_iter()
            .map(|object| WebhookConfiguration::new(WebhookKind::Mutating, object))
            .chain(
                validating
                    .into_iter()
                    .map(|object| WebhookConfiguration::new(WebhookKind::Validating, object)),
            )
            .collect();

        Self {
            crds,
            webhook_configs,
        }
    }
}

static CERT_DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn default_cert_dir() -> PathBuf {
    let seq = CERT_DIR_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("kenv-certs-{}-{seq}", std::process::id()))
}

/// One webhook bootstrap environment.
///
/// Issues its own certificate bundle at construction and performs its own
/// readiness verification; nothing is shared across environment instances.
pub struct WebhookEnv<C> {
    config: EnvConfig,
    client: C,
    registry: TypeRegistry,
    manifests: ManifestSet,
    cert_dir: PathBuf,
    cert: CertificateBundle,
    crd_phases: BTreeMap<String, CrdPhase>,
}

impl<C: ClusterClient> WebhookEnv<C> {
    /// Creates an environment and issues its certificate bundle.
    pub fn new(
        config: EnvConfig,
        client: C,
        registry: TypeRegistry,
        manifests: ManifestSet,
    ) -> EnvResult<Self> {
        if config.webhook.host.is_empty() {
            bail!(ErrorKind::ConfigError, "webhook host cannot be empty");
        }
        if config.webhook.port == 0 {
            bail!(ErrorKind::ConfigError, "webhook port cannot be zero");
        }

        let cert_dir = config
            .cert
            .dir
            .clone()
            .unwrap_or_else(default_cert_dir);

        let sans = config.cert.sans.clone().unwrap_or_else(|| {
            DEFAULT_CERTIFICATE_SANS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        let cert = cert::issue(
            &cert_dir,
            Duration::from_secs(config.cert.validity_secs),
            &sans,
        )?;

        info!(
            "issued webhook certificate bundle under {}",
            cert_dir.display()
        );

        Ok(Self {
            config,
            client,
            registry,
            manifests,
            cert_dir,
            cert,
            crd_phases: BTreeMap::new(),
        })
    }

    /// The base64 CA bundle embedded into every patched client-config.
    pub fn ca_bundle(&self) -> String {
        self.cert.ca_bundle()
    }

    /// The issued certificate material, for wiring a host webhook server.
    pub fn certificate(&self) -> &CertificateBundle {
        &self.cert
    }

    /// Directory holding the PEM artifacts.
    pub fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    /// Base URL advertised to the cluster in rewritten client-configs.
    pub fn base_url(&self) -> String {
        format!(
            "https://{}:{}",
            self.config.webhook.host, self.config.webhook.port
        )
    }

    /// Per-CRD lifecycle phases observed so far.
    pub fn crd_phases(&self) -> &BTreeMap<String, CrdPhase> {
        &self.crd_phases
    }

    /// Installs every webhook configuration and rewires convertible CRDs.
    ///
    /// Sequence: patch and create each webhook config; if readiness checking
    /// is enabled, verify each config's endpoints; resolve convertible CRDs
    /// among installed, Established ones; patch and update their conversion
    /// blocks. The first failure aborts the remaining steps.
    pub async fn install_webhooks(&mut self, shutdown: &mut ShutdownRx) -> EnvResult<()> {
        let base_url = self.base_url();
        let ca_bundle = self.cert.ca_bundle();

        for index in 0..self.manifests.webhook_configs.len() {
            let mut config = self.manifests.webhook_configs[index].clone();
            patch_webhook_config(&mut config.object, &base_url, &ca_bundle)?;

            self.client
                .create(&config.object)
                .await
                .map_err(|e| e.with_resource(&config.resource_id()))?;

            debug!("webhook configuration {} applied", config.name());
            self.manifests.webhook_configs[index] = config;
        }

        if self.config.webhook.check_readiness {
            self.wait_for_webhook_endpoints(shutdown).await?;
        }

        let convertibles = convertible_group_kinds(&self.registry);
        let selected = filter_convertible_crds(&self.manifests.crds, &convertibles)?;

        for crd in &selected {
            let name = object_name(crd)?;
            self.patch_crd_conversion_live(shutdown, &name, &base_url, &ca_bundle)
                .await?;
        }

        Ok(())
    }

    /// Installs every CRD manifest and waits for each to become Established.
    pub async fn install_crds(&mut self, shutdown: &mut ShutdownRx) -> EnvResult<()> {
        let crds = self.manifests.crds.clone();
        for crd in &crds {
            self.install_crd(shutdown, crd).await?;
        }
        Ok(())
    }

    /// Creates one CRD (an already existing one is tolerated) and waits for
    /// its Established condition.
    pub async fn install_crd(&mut self, shutdown: &mut ShutdownRx, crd: &Value) -> EnvResult<()> {
        let name = object_name(crd)?;

        match self.client.create(crd).await {
            Ok(()) => debug!("CRD {name} created"),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!("CRD {name} already exists");
            }
            Err(err) => return Err(err.with_resource(&format!("CRD {name}"))),
        }

        self.crd_phases
            .entry(name.clone())
            .or_insert(CrdPhase::Submitted);

        self.wait_for_crd_established(shutdown, &name).await
    }

    async fn wait_for_webhook_endpoints(&mut self, shutdown: &mut ShutdownRx) -> EnvResult<()> {
        let webhook = &self.config.webhook;
        let client = WebhookClient::new(&webhook.probe_host, webhook.port, self.cert.ca_cert())?
            .with_call_timeout(Duration::from_millis(webhook.call_timeout_ms));

        for config in &self.manifests.webhook_configs {
            let endpoint = extract_endpoint_urls(config)?;
            if endpoint.urls.is_empty() {
                debug!(
                    "no webhook endpoints found in config {}, skipping health check",
                    endpoint.name
                );
                continue;
            }

            debug!(
                "checking {} webhook endpoints for {}",
                endpoint.urls.len(),
                endpoint.name
            );

            client
                .wait_for_endpoints(shutdown, &endpoint.urls, &webhook.poll)
                .await
                .map_err(|e| e.with_resource(&config.resource_id()))?;
        }

        Ok(())
    }

    /// Rewrites the conversion block of one live CRD.
    ///
    /// The CRD must already exist and be Established; the live object is
    /// re-read before patching to avoid update conflicts, and the update is
    /// never a create.
    async fn patch_crd_conversion_live(
        &mut self,
        shutdown: &mut ShutdownRx,
        name: &str,
        base_url: &str,
        ca_bundle: &str,
    ) -> EnvResult<()> {
        self.wait_for_crd_established(shutdown, name).await?;

        let mut live = self
            .client
            .get_crd(name)
            .await?
            .ok_or_else(|| {
                env_error!(
                    ErrorKind::InvalidState,
                    "CRD disappeared before conversion patch",
                    format!("CRD {name}")
                )
            })?;

        patch_crd_conversion(&mut live, base_url, ca_bundle)?;

        self.client
            .update(&live)
            .await
            .map_err(|e| e.with_resource(&format!("CRD {name}")))?;

        debug!("CRD {name} conversion patched");

        // The conversion update can briefly drop the Established condition;
        // wait for the CRD to settle before declaring the phase terminal.
        self.wait_for_crd_established(shutdown, name).await?;
        self.crd_phases
            .insert(name.to_string(), CrdPhase::ConversionPatched);

        Ok(())
    }

    async fn wait_for_crd_established(
        &mut self,
        shutdown: &mut ShutdownRx,
        name: &str,
    ) -> EnvResult<()> {
        let policy = &self.config.crd_poll;
        let interval = policy.interval();
        let deadline = Instant::now() + policy.timeout();

        loop {
            let established = tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    bail!(
                        ErrorKind::OperationCancelled,
                        "CRD establishment wait cancelled",
                        format!("CRD {name}")
                    );
                }
                result = self.client.get_crd(name) => {
                    let crd = result.map_err(|e| e.with_resource(&format!("CRD {name}")))?;
                    crd.as_ref().map(is_established).unwrap_or(false)
                }
            };

            if established {
                let phase = self
                    .crd_phases
                    .entry(name.to_string())
                    .or_insert(CrdPhase::Submitted);
                if *phase < CrdPhase::Established {
                    *phase = CrdPhase::Established;
                }
                return Ok(());
            }

            if Instant::now() + interval >= deadline {
                bail!(
                    ErrorKind::ReadyTimeout,
                    "CRD not established within ready timeout",
                    format!("CRD {name}")
                );
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    bail!(
                        ErrorKind::OperationCancelled,
                        "CRD establishment wait cancelled",
                        format!("CRD {name}")
                    );
                }
                _ = sleep(interval) => {}
            }
        }
    }

    /// Removes the certificate directory. The cluster-side state is left
    /// as-is: tearing down the ephemeral cluster is the caller's concern.
    pub async fn teardown(&self) -> EnvResult<()> {
        match tokio::fs::remove_dir_all(&self.cert_dir).await {
            Ok(()) => {
                info!("removed certificate directory {}", self.cert_dir.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(EnvError::from(err)
                .with_resource(&format!("certificate directory {}", self.cert_dir.display()))),
        }
    }
}
