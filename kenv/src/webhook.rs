//! Readiness probing of host-side webhook endpoints.
//!
//! The poller drives an HTTPS client that trusts only the issued CA and
//! repeatedly posts a synthetic, semantically empty admission review to each
//! endpoint path. A webhook rejecting the payload with a 4xx is still up;
//! only 5xx responses and transport failures count as unhealthy. Endpoints
//! are probed sequentially so a failure is attributable to exactly one URL.

use std::time::Duration;

use kenv_config::shared::PollPolicy;
use reqwest::Certificate;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::shutdown::ShutdownRx;
use crate::{bail, env_error};

/// Default timeout for a single admission-review call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the minimal admission review used as a health-check payload: a
/// well-formed, semantically empty `CREATE` on an empty object.
pub fn health_check_review() -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": Uuid::nil().to_string(),
            "operation": "CREATE",
            "object": {},
        },
    })
}

/// HTTPS client for webhook endpoints on a single host/port.
///
/// The TLS configuration pins the issued CA: built-in roots are disabled, so
/// a server presenting anything but the environment's leaf certificate fails
/// the probe. The client is read-only after construction and can be shared
/// across all poll calls.
#[derive(Debug)]
pub struct WebhookClient {
    host: String,
    port: u16,
    call_timeout: Duration,
    http: reqwest::Client,
}

impl WebhookClient {
    /// Creates a client for `https://{host}:{port}` trusting only the given
    /// CA certificate (PEM).
    pub fn new(host: &str, port: u16, ca_cert_pem: &[u8]) -> EnvResult<Self> {
        if host.is_empty() {
            bail!(ErrorKind::ConfigError, "webhook host cannot be empty");
        }
        if port == 0 {
            bail!(ErrorKind::ConfigError, "webhook port cannot be zero");
        }

        let ca = Certificate::from_pem(ca_cert_pem).map_err(|e| {
            env_error!(
                ErrorKind::ConfigError,
                "failed to parse CA certificate",
                e
            )
        })?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .build()
            .map_err(|e| {
                env_error!(
                    ErrorKind::ConfigError,
                    "failed to build webhook HTTP client",
                    e
                )
            })?;

        Ok(Self {
            host: host.to_string(),
            port,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            http,
        })
    }

    /// Overrides the per-call timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// The `host:port` this client connects to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn endpoint_url(&self, path: &str) -> String {
        let path = if path.is_empty() { "/" } else { path };
        format!("https://{}:{}{}", self.host, self.port, path)
    }

    /// Posts an admission review to a webhook path and returns the parsed
    /// response review.
    ///
    /// Accepts 2xx, 3xx, and 4xx status codes; a 5xx is reported as
    /// [`ErrorKind::EndpointUnhealthy`].
    pub async fn call(&self, path: &str, review: &Value) -> EnvResult<Value> {
        let url = self.endpoint_url(path);
        let response = self
            .http
            .post(&url)
            .timeout(self.call_timeout)
            .json(review)
            .send()
            .await
            .map_err(|e| EnvError::from(e).with_resource(&url))?;

        let status = response.status();
        if status.is_server_error() {
            bail!(
                ErrorKind::EndpointUnhealthy,
                "webhook returned server error",
                format!("{url}: status {}", status.as_u16())
            );
        }

        let review = response
            .json::<Value>()
            .await
            .map_err(|e| EnvError::from(e).with_resource(&url))?;

        Ok(review)
    }

    /// Status-only probe used by the readiness wait: a 4xx without a parsable
    /// body still counts as healthy.
    async fn probe(&self, url: &str, review: &Value, call_timeout: Duration) -> EnvResult<()> {
        let response = self
            .http
            .post(url)
            .timeout(call_timeout)
            .json(review)
            .send()
            .await
            .map_err(|e| EnvError::from(e).with_resource(url))?;

        let status = response.status();
        if status.is_server_error() {
            bail!(
                ErrorKind::EndpointUnhealthy,
                "webhook returned server error",
                format!("{url}: status {}", status.as_u16())
            );
        }

        Ok(())
    }

    /// Waits for every URL to answer a health probe with a non-5xx response.
    ///
    /// URLs are probed sequentially in the order given, each bounded by
    /// `policy.timeout()`. Only the path of each URL is kept: the probe goes
    /// to this client's own host and port, which is where the rewritten
    /// endpoints actually serve. Shutdown aborts the in-flight call and
    /// surfaces as [`ErrorKind::OperationCancelled`], distinct from
    /// [`ErrorKind::ReadyTimeout`].
    pub async fn wait_for_endpoints(
        &self,
        shutdown: &mut ShutdownRx,
        urls: &[String],
        policy: &PollPolicy,
    ) -> EnvResult<()> {
        let review = health_check_review();

        for webhook_url in urls {
            let parsed = Url::parse(webhook_url)
                .map_err(|e| EnvError::from(e).with_resource(webhook_url))?;
            let local_url = self.endpoint_url(parsed.path());

            debug!("checking webhook endpoint {webhook_url} (local: {local_url})");

            self.wait_for_endpoint(shutdown, &local_url, &review, policy)
                .await
                .map_err(|e| e.with_resource(webhook_url))?;

            debug!("webhook endpoint {webhook_url} is ready");
        }

        Ok(())
    }

    async fn wait_for_endpoint(
        &self,
        shutdown: &mut ShutdownRx,
        url: &str,
        review: &Value,
        policy: &PollPolicy,
    ) -> EnvResult<()> {
        let interval = policy.interval();
        let deadline = Instant::now() + policy.timeout();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!(
                    ErrorKind::ReadyTimeout,
                    "endpoint never became healthy within ready timeout",
                    url
                );
            }

            // The per-attempt timeout nests inside the endpoint deadline so a
            // hung call cannot silently exhaust the whole budget.
            let call_timeout = self.call_timeout.min(remaining);

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    bail!(ErrorKind::OperationCancelled, "endpoint wait cancelled", url);
                }
                result = self.probe(url, review, call_timeout) => {
                    match result {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            debug!("webhook endpoint {url} not ready yet: {err}");
                        }
                    }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    bail!(ErrorKind::OperationCancelled, "endpoint wait cancelled", url);
                }
                _ = sleep(interval) => {}
            }
        }
    }
}
