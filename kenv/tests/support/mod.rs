#![allow(dead_code)]

//! Shared helpers for integration tests: a local HTTPS webhook server that
//! serves the environment's leaf certificate and fails a configurable number
//! of requests before turning healthy.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer};
use kenv::cert::CertificateBundle;
use serde_json::json;

struct ServerState {
    hits: Arc<AtomicUsize>,
    failures_before_ready: usize,
    ready_status: StatusCode,
}

pub struct WebhookTestServer {
    pub port: u16,
    hits: Arc<AtomicUsize>,
    handle: actix_web::dev::ServerHandle,
}

impl WebhookTestServer {
    /// Binds a fresh loopback port and serves HTTPS with the bundle's leaf
    /// certificate. The first `failures_before_ready` requests answer 500;
    /// later ones answer 200 with a minimal admission-review response.
    pub async fn spawn(bundle: &CertificateBundle, failures_before_ready: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
        Self::spawn_on(listener, bundle, failures_before_ready, StatusCode::OK).await
    }

    /// Like [`WebhookTestServer::spawn`], but healthy responses use the given
    /// status instead of 200.
    pub async fn spawn_with_ready_status(
        bundle: &CertificateBundle,
        failures_before_ready: usize,
        ready_status: StatusCode,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
        Self::spawn_on(listener, bundle, failures_before_ready, ready_status).await
    }

    /// Serves on a pre-bound listener, so callers can fix the port before
    /// constructing the environment that advertises it.
    pub async fn spawn_on(
        listener: TcpListener,
        bundle: &CertificateBundle,
        failures_before_ready: usize,
        ready_status: StatusCode,
    ) -> Self {
        let port = listener
            .local_addr()
            .expect("listener has no local address")
            .port();

        let tls = tls_config(bundle);
        let hits = Arc::new(AtomicUsize::new(0));
        let state = web::Data::new(ServerState {
            hits: hits.clone(),
            failures_before_ready,
            ready_status,
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .default_service(web::route().to(respond))
        })
        .workers(1)
        .disable_signals()
        .listen_rustls_0_23(listener, tls)
        .expect("failed to bind TLS listener")
        .run();

        let handle = server.handle();
        tokio::spawn(server);

        Self { port, hits, handle }
    }

    /// Number of requests the server has answered so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

async fn respond(state: web::Data<ServerState>) -> HttpResponse {
    let seen = state.hits.fetch_add(1, Ordering::SeqCst);
    if seen < state.failures_before_ready {
        return HttpResponse::InternalServerError().finish();
    }

    if state.ready_status == StatusCode::OK {
        HttpResponse::Ok().json(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "response": {
                "uid": "00000000-0000-0000-0000-000000000000",
                "allowed": true,
            },
        }))
    } else {
        HttpResponse::build(state.ready_status).finish()
    }
}

fn tls_config(bundle: &CertificateBundle) -> rustls::ServerConfig {
    // Several rustls crypto providers end up linked into the test binary;
    // pin the process default so ServerConfig::builder() is unambiguous.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut cert_reader = bundle.leaf_cert();
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .expect("failed to parse leaf certificate");

    let mut key_reader = bundle.leaf_key();
    let key = rustls_pemfile::private_key(&mut key_reader)
        .expect("failed to parse leaf key")
        .expect("leaf key PEM holds no private key");

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .expect("failed to build TLS config")
}
