//! Self-signed certificate issuance for the host-side webhook endpoint.
//!
//! The bootstrap issues one certificate bundle per environment lifetime: a
//! self-signed CA and a leaf certificate signed by it, covering every subject
//! alternative name the endpoint may be reached through. The three PEM
//! artifacts are written under fixed relative names so a host webhook server
//! can be pointed at the same directory, and are read back into memory for
//! embedding into client-configs.
//!
//! Issuance is local and deterministic, so failures are fatal and never
//! retried. There is no rotation: a bundle is immutable once issued.

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose,
};
use time::OffsetDateTime;

use crate::error::{EnvError, EnvResult, ErrorKind};
use crate::env_error;

/// Filename for the CA certificate PEM file.
pub const CA_CERT_FILE_NAME: &str = "cert-ca.pem";

/// Filename for the leaf TLS certificate PEM file.
pub const CERT_FILE_NAME: &str = "cert-tls.pem";

/// Filename for the leaf TLS private key PEM file.
pub const KEY_FILE_NAME: &str = "key-tls.pem";

/// Subject alternative names baked into the leaf certificate by default.
///
/// The list covers the networking topologies through which a cluster can
/// reach a webhook server running on the host: container-runtime host
/// aliases, loopback, the common bridge-network gateway addresses, and
/// in-cluster service wildcards.
pub const DEFAULT_CERTIFICATE_SANS: &[&str] = &[
    "host.docker.internal",
    "host.testcontainers.internal",
    "localhost",
    "*.*.svc",
    "*.*.svc.cluster.local",
    "127.0.0.1",
    "172.17.0.1",
    "172.18.0.1",
    "172.19.0.1",
    "172.20.0.1",
];

const CA_COMMON_NAME: &str = "kenv-ca";
const LEAF_COMMON_NAME: &str = "kenv-webhook";

/// The certificate and key material for one environment lifetime.
///
/// All fields are PEM-encoded and immutable after issuance; the bundle and
/// any HTTPS client derived from it can be shared freely across poll calls.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    ca_cert: Vec<u8>,
    leaf_cert: Vec<u8>,
    leaf_key: Vec<u8>,
}

impl CertificateBundle {
    /// The CA certificate in PEM form.
    pub fn ca_cert(&self) -> &[u8] {
        &self.ca_cert
    }

    /// The leaf certificate in PEM form.
    pub fn leaf_cert(&self) -> &[u8] {
        &self.leaf_cert
    }

    /// The leaf private key in PEM form.
    pub fn leaf_key(&self) -> &[u8] {
        &self.leaf_key
    }

    /// The CA certificate as a base64 string, ready for embedding into a
    /// webhook client-config `caBundle` field.
    pub fn ca_bundle(&self) -> String {
        BASE64_STANDARD.encode(&self.ca_cert)
    }
}

/// Issues a CA and a leaf certificate into `path`, valid for `validity` and
/// covering every name in `sans`.
///
/// The target directory is created if missing; the three PEM artifacts are
/// written under [`CA_CERT_FILE_NAME`], [`CERT_FILE_NAME`], and
/// [`KEY_FILE_NAME`] and read back into the returned bundle.
pub fn issue(path: &Path, validity: Duration, sans: &[String]) -> EnvResult<CertificateBundle> {
    fs::create_dir_all(path).map_err(|e| {
        env_error!(
            ErrorKind::IoError,
            "failed to create certificate directory",
            format!("{}: {e}", path.display())
        )
    })?;

    let not_before = OffsetDateTime::now_utc();
    let not_after = not_before + validity;

    let ca_key = KeyPair::generate()?;
    let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
    ca_params.distinguished_name = distinguished_name(CA_COMMON_NAME);
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    ca_params.not_before = not_before;
    ca_params.not_after = not_after;
    let ca_cert = ca_params.self_signed(&ca_key)?;
    let ca_cert_pem = ca_cert.pem();

    let leaf_key = KeyPair::generate()?;
    let mut leaf_params = CertificateParams::new(sans.to_vec())?;
    leaf_params.distinguished_name = distinguished_name(LEAF_COMMON_NAME);
    leaf_params.is_ca = IsCa::NoCa;
    leaf_params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    leaf_params.not_before = not_before;
    leaf_params.not_after = not_after;

    let issuer = Issuer::from_ca_cert_pem(&ca_cert_pem, ca_key)?;
    let leaf_cert = leaf_params.signed_by(&leaf_key, &issuer)?;

    write_artifact(path, CA_CERT_FILE_NAME, ca_cert_pem.as_bytes())?;
    write_artifact(path, CERT_FILE_NAME, leaf_cert.pem().as_bytes())?;
    write_artifact(path, KEY_FILE_NAME, leaf_key.serialize_pem().as_bytes())?;

    Ok(CertificateBundle {
        ca_cert: read_artifact(path, CA_CERT_FILE_NAME)?,
        leaf_cert: read_artifact(path, CERT_FILE_NAME)?,
        leaf_key: read_artifact(path, KEY_FILE_NAME)?,
    })
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn
}

fn write_artifact(dir: &Path, name: &str, contents: &[u8]) -> EnvResult<()> {
    let full_path = dir.join(name);
    fs::write(&full_path, contents).map_err(|e| {
        env_error!(
            ErrorKind::IoError,
            "failed to write certificate artifact",
            format!("{}: {e}", full_path.display())
        )
    })
}

fn read_artifact(dir: &Path, name: &str) -> EnvResult<Vec<u8>> {
    let full_path = dir.join(name);
    fs::read(&full_path).map_err(|e| {
        env_error!(
            ErrorKind::IoError,
            "failed to read back certificate artifact",
            format!("{}: {e}", full_path.display())
        )
    })
}
