// TLS and HTTP client construction.
//
// TLS trust and the request timeout come from the gateway's cloud
// configuration. A custom CA applies to both the provisioning client and
// the hub session.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::RootCertStore;
use tokio_tungstenite::Connector;

use crate::error::Error;

const USER_AGENT: &str = concat!("ruuvigate/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which certificate authorities the gateway trusts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Bundled web PKI roots.
    #[default]
    System,
    /// Additionally trust the CA in this PEM file (private hub deployments).
    CustomCa(PathBuf),
}

impl TlsMode {
    /// Connector for the hub session's WebSocket upgrade.
    ///
    /// `None` keeps tokio-tungstenite's bundled web PKI roots.
    pub fn session_connector(&self) -> Result<Option<Connector>, Error> {
        match self {
            Self::System => Ok(None),
            Self::CustomCa(path) => {
                Ok(Some(Connector::Rustls(Arc::new(rustls_client_config(path)?))))
            }
        }
    }
}

/// Settings shared by every HTTP request the gateway makes.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// A `reqwest::Client` honouring the timeout and trust settings.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        let builder = match &self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(path) => builder.add_root_certificate(read_ca(path)?),
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("cannot build provisioning client: {e}")))
    }
}

fn read_ca(path: &Path) -> Result<reqwest::Certificate, Error> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read CA file {}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| Error::Tls(format!("{} is not a PEM certificate: {e}", path.display())))
}

/// Web PKI roots plus every certificate in the PEM file at `ca`.
fn rustls_client_config(ca: &Path) -> Result<rustls::ClientConfig, Error> {
    let file = File::open(ca)
        .map_err(|e| Error::Tls(format!("cannot read CA file {}: {e}", ca.display())))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let bundled = roots.len();

    for cert in rustls_pemfile::certs(&mut BufReader::new(file)) {
        let cert = cert
            .map_err(|e| Error::Tls(format!("{} is not a PEM certificate: {e}", ca.display())))?;
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("cannot trust CA in {}: {e}", ca.display())))?;
    }
    if roots.len() == bundled {
        return Err(Error::Tls(format!("no certificates found in {}", ca.display())));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("cannot configure TLS: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}
