// ── Runtime hub configuration ──
//
// Everything the cloud publisher needs to provision the gateway and open
// its hub session. Core never reads configuration files; the binary loads
// a `CloudConfig` through ruuvigate-config and hands it in.

use std::time::Duration;

use secrecy::SecretString;

use ruuvigate_api::{Registration, TlsMode, TransportConfig};

/// Connection parameters for the cloud publisher.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Symmetric device key used for provisioning and the hub session.
    pub device_key: SecretString,
    /// Registration id of this gateway.
    pub device_id: String,
    /// Provisioning scope the device is enrolled in.
    pub id_scope: String,
    /// Provisioning service host (scheme optional, defaults to https).
    pub provisioning_host: String,
    /// Device model announced during provisioning.
    pub model_id: String,
    /// TLS verification strategy.
    pub tls: TlsMode,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl CloudConfig {
    pub fn new(
        device_key: SecretString,
        device_id: impl Into<String>,
        id_scope: impl Into<String>,
        provisioning_host: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            device_key,
            device_id: device_id.into(),
            id_scope: id_scope.into(),
            provisioning_host: provisioning_host.into(),
            model_id: model_id.into(),
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }

    pub(crate) fn registration(&self) -> Registration {
        Registration {
            id_scope: self.id_scope.clone(),
            registration_id: self.device_id.clone(),
            device_key: self.device_key.clone(),
            model_id: self.model_id.clone(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: self.tls.clone(),
            timeout: self.timeout,
        }
    }
}
