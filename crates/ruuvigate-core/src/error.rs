// ── Core error types ──
//
// Errors surfaced by ruuvigate-core. Hub transport failures arrive as
// `ruuvigate_api::Error` and are translated by the `From` impl below, so
// callers only ever match on domain variants.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Not a valid MAC address: {value:?}")]
    InvalidDeviceId { value: String },

    #[error("Malformed line {line} in RuuviTags file {}: {content:?}", path.display())]
    RegistryLoad {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Failed to persist RuuviTags file {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub via {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Publisher is not connected")]
    NotConnected,

    // ── Publishing / command errors ──────────────────────────────────
    #[error("Failed to publish telemetry: {message}")]
    Publish { message: String },

    #[error("Command channel closed")]
    ChannelClosed,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Process errors ───────────────────────────────────────────────
    #[error("Cannot install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl CoreError {
    /// Whether this error means the registry can no longer be trusted to
    /// match its backing store.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ruuvigate_api::Error> for CoreError {
    fn from(err: ruuvigate_api::Error) -> Self {
        use ruuvigate_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::SessionClosed => CoreError::ChannelClosed,
            Api::Send { what, reason } => CoreError::Publish {
                message: format!("failed to send {what}: {reason}"),
            },
            Api::Serialization(e) => CoreError::Publish {
                message: e.to_string(),
            },
            Api::Transport(ref e) => CoreError::ConnectionFailed {
                endpoint: e
                    .url()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<unknown>".into()),
                reason: err.to_string(),
            },
            other @ (Api::NotAssigned { .. }
            | Api::ProvisioningTimeout { .. }
            | Api::Provisioning { .. }
            | Api::InvalidUrl(_)
            | Api::Tls(_)
            | Api::WebSocketConnect(_)
            | Api::Deserialization { .. }) => CoreError::ConnectionFailed {
                endpoint: "<hub>".into(),
                reason: other.to_string(),
            },
        }
    }
}
