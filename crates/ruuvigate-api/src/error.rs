use thiserror::Error;

/// Top-level error type for the `ruuvigate-api` crate.
///
/// Covers every failure mode of the hub service surfaces:
/// provisioning, authentication, transport, and the device session.
/// `ruuvigate-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The service rejected the device key (HTTP 401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Provisioning ────────────────────────────────────────────────
    /// Registration finished without the device being assigned to a hub.
    #[error("Device was not assigned to a hub (status: {status})")]
    NotAssigned { status: String },

    /// Registration was still in progress after the last status poll.
    #[error("Provisioning did not complete after {attempts} status polls")]
    ProvisioningTimeout { attempts: u32 },

    /// The provisioning endpoint answered with a non-success status.
    #[error("Provisioning request failed (HTTP {status}): {message}")]
    Provisioning { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The provisioning service could not be reached or the request failed
    /// below HTTP.
    #[error("Provisioning transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The configured CA could not be loaded or the client not built.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Session ─────────────────────────────────────────────────────
    /// The hub refused or dropped the session upgrade.
    #[error("Hub session could not be opened: {0}")]
    WebSocketConnect(String),

    /// The session is closed; nothing more can be sent or received.
    #[error("Session closed")]
    SessionClosed,

    /// Sending a frame over an open session failed.
    #[error("Failed to send {what}: {reason}")]
    Send { what: &'static str, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A provisioning response did not have the expected shape. `body` keeps
    /// the raw text for debug logs.
    #[error("Unexpected provisioning response: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of an outbound frame failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this error indicates the device credentials
    /// were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
