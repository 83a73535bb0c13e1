//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with help text and
//! sysexits-style exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use ruuvigate_config::ConfigError;
use ruuvigate_core::CoreError;

/// Process exit codes (sysexits.h).
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 64;
    pub const DATAERR: i32 = 65;
    pub const NOINPUT: i32 = 66;
    pub const UNAVAILABLE: i32 = 69;
    pub const SOFTWARE: i32 = 70;
    pub const IOERR: i32 = 74;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Usage ────────────────────────────────────────────────────────
    #[error("Configuration file needed when not using 'stdout' mode")]
    #[diagnostic(
        code(ruuvigate::config_required),
        help("Pass --config <PATH>, or use --mode stdout to print measurements locally.")
    )]
    ConfigRequired,

    #[error("Polling interval must be at least one second")]
    #[diagnostic(code(ruuvigate::invalid_interval), help("Pass --interval 1 or more."))]
    InvalidInterval,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Given configuration doesn't exist ({})", path.display())]
    #[diagnostic(code(ruuvigate::config_not_found))]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration is missing {key}")]
    #[diagnostic(
        code(ruuvigate::config_missing_key),
        help("Set {key} in the configuration file or as an environment variable.")
    )]
    MissingConfigKey { key: &'static str },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(ruuvigate::config_invalid))]
    InvalidConfig { message: String },

    #[error(transparent)]
    #[diagnostic(code(ruuvigate::config))]
    Config(Box<figment::Error>),

    // ── Registry ─────────────────────────────────────────────────────
    #[error("Malformed line {line} in RuuviTags file {}: {content:?}", path.display())]
    #[diagnostic(
        code(ruuvigate::registry_malformed),
        help("Each non-blank line must be one MAC address, e.g. 12:34:56:78:90:AB.")
    )]
    InvalidRegistry {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Cannot access RuuviTags file {}", path.display())]
    #[diagnostic(code(ruuvigate::registry_io))]
    RegistryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Unable to connect to the hub via {endpoint}: {reason}")]
    #[diagnostic(
        code(ruuvigate::connection_failed),
        help(
            "Check the connection parameters in the configuration file.\n\
             Is this device provisioned in the hub service?"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("The hub rejected the device credentials: {message}")]
    #[diagnostic(
        code(ruuvigate::auth_failed),
        help("Verify IOTHUB_DEVICE_DPS_DEVICE_KEY and IOTHUB_DEVICE_DPS_DEVICE_ID.")
    )]
    AuthFailed { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Lost the connection to the hub: {reason}")]
    #[diagnostic(
        code(ruuvigate::connection_lost),
        help("RuuviGate does not reconnect on its own; restart it, e.g. from a service manager.")
    )]
    ConnectionLost { reason: String },

    #[error("RuuviGate stopped after a fatal error: {reason}")]
    #[diagnostic(code(ruuvigate::fatal))]
    Fatal { reason: String },

    #[error(transparent)]
    #[diagnostic(code(ruuvigate::internal))]
    Internal(CoreError),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::ConfigNotFound { path },
            ConfigError::MissingKey { key } => Self::MissingConfigKey { key },
            ConfigError::Figment(e) => Self::Config(e),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::RegistryLoad {
                path,
                line,
                content,
            } => Self::InvalidRegistry {
                path,
                line,
                content,
            },
            CoreError::Io { path, source } | CoreError::Persistence { path, source } => {
                Self::RegistryIo { path, source }
            }
            CoreError::ConnectionFailed { endpoint, reason } => {
                Self::ConnectionFailed { endpoint, reason }
            }
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Config { message } => Self::InvalidConfig { message },
            other => Self::Internal(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigRequired => exit_code::USAGE,
            Self::ConfigNotFound { .. } => exit_code::NOINPUT,
            Self::MissingConfigKey { .. }
            | Self::InvalidConfig { .. }
            | Self::Config(_)
            | Self::InvalidInterval
            | Self::InvalidRegistry { .. } => exit_code::DATAERR,
            Self::RegistryIo { .. } | Self::Fatal { .. } => exit_code::IOERR,
            Self::ConnectionFailed { .. } | Self::AuthFailed { .. } | Self::ConnectionLost { .. } => {
                exit_code::UNAVAILABLE
            }
            Self::Internal(CoreError::Signal(_)) => exit_code::SOFTWARE,
            Self::Internal(_) => exit_code::GENERAL,
        }
    }
}
