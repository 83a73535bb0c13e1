//! Cloud configuration for RuuviGate.
//!
//! The cloud publisher is configured from a YAML file holding the device
//! provisioning parameters. Each key can be overridden by a process
//! environment variable of the same name. Every key is required and an
//! empty value counts as missing, so a bad file fails before any
//! connection is attempted.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use ruuvigate_core::CloudConfig;

pub const DEVICE_KEY: &str = "IOTHUB_DEVICE_DPS_DEVICE_KEY";
pub const DEVICE_ID: &str = "IOTHUB_DEVICE_DPS_DEVICE_ID";
pub const ID_SCOPE: &str = "IOTHUB_DEVICE_DPS_ID_SCOPE";
pub const ENDPOINT: &str = "IOTHUB_DEVICE_DPS_ENDPOINT";
pub const MODEL_ID: &str = "IOTHUB_DEVICE_DPS_MODEL_ID";

/// Every key the cloud configuration must provide.
pub const REQUIRED_KEYS: [&str; 5] = [DEVICE_KEY, DEVICE_ID, ID_SCOPE, ENDPOINT, MODEL_ID];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("configuration is missing required key {key}")]
    MissingKey { key: &'static str },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── File shape ──────────────────────────────────────────────────────

/// A YAML or environment scalar. Ids made only of digits arrive as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Integer(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCloudConfig {
    #[serde(rename = "IOTHUB_DEVICE_DPS_DEVICE_KEY")]
    device_key: Option<Scalar>,
    #[serde(rename = "IOTHUB_DEVICE_DPS_DEVICE_ID")]
    device_id: Option<Scalar>,
    #[serde(rename = "IOTHUB_DEVICE_DPS_ID_SCOPE")]
    id_scope: Option<Scalar>,
    #[serde(rename = "IOTHUB_DEVICE_DPS_ENDPOINT")]
    endpoint: Option<Scalar>,
    #[serde(rename = "IOTHUB_DEVICE_DPS_MODEL_ID")]
    model_id: Option<Scalar>,
}

fn required(value: Option<Scalar>, key: &'static str) -> Result<String, ConfigError> {
    match value.map(Scalar::into_string) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingKey { key }),
    }
}

impl RawCloudConfig {
    fn into_cloud_config(self) -> Result<CloudConfig, ConfigError> {
        let device_key = required(self.device_key, DEVICE_KEY)?;
        let device_id = required(self.device_id, DEVICE_ID)?;
        let id_scope = required(self.id_scope, ID_SCOPE)?;
        let endpoint = required(self.endpoint, ENDPOINT)?;
        let model_id = required(self.model_id, MODEL_ID)?;

        Ok(CloudConfig::new(
            SecretString::from(device_key),
            device_id,
            id_scope,
            endpoint,
            model_id,
        ))
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Figment for `path`: the YAML file, then same-named env variables.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::raw().only(&REQUIRED_KEYS).lowercase(false))
}

/// Load and validate the cloud configuration at `path`.
pub fn load_cloud_config(path: &Path) -> Result<CloudConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let raw: RawCloudConfig = figment(path).extract()?;
    raw.into_cloud_config()
}
