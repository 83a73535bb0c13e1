// Device provisioning client
//
// Registers the device with the provisioning service and learns which hub
// it is assigned to. Registration may complete immediately ("assigned")
// or asynchronously ("assigning"), in which case the operation status is
// polled until it settles.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLLS: u32 = 10;

/// Everything the provisioning service needs to identify the device.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id_scope: String,
    pub registration_id: String,
    pub device_key: SecretString,
    pub model_id: String,
}

/// The hub a device was assigned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Host (or `ws://`/`wss://` base URL) of the assigned hub.
    pub assigned_hub: String,
    /// Device id as known by the hub.
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationStatus {
    #[serde(default)]
    operation_id: Option<String>,
    status: String,
    #[serde(default)]
    registration_state: Option<RegistrationState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationState {
    #[serde(default)]
    assigned_hub: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
}

/// HTTP client for the provisioning service.
#[derive(Debug, Clone)]
pub struct ProvisioningClient {
    http: reqwest::Client,
    endpoint: Url,
    poll_interval: Duration,
    max_polls: u32,
}

impl ProvisioningClient {
    /// Create a client for the given provisioning endpoint.
    ///
    /// An endpoint without a scheme (e.g. `global.azure-devices-provisioning.net`)
    /// is treated as `https://`.
    pub fn new(endpoint: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, parse_endpoint(endpoint)?))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Override the fallback delay between status polls, used when the
    /// service sends no `Retry-After` header.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override how many status polls are made before giving up.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// The provisioning endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Register the device and wait for its hub assignment.
    pub async fn register(&self, registration: &Registration) -> Result<Assignment, Error> {
        let url = self.url(&[
            &registration.id_scope,
            "registrations",
            &registration.registration_id,
            "register",
        ])?;
        debug!(%url, registration_id = %registration.registration_id, "registering device");

        let body = json!({
            "registrationId": registration.registration_id,
            "payload": { "modelId": registration.model_id },
        });
        let resp = self
            .http
            .put(url)
            .header(AUTHORIZATION, auth_header(&registration.device_key))
            .json(&body)
            .send()
            .await?;
        let (mut status, mut retry_after) = read_status(resp).await?;

        let mut polls = 0;
        while status.status == "assigning" {
            if polls >= self.max_polls {
                return Err(Error::ProvisioningTimeout { attempts: polls });
            }
            let operation_id = status.operation_id.take().ok_or_else(|| {
                Error::Deserialization {
                    message: "'assigning' status without an operationId".into(),
                    body: String::new(),
                }
            })?;
            tokio::time::sleep(retry_after.unwrap_or(self.poll_interval)).await;
            polls += 1;

            debug!(%operation_id, poll = polls, "polling registration status");
            let url = self.url(&[
                &registration.id_scope,
                "registrations",
                &registration.registration_id,
                "operations",
                &operation_id,
            ])?;
            let resp = self
                .http
                .get(url)
                .header(AUTHORIZATION, auth_header(&registration.device_key))
                .send()
                .await?;
            (status, retry_after) = read_status(resp).await?;
            if status.operation_id.is_none() {
                status.operation_id = Some(operation_id);
            }
        }

        if status.status != "assigned" {
            return Err(Error::NotAssigned {
                status: status.status,
            });
        }

        let state = status.registration_state.unwrap_or(RegistrationState {
            assigned_hub: None,
            device_id: None,
        });
        let assigned_hub = state.assigned_hub.ok_or_else(|| Error::Deserialization {
            message: "assigned registration is missing assignedHub".into(),
            body: String::new(),
        })?;
        let device_id = state
            .device_id
            .unwrap_or_else(|| registration.registration_id.clone());

        info!(%assigned_hub, %device_id, "device was assigned");
        Ok(Assignment {
            assigned_hub,
            device_id,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// `Authorization` header value carrying the device key.
pub(crate) fn auth_header(key: &SecretString) -> String {
    format!("SharedAccessKey {}", key.expose_secret())
}

fn parse_endpoint(endpoint: &str) -> Result<Url, Error> {
    if endpoint.contains("://") {
        Ok(Url::parse(endpoint)?)
    } else {
        Ok(Url::parse(&format!("https://{endpoint}"))?)
    }
}

async fn read_status(
    resp: reqwest::Response,
) -> Result<(RegistrationStatus, Option<Duration>), Error> {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("provisioning rejected the device key (HTTP {status}): {body}"),
        });
    }
    if !status.is_success() {
        return Err(Error::Provisioning {
            status: status.as_u16(),
            message: body,
        });
    }

    let parsed = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })?;
    Ok((parsed, retry_after))
}
