// ── Cloud publisher ──
//
// Provisions the gateway with the hub's provisioning service, opens the
// device session, and then sends one telemetry message per flush. Remote
// registry commands arrive as method requests on the same session; their
// names are qualified with the device model's component prefix.

use std::sync::{Arc, Mutex, PoisonError};

use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ruuvigate_api::{
    HubSession, MethodRequests, MethodResponse, ProvisioningClient, TelemetryMessage, session_url,
};

use super::{Publisher, TelemetryBuffer};
use crate::config::CloudConfig;
use crate::dispatcher::{CommandChannel, CommandDispatcher};
use crate::error::CoreError;
use crate::model::{CommandRequest, CommandResponse, DeviceCommand, Metrics};
use crate::registry::DeviceRegistry;
use crate::shutdown::ShutdownCoordinator;

/// Component qualifier for method names on the wire.
pub const COMPONENT_PREFIX: &str = "RuuviGate_250*";

/// Publisher backed by the managed hub service.
#[derive(Default)]
pub struct CloudPublisher {
    buffer: TelemetryBuffer,
    session: Mutex<Option<HubSession>>,
}

impl CloudPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<HubSession, CoreError> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CoreError::NotConnected)
    }

    /// Wire name of `command`.
    pub fn method_name(command: DeviceCommand) -> String {
        format!("{COMPONENT_PREFIX}{}", command.name())
    }
}

fn validate(config: &CloudConfig) -> Result<(), CoreError> {
    let fields = [
        ("device key", config.device_key.expose_secret()),
        ("device id", config.device_id.as_str()),
        ("id scope", config.id_scope.as_str()),
        ("provisioning host", config.provisioning_host.as_str()),
        ("model id", config.model_id.as_str()),
    ];
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(CoreError::Config {
            message: format!("{name} must not be empty"),
        }),
        None => Ok(()),
    }
}

fn connection_error(endpoint: &str, err: ruuvigate_api::Error) -> CoreError {
    if err.is_auth() {
        return CoreError::from(err);
    }
    CoreError::ConnectionFailed {
        endpoint: endpoint.to_owned(),
        reason: err.to_string(),
    }
}

impl Publisher for CloudPublisher {
    type Config = CloudConfig;

    async fn connect(&self, config: &CloudConfig) -> Result<(), CoreError> {
        validate(config)?;
        let host = config.provisioning_host.as_str();

        let provisioning = ProvisioningClient::new(host, &config.transport())
            .map_err(|e| connection_error(host, e))?;
        info!(endpoint = %provisioning.endpoint(), device_id = %config.device_id, "provisioning device");
        let assignment = provisioning
            .register(&config.registration())
            .await
            .map_err(|e| connection_error(host, e))?;

        let url = session_url(&assignment).map_err(|e| connection_error(&assignment.assigned_hub, e))?;
        let session =
            HubSession::connect(&url, &config.device_key, &config.tls, CancellationToken::new())
                .await
                .map_err(|e| {
                    warn!(
                        hub = %assignment.assigned_hub,
                        "unable to connect to the hub; is this device provisioned?"
                    );
                    connection_error(&assignment.assigned_hub, e)
                })?;

        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        info!(hub = %assignment.assigned_hub, device_id = %assignment.device_id, "connected to hub");
        Ok(())
    }

    fn buffer_data(&self, metrics: Metrics) {
        self.buffer.extend(metrics);
    }

    async fn publish(&self) -> Result<(), CoreError> {
        let session = self.session()?;
        let metrics = self.buffer.take();
        if metrics.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_value(&metrics).map_err(|e| CoreError::Publish {
            message: e.to_string(),
        })?;
        let message = TelemetryMessage::json(body);
        session.send_telemetry(&message).await.map_err(|e| match e {
            ruuvigate_api::Error::SessionClosed => CoreError::Publish {
                message: "hub session is closed".into(),
            },
            other => CoreError::from(other),
        })?;

        info!(message_id = %message.message_id, metrics = metrics.len(), "sent telemetry message");
        Ok(())
    }

    fn register_command_listener(
        &self,
        command: DeviceCommand,
        registry: Arc<DeviceRegistry>,
        coordinator: &mut ShutdownCoordinator,
    ) -> Result<(), CoreError> {
        let session = self.session()?;
        let method_name = Self::method_name(command);
        let channel = CloudCommands {
            requests: session.method_requests(&method_name),
            session,
        };
        let dispatcher = CommandDispatcher::new(command, channel, registry, coordinator.handle());
        coordinator.spawn(method_name, move |cancel| dispatcher.run(cancel));
        Ok(())
    }

    async fn disconnect(&self) {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(session) = session {
            session.close().await;
            debug!("hub session released");
        }
    }
}

// ── Command channel over the hub session ─────────────────────────────

/// Method requests for one command, answered over the same session.
pub struct CloudCommands {
    requests: MethodRequests,
    session: HubSession,
}

impl CommandChannel for CloudCommands {
    async fn next(&mut self) -> Option<CommandRequest> {
        let request = self.requests.recv().await?;
        let command = request
            .method_name
            .strip_prefix(COMPONENT_PREFIX)
            .unwrap_or(&request.method_name)
            .to_owned();
        Some(CommandRequest {
            request_id: request.request_id,
            command,
            payload: request.payload,
        })
    }

    async fn respond(&self, request_id: &str, response: &CommandResponse) -> Result<(), CoreError> {
        let response = MethodResponse {
            request_id: request_id.to_owned(),
            status: response.status(),
            payload: response.to_value(),
        };
        self.session.respond(&response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> CloudConfig {
        CloudConfig::new(
            SecretString::from("key".to_string()),
            "gw-01",
            "0ne000",
            "127.0.0.1:9",
            "dtmi:ruuvigate:gateway;1",
        )
    }

    #[test]
    fn method_names_are_component_qualified() {
        assert_eq!(
            CloudPublisher::method_name(DeviceCommand::Add),
            "RuuviGate_250*AddRuuviTag"
        );
        assert_eq!(
            CloudPublisher::method_name(DeviceCommand::List),
            "RuuviGate_250*GetRuuviTags"
        );
    }

    #[tokio::test]
    async fn unconnected_publisher_refuses_to_publish() {
        let publisher = CloudPublisher::new();
        publisher.buffer_data(Metrics::new());
        assert!(matches!(publisher.publish().await, Err(CoreError::NotConnected)));
    }

    #[tokio::test]
    async fn unconnected_publisher_refuses_listeners() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DeviceRegistry::open(dir.path().join("tags")).await.unwrap());
        let mut coordinator = ShutdownCoordinator::new();
        let result = CloudPublisher::new().register_command_listener(
            DeviceCommand::Add,
            registry,
            &mut coordinator,
        );
        assert!(matches!(result, Err(CoreError::NotConnected)));
        assert!(coordinator.is_empty());
    }

    #[tokio::test]
    async fn empty_config_value_fails_before_any_io() {
        let mut cfg = config();
        cfg.model_id = "  ".into();
        let err = CloudPublisher::new().connect(&cfg).await.unwrap_err();
        assert!(matches!(err, CoreError::Config { ref message } if message.contains("model id")));
    }

    #[tokio::test]
    async fn unreachable_provisioning_is_a_connection_failure() {
        let mut cfg = config();
        cfg.timeout = std::time::Duration::from_secs(2);
        let err = CloudPublisher::new().connect(&cfg).await.unwrap_err();
        assert!(matches!(err, CoreError::ConnectionFailed { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn disconnect_without_session_is_a_no_op() {
        CloudPublisher::new().disconnect().await;
    }
}
