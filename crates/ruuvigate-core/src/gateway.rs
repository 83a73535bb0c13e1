// ── Gateway ──
//
// Wires the registry, reader and publisher together: connect the
// publisher, start one listener per remote command plus the poll loop,
// wait for shutdown, then release the publisher.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::CoreError;
use crate::model::DeviceCommand;
use crate::poll::PollLoop;
use crate::publisher::Publisher;
use crate::reader::SensorReader;
use crate::registry::DeviceRegistry;
use crate::shutdown::{ShutdownCoordinator, ShutdownReason, TerminationSignals};

/// A configured gateway, ready to run.
pub struct Gateway<P, R> {
    registry: Arc<DeviceRegistry>,
    publisher: Arc<P>,
    reader: Arc<R>,
    interval: Duration,
}

impl<P: Publisher, R: SensorReader> Gateway<P, R> {
    pub fn new(registry: DeviceRegistry, publisher: P, reader: R, interval: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            publisher: Arc::new(publisher),
            reader: Arc::new(reader),
            interval,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn publisher(&self) -> &Arc<P> {
        &self.publisher
    }

    /// Run until SIGINT/SIGTERM or a fatal error.
    ///
    /// Signal handlers are installed before connecting so an early signal
    /// still shuts down cleanly.
    pub async fn run(self, config: &P::Config) -> Result<ShutdownReason, CoreError> {
        let signals = TerminationSignals::install()?;
        self.run_until(config, signals.recv()).await
    }

    /// Run until `trigger` resolves or a fatal error is escalated.
    ///
    /// Returns an error only if the publisher cannot connect or a listener
    /// cannot be registered; nothing has been spawned in that case.
    pub async fn run_until<F>(self, config: &P::Config, trigger: F) -> Result<ShutdownReason, CoreError>
    where
        F: Future<Output = String>,
    {
        self.publisher.connect(config).await?;

        let mut coordinator = ShutdownCoordinator::new();
        for command in DeviceCommand::ALL {
            if let Err(e) = self.publisher.register_command_listener(
                command,
                Arc::clone(&self.registry),
                &mut coordinator,
            ) {
                // Stop whatever was already spawned before bailing out.
                coordinator.run_until(async { String::from("startup failure") }).await;
                self.publisher.disconnect().await;
                return Err(e);
            }
        }

        let poll = PollLoop::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.publisher),
            Arc::clone(&self.reader),
            self.interval,
        );
        coordinator.spawn("poll", move |cancel| poll.run(cancel));
        info!(activities = coordinator.len(), "RuuviGate is running");

        let reason = coordinator.run_until(trigger).await;
        self.publisher.disconnect().await;
        info!(?reason, "RuuviGate was shut down");
        Ok(reason)
    }
}
