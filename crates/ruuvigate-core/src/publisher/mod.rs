//! Telemetry publishers.
//!
//! A [`Publisher`] is where readings end up. Metrics are buffered between
//! flushes in a [`TelemetryBuffer`] owned by the publisher, and
//! [`Publisher::publish`] sends the whole buffer as one message. Publishers
//! that can receive remote commands wire up a [`CommandDispatcher`] per
//! command in [`Publisher::register_command_listener`].
//!
//! [`CommandDispatcher`]: crate::dispatcher::CommandDispatcher

mod cloud;
mod stdout;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::CoreError;
use crate::model::{DeviceCommand, Metrics};
use crate::registry::DeviceRegistry;
use crate::shutdown::ShutdownCoordinator;

pub use cloud::{CloudCommands, CloudPublisher, COMPONENT_PREFIX};
pub use stdout::StdoutPublisher;

// ── Publisher ────────────────────────────────────────────────────────

/// A telemetry sink, optionally with an inbound command channel.
pub trait Publisher: Send + Sync + 'static {
    /// What [`connect`](Self::connect) needs.
    type Config: Send + Sync;

    /// Establish whatever the sink needs. Failure is fatal to startup.
    fn connect(&self, config: &Self::Config) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Merge `metrics` into the pending buffer. No I/O.
    fn buffer_data(&self, metrics: Metrics);

    /// Send the buffered metrics as one message and clear the buffer.
    ///
    /// An empty buffer sends nothing.
    fn publish(&self) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Start a listener for `command` that runs until shutdown.
    ///
    /// Sinks without an inbound channel accept and ignore the request.
    fn register_command_listener(
        &self,
        command: DeviceCommand,
        registry: Arc<DeviceRegistry>,
        coordinator: &mut ShutdownCoordinator,
    ) -> Result<(), CoreError> {
        let _ = (command, registry, coordinator);
        Ok(())
    }

    /// Release the sink. Called once, after every activity has stopped.
    fn disconnect(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Selectable publisher implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublisherKind {
    /// Managed hub service, with remote registry commands.
    #[default]
    Cloud,
    /// JSON lines on standard output.
    Stdout,
}

impl PublisherKind {
    pub const ALL: [Self; 2] = [Self::Cloud, Self::Stdout];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Stdout => "stdout",
        }
    }
}

impl fmt::Display for PublisherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── TelemetryBuffer ──────────────────────────────────────────────────

/// Metrics accumulated between flushes.
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    pending: Mutex<Metrics>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `metrics`, overwriting older values under the same name.
    pub fn extend(&self, metrics: Metrics) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(metrics);
    }

    /// Swap the buffer out, leaving it empty.
    pub fn take(&self) -> Metrics {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
