// ruuvigate-core: RuuviTag registry, telemetry pipeline and remote commands.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod model;
pub mod poll;
pub mod publisher;
pub mod reader;
pub mod registry;
pub mod shutdown;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::CloudConfig;
pub use dispatcher::{CommandChannel, CommandDispatcher};
pub use error::CoreError;
pub use gateway::Gateway;
pub use poll::PollLoop;
pub use publisher::{CloudPublisher, Publisher, PublisherKind, StdoutPublisher, TelemetryBuffer};
pub use reader::{SensorReader, SimulatedReader};
pub use registry::DeviceRegistry;
pub use shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownReason, TerminationSignals};

pub use ruuvigate_api::TlsMode;

pub use model::{
    CommandRequest, CommandResponse, DeviceCommand, DeviceId, MetricKind, MetricValue, Metrics,
    Readings, TelemetryReading,
};
