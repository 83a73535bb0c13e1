// Domain model: device identifiers, telemetry readings and remote commands.

pub mod command;
pub mod device_id;
pub mod reading;

pub use command::{CommandRequest, CommandResponse, DeviceCommand};
pub use device_id::DeviceId;
pub use reading::{MetricKind, MetricValue, Metrics, Readings, TelemetryReading};
