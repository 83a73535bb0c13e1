// ── Telemetry readings ──
//
// One `TelemetryReading` per device per poll cycle. Readings are turned
// into flat metric maps whose keys carry the device's 1-based position in
// the polled snapshot, e.g. `Temperature1`, `Sequence3`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::DeviceId;

/// Measurements reported by one RuuviTag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub battery: f64,
    pub measurement_sequence_number: u64,
}

/// Readings collected in one cycle, keyed by device.
pub type Readings = HashMap<DeviceId, TelemetryReading>;

/// Buffered metrics, keyed by metric name.
pub type Metrics = BTreeMap<String, MetricValue>;

/// A metric value as it appears in the outbound JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(u64),
    Float(f64),
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Integer(v)
    }
}

/// The five metric families published per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Temperature,
    Humidity,
    Pressure,
    Battery,
    Sequence,
}

impl MetricKind {
    pub const ALL: [Self; 5] = [
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
        Self::Battery,
        Self::Sequence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Humidity => "Humidity",
            Self::Pressure => "Pressure",
            Self::Battery => "Battery",
            Self::Sequence => "Sequence",
        }
    }

    /// Metric name for the device at 1-based `position`.
    pub fn metric_name(self, position: usize) -> String {
        format!("{self}{position}")
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TelemetryReading {
    pub fn value(&self, kind: MetricKind) -> MetricValue {
        match kind {
            MetricKind::Temperature => self.temperature.into(),
            MetricKind::Humidity => self.humidity.into(),
            MetricKind::Pressure => self.pressure.into(),
            MetricKind::Battery => self.battery.into(),
            MetricKind::Sequence => self.measurement_sequence_number.into(),
        }
    }

    /// All five metrics for the device at 1-based `position`.
    pub fn metrics(&self, position: usize) -> Metrics {
        MetricKind::ALL
            .into_iter()
            .map(|kind| (kind.metric_name(position), self.value(kind)))
            .collect()
    }
}
