// ── Sensor readers ──
//
// A `SensorReader` turns a set of RuuviTags and a listening window into
// readings. Scanning is expected to occupy roughly the whole window. An
// empty map means nothing was heard this cycle.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::model::{DeviceId, Readings, TelemetryReading};

/// Source of RuuviTag measurements.
pub trait SensorReader: Send + Sync + 'static {
    /// Collect readings for `devices` over `window`.
    fn fetch(&self, devices: &[DeviceId], window: Duration) -> impl Future<Output = Readings> + Send;
}

/// Reader that fabricates plausible measurements for every device.
///
/// Each device gets the same base values nudged by a random step of -1, 0
/// or +1, and the call sleeps for the full window like a real scan would.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedReader;

impl SimulatedReader {
    fn reading(step: i8) -> TelemetryReading {
        let r = f64::from(step);
        TelemetryReading {
            temperature: 15.0 + 3.2 * r,
            humidity: 50.0 + 5.7 * r,
            pressure: 950.0 + 20.5 * r,
            battery: 3000.0 + 5.0 * r,
            measurement_sequence_number: 1234_u64.saturating_add_signed(2 * i64::from(step)),
        }
    }
}

impl SensorReader for SimulatedReader {
    async fn fetch(&self, devices: &[DeviceId], window: Duration) -> Readings {
        let readings: Readings = {
            let mut rng = rand::thread_rng();
            devices
                .iter()
                .map(|id| (id.clone(), Self::reading(rng.gen_range(-1..=1))))
                .collect()
        };
        debug!(count = readings.len(), "simulated readings generated");
        tokio::time::sleep(window).await;
        readings
    }
}
