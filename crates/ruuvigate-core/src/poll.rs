//! Periodic telemetry collection.
//!
//! Each cycle snapshots the registry, asks the reader for readings over one
//! interval, buffers five metrics per device and flushes once. Metric
//! names use each device's position in that cycle's snapshot, so a
//! concurrent registry change cannot shift names mid-cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{DeviceId, Readings};
use crate::publisher::Publisher;
use crate::reader::SensorReader;
use crate::registry::DeviceRegistry;

pub struct PollLoop<P, R> {
    registry: Arc<DeviceRegistry>,
    publisher: Arc<P>,
    reader: Arc<R>,
    interval: Duration,
}

impl<P: Publisher, R: SensorReader> PollLoop<P, R> {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        publisher: Arc<P>,
        reader: Arc<R>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            publisher,
            reader,
            interval,
        }
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "poll loop started");

        loop {
            let snapshot = self.registry.list().await;

            if snapshot.is_empty() {
                info!("no RuuviTags configured");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.interval) => continue,
                }
            }

            let readings = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                readings = self.reader.fetch(&snapshot, self.interval) => readings,
            };

            if readings.is_empty() {
                warn!(
                    devices = snapshot.len(),
                    "could not read any RuuviTag data, make sure the RuuviTags are within range"
                );
                continue;
            }

            self.publish(&snapshot, readings).await;
        }

        debug!("poll loop stopped");
    }

    async fn publish(&self, snapshot: &[DeviceId], mut readings: Readings) {
        let mut buffered = 0;
        for (index, id) in snapshot.iter().enumerate() {
            if let Some(reading) = readings.remove(id) {
                self.publisher.buffer_data(reading.metrics(index + 1));
                buffered += 1;
            }
        }
        for id in readings.keys() {
            debug!(mac = %id, "ignoring reading for unregistered RuuviTag");
        }

        match self.publisher.publish().await {
            Ok(()) => debug!(devices = buffered, "poll cycle published"),
            Err(e) => warn!(error = %e, "failed to publish telemetry, retrying next cycle"),
        }
    }
}
