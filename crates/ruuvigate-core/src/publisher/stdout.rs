// Publisher that prints each flush as one compact JSON line.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{Publisher, TelemetryBuffer};
use crate::error::CoreError;
use crate::model::Metrics;

/// Writes telemetry to standard output (or any writer).
#[derive(Debug)]
pub struct StdoutPublisher<W = io::Stdout> {
    buffer: TelemetryBuffer,
    out: Mutex<W>,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send + 'static> StdoutPublisher<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            buffer: TelemetryBuffer::new(),
            out: Mutex::new(out),
        }
    }

    /// Consume the publisher and return its writer.
    pub fn into_writer(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, metrics: &Metrics) -> Result<(), CoreError> {
        let line = serde_json::to_string(metrics).map_err(|e| CoreError::Publish {
            message: e.to_string(),
        })?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| CoreError::Publish {
                message: e.to_string(),
            })
    }
}

impl<W: Write + Send + 'static> Publisher for StdoutPublisher<W> {
    type Config = ();

    async fn connect(&self, _config: &()) -> Result<(), CoreError> {
        Ok(())
    }

    fn buffer_data(&self, metrics: Metrics) {
        self.buffer.extend(metrics);
    }

    async fn publish(&self) -> Result<(), CoreError> {
        let metrics = self.buffer.take();
        if metrics.is_empty() {
            return Ok(());
        }
        self.write_line(&metrics)?;
        debug!(metrics = metrics.len(), "telemetry written to stdout");
        Ok(())
    }
}
