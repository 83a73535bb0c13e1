mod cli;
mod error;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ruuvigate_core::{
    CloudPublisher, DeviceRegistry, Gateway, PublisherKind, ShutdownReason, SimulatedReader,
    StdoutPublisher, TlsMode,
};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries telemetry in stdout mode; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if cli.interval == 0 {
        return Err(CliError::InvalidInterval);
    }
    let interval = Duration::from_secs(cli.interval);

    let reason = match cli.mode.kind() {
        PublisherKind::Stdout => {
            if let Some(path) = &cli.config {
                warn!(path = %path.display(), "configuration file ignored in 'stdout' mode");
            }
            let registry = open_registry(&cli.ruuvitags).await?;
            Gateway::new(registry, StdoutPublisher::new(), SimulatedReader, interval)
                .run(&())
                .await?
        }
        PublisherKind::Cloud => {
            let path = cli.config.as_deref().ok_or(CliError::ConfigRequired)?;
            let mut config = ruuvigate_config::load_cloud_config(path)?;
            if let Some(ca) = cli.ca_cert {
                config.tls = TlsMode::CustomCa(ca);
            }
            let registry = open_registry(&cli.ruuvitags).await?;
            Gateway::new(registry, CloudPublisher::new(), SimulatedReader, interval)
                .run(&config)
                .await?
        }
    };

    match reason {
        ShutdownReason::Signal(_) => Ok(()),
        ShutdownReason::Fatal(reason) => Err(CliError::Fatal { reason }),
        ShutdownReason::Disconnected(reason) => Err(CliError::ConnectionLost { reason }),
    }
}

async fn open_registry(path: &Path) -> Result<DeviceRegistry, CliError> {
    tracing::debug!(path = %path.display(), "opening RuuviTag registry");
    Ok(DeviceRegistry::open(path).await?)
}
