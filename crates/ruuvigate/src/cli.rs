//! Clap derive structures for the `ruuvigate` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use ruuvigate_core::PublisherKind;

/// ruuvigate -- relay RuuviTag measurements to a cloud hub or stdout
#[derive(Debug, Parser)]
#[command(
    name = "ruuvigate",
    version,
    about = "Poll RuuviTags and relay their measurements",
    long_about = "Polls the RuuviTags listed in a registry file on a fixed interval and\n\
        publishes their measurements. In cloud mode the registry can be edited\n\
        remotely with the AddRuuviTag, RemoveRuuviTag and GetRuuviTags commands."
)]
pub struct Cli {
    /// Where measurements are published
    #[arg(long, short = 'm', env = "RUUVIGATE_MODE", value_enum, default_value_t = Mode::Cloud)]
    pub mode: Mode,

    /// RuuviTag registry file (one MAC address per line; created if missing)
    #[arg(long, short = 'r', value_name = "PATH")]
    pub ruuvitags: PathBuf,

    /// Cloud configuration file (required in cloud mode)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seconds between polls (at least 1)
    #[arg(long, short = 'i', value_name = "SECONDS", default_value_t = 60)]
    pub interval: u64,

    /// Custom CA certificate (PEM) for the provisioning service and hub
    #[arg(long, value_name = "PATH", env = "RUUVIGATE_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Managed hub service, with remote registry commands
    Cloud,
    /// One JSON line per poll on standard output
    Stdout,
}

impl Mode {
    pub fn kind(self) -> PublisherKind {
        match self {
            Self::Cloud => PublisherKind::Cloud,
            Self::Stdout => PublisherKind::Stdout,
        }
    }
}
