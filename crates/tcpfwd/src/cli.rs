//! Command-line argument parsing for the tcpfwd binary.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use tcpfwd_core::RelayConfig;
use tcpfwd_core::constants::DEFAULT_BUFFER_SIZE;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for tcpfwd_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => tcpfwd_core::LogFormat::Text,
            CliLogFormat::Json => tcpfwd_core::LogFormat::Json,
        }
    }
}

/// tcpfwd - forward local TCP ports to remote hosts.
#[derive(Debug, Parser)]
#[command(
    name = "tcpfwd",
    version,
    about = "tcpfwd - forward local TCP ports to remote hosts"
)]
pub struct Cli {
    /// Task file (default: config.json next to the executable)
    #[arg(short = 'c', long = "config", value_name = "FILE", env = "TCPFWD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only start the named task (can be repeated; default: every task)
    #[arg(short = 't', long = "task", action = ArgAction::Append, value_name = "NAME")]
    pub tasks: Vec<String>,

    /// Address the listeners bind to
    #[arg(short = 'l', long = "listen", default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// Copy buffer size per connection direction, in bytes
    #[arg(long = "buffer-size", default_value_t = DEFAULT_BUFFER_SIZE, value_name = "BYTES")]
    pub buffer_size: usize,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Relay settings from the command line.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::new()
            .with_listen_addr(self.listen_addr)
            .with_buffer_size(self.buffer_size)
    }

    /// Whether `name` was selected with `--task` (no selection means all).
    pub fn selects(&self, name: &str) -> bool {
        self.tasks.is_empty() || self.tasks.iter().any(|t| t == name)
    }
}
