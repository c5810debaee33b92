//! tcpfwd: headless port forwarder.
//!
//! Loads a task file, starts the selected tasks on a [`TaskRegistry`] and
//! keeps them running until interrupted.
//!
//! [`TaskRegistry`]: tcpfwd_core::TaskRegistry

pub mod cli;
pub mod config_file;
pub mod serve;

pub use cli::{Cli, CliLogFormat};
pub use serve::{Exit, wait_for_exit};
