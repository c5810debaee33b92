//! Relay and configuration constants for tcpfwd.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

// =============================================================================
// Relay Constants
// =============================================================================

/// Default size of the per-direction copy buffer (32 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Smallest copy buffer accepted by [`RelayConfig`](crate::RelayConfig).
pub const MIN_BUFFER_SIZE: usize = 512;

/// Largest copy buffer accepted by [`RelayConfig`](crate::RelayConfig) (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Address listeners bind to by default (every interface).
pub const DEFAULT_LISTEN_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

// =============================================================================
// Timing Constants
// =============================================================================

/// Pause after a transient accept failure (e.g. out of file descriptors).
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Configuration File
// =============================================================================

/// Configuration file name looked up next to the executable.
pub const CONFIG_FILE_NAME: &str = "config.json";
