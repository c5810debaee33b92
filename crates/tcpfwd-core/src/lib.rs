//! tcpfwd-core: TCP port-forwarding engine.
//!
//! This crate provides:
//! - Task and port mapping configuration types
//! - A one-shot, multi-observer stop signal
//! - Port forwarders (one listener and accept loop per mapping)
//! - Connection relays (bidirectional byte copy per accepted connection)
//! - The task registry that starts and stops named tasks
//! - Logging setup

pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod registry;

pub use cancel::StopSignal;
pub use config::{MemoryCatalog, PortMapping, RelayConfig, TaskCatalog, TaskConfig};
pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
pub use proxy::{PendingTask, ProxyTask, TaskCompletion, TaskStatsSnapshot};
pub use registry::TaskRegistry;
