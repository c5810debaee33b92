//! tcpfwd-test-utils: Test infrastructure for tcpfwd.
//!
//! Provides:
//! - free_port / free_ports: loopback ports that are free to bind
//! - EchoServer: loopback TCP echo target that counts its connections
//! - wait_until: poll a condition with a deadline

mod echo;
mod ports;
mod wait;

pub use echo::EchoServer;
pub use ports::{free_port, free_ports};
pub use wait::wait_until;
