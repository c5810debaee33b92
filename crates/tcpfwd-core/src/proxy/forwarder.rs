//! Port forwarder: one listener and accept loop per port mapping.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::PortMapping;
use crate::constants::ACCEPT_RETRY_DELAY;
use crate::error::{Error, Result};

use super::TaskContext;
use super::relay::serve_connection;

/// How a forwarder's accept loop ended.
#[derive(Debug)]
pub(crate) enum ForwarderExit {
    /// The task's stop signal was observed.
    Cancelled,
    /// The listener failed with a non-transient error.
    Failed(io::Error),
}

/// Accepts connections on one listen port and relays each to `host:to`.
pub(crate) struct PortForwarder {
    /// Shared task state.
    ctx: TaskContext,
    /// The mapping this forwarder serves.
    mapping: PortMapping,
    /// Bound listener.
    listener: TcpListener,
}

impl PortForwarder {
    /// Bind the listen port of `mapping` on `listen_addr`.
    pub async fn bind(ctx: TaskContext, mapping: PortMapping, listen_addr: IpAddr) -> Result<Self> {
        let addr = SocketAddr::new(listen_addr, mapping.from);
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            port: mapping.from,
            source,
        })?;

        info!(
            task = %ctx.name,
            listen_port = mapping.from,
            target = %ctx.target(mapping.to),
            "Port forwarder bound"
        );

        Ok(Self {
            ctx,
            mapping,
            listener,
        })
    }

    /// Get the local address the forwarder is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until the stop signal fires or the listener fails.
    ///
    /// The listener is closed before returning, and every relay spawned by
    /// this forwarder has finished by then.
    pub async fn run(self) -> ForwarderExit {
        let PortForwarder {
            ctx,
            mapping,
            listener,
        } = self;
        let mut relays = JoinSet::new();

        let exit = loop {
            tokio::select! {
                biased;

                _ = ctx.cancel.triggered() => {
                    debug!(
                        task = %ctx.name,
                        listen_port = mapping.from,
                        "Port forwarder stopping"
                    );
                    break ForwarderExit::Cancelled;
                }

                Some(joined) = relays.join_next(), if !relays.is_empty() => {
                    log_relay_panic(&ctx, mapping, joined);
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(
                            task = %ctx.name,
                            listen_port = mapping.from,
                            peer = %peer,
                            "Accepted connection"
                        );
                        relays.spawn(serve_connection(ctx.clone(), mapping, stream, peer));
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        warn!(
                            task = %ctx.name,
                            listen_port = mapping.from,
                            error = %e,
                            "Accept failed, retrying"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                            _ = ctx.cancel.triggered() => {}
                        }
                    }
                    Err(e) => {
                        error!(
                            task = %ctx.name,
                            listen_port = mapping.from,
                            error = %e,
                            "Listener failed"
                        );
                        break ForwarderExit::Failed(e);
                    }
                },
            }
        };

        // Stop accepting before waiting for relays to close.
        drop(listener);

        if let ForwarderExit::Failed(_) = exit {
            debug!(
                task = %ctx.name,
                listen_port = mapping.from,
                relays = relays.len(),
                "Waiting for relays of failed forwarder"
            );
        }
        while let Some(joined) = relays.join_next().await {
            log_relay_panic(&ctx, mapping, joined);
        }

        info!(task = %ctx.name, listen_port = mapping.from, "Port forwarder closed");
        exit
    }
}

fn log_relay_panic(
    ctx: &TaskContext,
    mapping: PortMapping,
    joined: std::result::Result<(), JoinError>,
) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(task = %ctx.name, listen_port = mapping.from, error = %e, "Relay panicked");
        }
    }
}

/// Accept errors that affect a single connection or are resource pressure.
fn is_transient_accept_error(e: &io::Error) -> bool {
    use io::ErrorKind::*;

    matches!(
        e.kind(),
        ConnectionAborted
            | ConnectionReset
            | ConnectionRefused
            | Interrupted
            | WouldBlock
            | TimedOut
            | OutOfMemory
    ) || e.raw_os_error().is_some_and(is_resource_exhaustion)
}

#[cfg(unix)]
fn is_resource_exhaustion(code: i32) -> bool {
    matches!(code, libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_code: i32) -> bool {
    false
}
