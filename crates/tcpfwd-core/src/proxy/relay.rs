//! Connection relay.
//!
//! Ties one accepted inbound connection to one dialed outbound connection:
//!
//! ```text
//! Active --(first copy ends | stop signal)--> Closing --(both sockets dropped)--> Closed
//! ```
//!
//! Both copy directions run concurrently inside the relay's own task. The
//! first terminal event wins; the losing direction's future is dropped, and
//! then both sockets are dropped, which closes each of them exactly once.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::PortMapping;
use crate::error::Error;

use super::TaskContext;

/// Copy direction within a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Inbound (client) to outbound (target).
    ToTarget,
    /// Outbound (target) to inbound (client).
    ToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToTarget => write!(f, "client->target"),
            Direction::ToClient => write!(f, "target->client"),
        }
    }
}

/// Why a relay left the Active state.
#[derive(Debug)]
pub(crate) enum CloseReason {
    /// A direction reached end of stream.
    Eof(Direction),
    /// A read or write failed.
    Transport(Error),
    /// The owning task was stopped.
    Cancelled,
}

impl CloseReason {
    fn from_copy(direction: Direction, result: io::Result<u64>) -> Self {
        match result {
            Ok(_) => CloseReason::Eof(direction),
            Err(e) => CloseReason::Transport(Error::Transport {
                message: format!("{}: {}", direction, e),
            }),
        }
    }
}

/// Copy `reader` into `writer` through a fixed-size buffer until EOF or error.
async fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    counter: &AtomicU64,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// One inbound/outbound connection pair.
pub(crate) struct Relay {
    conn_id: u64,
    inbound: TcpStream,
    outbound: TcpStream,
    ctx: TaskContext,
}

impl Relay {
    pub fn new(conn_id: u64, inbound: TcpStream, outbound: TcpStream, ctx: TaskContext) -> Self {
        Self {
            conn_id,
            inbound,
            outbound,
            ctx,
        }
    }

    /// Relay bytes until the first terminal event, then close both sockets.
    pub async fn run(self) -> CloseReason {
        let Relay {
            conn_id,
            mut inbound,
            mut outbound,
            ctx,
        } = self;

        let reason = {
            let (mut in_read, mut in_write) = inbound.split();
            let (mut out_read, mut out_write) = outbound.split();

            let to_target = copy_stream(
                &mut in_read,
                &mut out_write,
                ctx.buffer_size,
                ctx.stats.bytes_to_target(),
            );
            let to_client = copy_stream(
                &mut out_read,
                &mut in_write,
                ctx.buffer_size,
                ctx.stats.bytes_to_client(),
            );

            tokio::select! {
                result = to_target => CloseReason::from_copy(Direction::ToTarget, result),
                result = to_client => CloseReason::from_copy(Direction::ToClient, result),
                _ = ctx.cancel.triggered() => CloseReason::Cancelled,
            }
        };

        // Closing: no copy future is alive past this point.
        drop(inbound);
        drop(outbound);

        match &reason {
            CloseReason::Transport(e) => {
                debug!(task = %ctx.name, conn_id, error = %e, "Relay transport error")
            }
            other => debug!(task = %ctx.name, conn_id, reason = ?other, "Relay closed"),
        }
        reason
    }
}

/// Serve one accepted connection: dial the target, then relay.
///
/// Dial failures close the inbound connection and are only logged.
pub(crate) async fn serve_connection(
    ctx: TaskContext,
    mapping: PortMapping,
    inbound: TcpStream,
    peer: SocketAddr,
) {
    let (conn_id, _open) = ctx.stats.connection_opened();
    let target = ctx.target(mapping.to);

    let dial = TcpStream::connect((&*ctx.host, mapping.to));
    let outbound = tokio::select! {
        result = dial => match result {
            Ok(stream) => stream,
            Err(source) => {
                ctx.stats.dial_failed();
                let err = Error::Dial { target, source };
                warn!(
                    task = %ctx.name,
                    conn_id,
                    peer = %peer,
                    error = %err,
                    "Dial failed, dropping connection"
                );
                return;
            }
        },
        _ = ctx.cancel.triggered() => {
            debug!(task = %ctx.name, conn_id, peer = %peer, "Stopped while dialing");
            return;
        }
    };

    for (side, stream) in [("client", &inbound), ("target", &outbound)] {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(task = %ctx.name, conn_id, side, error = %e, "Failed to set TCP_NODELAY");
        }
    }

    debug!(
        task = %ctx.name,
        conn_id,
        peer = %peer,
        target = %target,
        "Connection opened"
    );

    let reason = Relay::new(conn_id, inbound, outbound, ctx.clone()).run().await;

    debug!(
        task = %ctx.name,
        conn_id,
        peer = %peer,
        target = %target,
        cancelled = matches!(reason, CloseReason::Cancelled),
        "Connection closed"
    );
}
