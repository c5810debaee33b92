//! Loopback TCP echo server used as a forwarding target.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    closed: AtomicU64,
}

/// Echo server that writes back every byte it reads.
///
/// The server and all of its connections are aborted on drop.
#[derive(Debug)]
pub struct EchoServer {
    addr: SocketAddr,
    counters: Arc<Counters>,
    handle: JoinHandle<()>,
}

impl EchoServer {
    /// Start an echo server on an ephemeral loopback port.
    pub async fn start() -> io::Result<Self> {
        Self::bind(0).await
    }

    /// Start an echo server on a specific loopback port.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;
        let counters = Arc::new(Counters::default());

        let handle = tokio::spawn(serve(listener, Arc::clone(&counters)));
        debug!(addr = %addr, "Echo server listening");

        Ok(Self {
            addr,
            counters,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.counters.accepted.load(Ordering::SeqCst)
    }

    /// Connections that reached EOF or failed.
    pub fn closed(&self) -> u64 {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(listener: TcpListener, counters: Arc<Counters>) {
    // Dropped with the server task, which aborts every connection.
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    counters.accepted.fetch_add(1, Ordering::SeqCst);
                    connections.spawn(echo(stream, Arc::clone(&counters)));
                }
                Err(_) => break,
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn echo(mut stream: TcpStream, counters: Arc<Counters>) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
    counters.closed.fetch_add(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::wait_until;

    #[tokio::test]
    async fn echoes_and_counts() {
        let server = EchoServer::start().await.unwrap();

        let mut client = TcpStream::connect(server.addr()).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(server.accepted(), 1);

        drop(client);
        assert!(wait_until(Duration::from_secs(2), || server.closed() == 1).await);
    }
}
