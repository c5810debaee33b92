//! End-to-end forwarding through a running task.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tcpfwd_core::{MemoryCatalog, PortMapping, RelayConfig, TaskRegistry};
use tcpfwd_test_utils::{EchoServer, free_port, free_ports, wait_until};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const TIMEOUT: Duration = Duration::from_secs(5);

fn registry() -> TaskRegistry {
    TaskRegistry::with_config(
        Arc::new(MemoryCatalog::default()),
        RelayConfig::new()
            .with_listen_addr(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_buffer_size(4096),
    )
    .unwrap()
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.unwrap()
}

async fn read_eof(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    matches!(
        tokio::time::timeout(TIMEOUT, stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}

#[tokio::test]
async fn ping_round_trip_then_refused_after_stop() {
    init();
    let ports = free_ports(2);
    let (listen, target) = (ports[0], ports[1]);
    let echo = EchoServer::bind(target).await.unwrap();
    let registry = registry();
    registry
        .start_task("ping", "127.0.0.1", &[PortMapping::new(listen, target)])
        .await
        .unwrap();

    let mut client = connect(listen).await;
    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    tokio::time::timeout(TIMEOUT, client.read_exact(&mut buf))
        .await
        .expect("echo should arrive")
        .unwrap();
    assert_eq!(&buf, b"ping");
    assert_eq!(echo.accepted(), 1);

    registry.stop_task("ping").unwrap().wait().await;

    // The live connection was torn down and the listener is gone
    assert!(read_eof(&mut client).await);
    assert!(TcpStream::connect(("127.0.0.1", listen)).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_transfer_is_transparent() {
    let echo = EchoServer::start().await.unwrap();
    let listen = free_port();
    let registry = registry();
    registry
        .start_task("bulk", "127.0.0.1", &[PortMapping::new(listen, echo.port())])
        .await
        .unwrap();

    let payload: Vec<u8> = (0..1024 * 1024u32).map(|i| (i * 31 % 251) as u8).collect();
    let client = connect(listen).await;
    let (mut reader, mut writer) = client.into_split();

    let expected = payload.clone();
    // The write half stays open: a half-close ends the whole relay.
    let write = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer
    });

    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(20), reader.read_exact(&mut received))
        .await
        .expect("transfer should complete")
        .unwrap();
    let _writer = write.await.unwrap();

    assert!(received == expected, "relayed bytes differ from sent bytes");

    let total = expected.len() as u64;
    assert!(
        wait_until(TIMEOUT, || {
            let stats = registry.stats("bulk").unwrap();
            stats.bytes_to_target == total && stats.bytes_to_client == total
        })
        .await
    );

    registry.shutdown().await;
}

#[tokio::test]
async fn dial_failure_closes_client_and_forwarder_recovers() {
    let ports = free_ports(2);
    let (listen, target) = (ports[0], ports[1]);
    let registry = registry();
    registry
        .start_task("dial", "127.0.0.1", &[PortMapping::new(listen, target)])
        .await
        .unwrap();

    // Nothing listens on the target yet
    let mut refused = connect(listen).await;
    assert!(read_eof(&mut refused).await);
    assert!(
        wait_until(TIMEOUT, || registry.stats("dial").unwrap().dial_failures == 1).await
    );
    assert!(registry.is_running("dial"));

    let _echo = EchoServer::bind(target).await.unwrap();
    let mut client = connect(listen).await;
    client.write_all(b"again").await.unwrap();
    let mut buf = [0u8; 5];
    tokio::time::timeout(TIMEOUT, client.read_exact(&mut buf))
        .await
        .expect("forwarder should keep accepting after a dial failure")
        .unwrap();
    assert_eq!(&buf, b"again");

    let stats = registry.stats("dial").unwrap();
    assert_eq!(stats.dial_failures, 1);
    assert_eq!(stats.total_connections, 2);

    registry.shutdown().await;
}

#[tokio::test]
async fn client_close_tears_down_target_side() {
    let echo = EchoServer::start().await.unwrap();
    let listen = free_port();
    let registry = registry();
    registry
        .start_task("close", "127.0.0.1", &[PortMapping::new(listen, echo.port())])
        .await
        .unwrap();

    let mut client = connect(listen).await;
    client.write_all(&[7u8; 8192]).await.unwrap();
    let mut buf = [0u8; 1024];
    client.read_exact(&mut buf).await.unwrap();
    drop(client);

    assert!(wait_until(TIMEOUT, || echo.closed() == 1).await);
    assert!(
        wait_until(TIMEOUT, || registry.stats("close").unwrap().open_connections == 0).await
    );
    assert!(registry.is_running("close"));

    registry.shutdown().await;
}

#[tokio::test]
async fn stop_closes_active_connections() {
    let echo = EchoServer::start().await.unwrap();
    let ports = free_ports(2);
    let registry = registry();
    registry
        .start_task(
            "active",
            "127.0.0.1",
            &[
                PortMapping::new(ports[0], echo.port()),
                PortMapping::new(ports[1], echo.port()),
            ],
        )
        .await
        .unwrap();

    let mut clients = Vec::new();
    for &port in ports.iter().chain(ports.iter()) {
        let mut client = connect(port).await;
        client.write_all(b"x").await.unwrap();
        let mut buf = [0u8; 1];
        client.read_exact(&mut buf).await.unwrap();
        clients.push(client);
    }
    assert_eq!(registry.stats("active").unwrap().open_connections, 4);

    let completion = registry.stop_task("active").unwrap();
    tokio::time::timeout(TIMEOUT, completion.wait())
        .await
        .expect("stop should not wait on idle connections");

    for client in &mut clients {
        assert!(read_eof(client).await);
    }
    assert!(wait_until(TIMEOUT, || echo.closed() == 4).await);
    assert!(!registry.is_running("active"));
}

fn init() {
    tcpfwd_core::logging::init_test_logging();
}
