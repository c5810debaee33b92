//! Free loopback ports.

use std::net::TcpListener;

/// Return a loopback port that was free at the time of the call.
pub fn free_port() -> u16 {
    free_ports(1)[0]
}

/// Return `n` distinct loopback ports that were free at the time of the call.
///
/// All listeners are held until every port is picked so the OS cannot hand
/// out the same port twice.
pub fn free_ports(n: usize) -> Vec<u16> {
    let listeners: Vec<TcpListener> = (0..n)
        .map(|_| TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port"))
        .collect();
    listeners
        .iter()
        .map(|l| l.local_addr().expect("listener address").port())
        .collect()
}
