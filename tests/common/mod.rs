//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use port_decoy::config::{validate_config, DecoyConfig, PortEntry};
use port_decoy::{Decoy, RunningDecoy};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Reserve a free loopback port by binding and releasing it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A loopback config listening on `ports`.
pub fn config_for(ports: &[u16]) -> DecoyConfig {
    let mut config = DecoyConfig::default();
    config.listener.bind_address = "127.0.0.1".into();
    config.listener.ports = ports.iter().map(|p| PortEntry::from(*p)).collect();
    config.shutdown.drain_timeout_secs = 2;
    config
}

/// Validate `config`, start a decoy and wait until it accepts.
pub async fn start(config: DecoyConfig) -> (Decoy, RunningDecoy) {
    let decoy = Decoy::new(validate_config(&config).expect("valid config"));
    let running = decoy.start().await.expect("decoy starts");
    (decoy, running)
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(addr(port)).await.expect("connect")
}

/// Read exactly `len` bytes, failing if they do not arrive within `within`.
pub async fn read_exactly(stream: &mut TcpStream, len: usize, within: Duration) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(within, stream.read_exact(&mut buf))
        .await
        .expect("bytes arrive in time")
        .expect("read succeeds");
    buf
}

/// Read until the server closes the connection, failing after `within`.
pub async fn read_to_close(stream: &mut TcpStream, within: Duration) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(within, stream.read_to_end(&mut buf))
        .await
        .expect("server closes in time");
    buf
}

/// True if the peer sends nothing during `window`.
pub async fn stays_silent(stream: &mut TcpStream, window: Duration) -> bool {
    let mut byte = [0u8; 1];
    tokio::time::timeout(window, stream.read(&mut byte)).await.is_err()
}

/// Poll `cond` every 10ms until it holds or `within` elapses.
pub async fn eventually<F: Fn() -> bool>(cond: F, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
