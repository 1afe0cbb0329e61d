//! Global admission bound and token conservation.
//!
//! Each accept loop holds one token while it waits in `accept()`, so gate
//! occupancy includes idle listeners. Handled connections are counted
//! through the registry instead.

use std::time::Duration;

use tokio::io::AsyncWriteExt;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cap_is_shared_across_ports() {
    let a = common::free_port();
    let b = common::free_port();

    let mut config = common::config_for(&[a, b]);
    config.listener.max_connections = 2;
    config.connection.timeout_secs = 10;
    let (decoy, running) = common::start(config).await;

    // Two idle peers, one per port, take both tokens.
    let mut first = common::connect(a).await;
    common::read_exactly(&mut first, 22, Duration::from_secs(2)).await;
    let mut second = common::connect(b).await;
    common::read_exactly(&mut second, 22, Duration::from_secs(2)).await;
    assert_eq!(decoy.registry().len(), 2);

    // A third peer completes the TCP handshake via the backlog but is not served.
    let mut third = common::connect(a).await;
    assert!(common::stays_silent(&mut third, Duration::from_millis(300)).await);
    assert_eq!(decoy.registry().len(), 2);
    assert_eq!(decoy.gate().available(), 0);

    // Freeing one slot lets the waiting peer through.
    first.write_all(b"bye").await.unwrap();
    common::read_to_close(&mut first, Duration::from_secs(2)).await;
    let banner = common::read_exactly(&mut third, 22, Duration::from_secs(2)).await;
    assert_eq!(banner, b"Authentication failed.");
    assert!(decoy.gate().peak_in_use() <= 2);

    drop(second);
    drop(third);
    let registry = decoy.registry().clone();
    assert!(common::eventually(|| registry.live() == 0, Duration::from_secs(2)).await);

    running.shutdown().await;
    assert_eq!(decoy.gate().acquired_total(), decoy.gate().released_total());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn burst_never_exceeds_capacity_and_tokens_balance() {
    let ports = [common::free_port(), common::free_port(), common::free_port()];

    let mut config = common::config_for(&ports);
    config.listener.max_connections = 6;
    config.connection.timeout_secs = 1;
    let (decoy, running) = common::start(config).await;

    // Mixed workload: talkers, peers that hang up at once, silent peers that hit the deadline.
    let total = 12usize;
    let mut clients = Vec::new();
    for i in 0..total {
        let port = ports[i % ports.len()];
        clients.push(tokio::spawn(async move {
            let mut stream = common::connect(port).await;
            match i % 3 {
                0 => {
                    let _ = stream.write_all(b"probe").await;
                    let _ = common::read_to_close(&mut stream, Duration::from_secs(15)).await;
                }
                1 => drop(stream),
                _ => {
                    let _ = common::read_to_close(&mut stream, Duration::from_secs(15)).await;
                }
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    // Peers that hung up immediately may still sit in the backlog.
    let registry = decoy.registry().clone();
    assert!(
        common::eventually(
            || registry.registered_total() == total as u64 && registry.live() == 0,
            Duration::from_secs(5)
        )
        .await
    );

    let report = running.shutdown().await;
    let accepted: u64 = report.listeners.iter().map(|l| l.accepted).sum();
    assert_eq!(accepted, total as u64);

    let gate = decoy.gate();
    assert!(gate.peak_in_use() <= 6, "peak {} exceeded capacity", gate.peak_in_use());
    assert_eq!(gate.in_use(), 0);
    assert_eq!(gate.acquired_total(), gate.released_total());
    assert!(gate.acquired_total() >= total as u64);
}
