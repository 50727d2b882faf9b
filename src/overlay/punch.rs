/**
 * overlay/punch.rs
 *
 * UDP hole-punch bursts
 */

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Sentinel carried by every punch datagram. The demultiplexer drops text
/// containing it, so probes never surface as chat.
pub const PUNCH_SENTINEL: &str = "punch!";

/// Fire a burst of priming datagrams at a newly discovered peer so both
/// NATs install return mappings. There is no ACK: reachability is
/// confirmed by the first datagram arriving from that source, which is
/// what populates the peer table.
pub async fn punch_peer(
    socket: Arc<UdpSocket>,
    peer_key: String,
    addr: SocketAddr,
    attempts: u32,
    interval: Duration,
) {
    debug!(%peer_key, attempts, "hole punching");
    for _ in 0..attempts {
        if let Err(e) = socket.send_to(PUNCH_SENTINEL.as_bytes(), addr).await {
            warn!(%peer_key, "punch send failed: {}", e);
        }
        tokio::time::sleep(interval).await;
    }
}
