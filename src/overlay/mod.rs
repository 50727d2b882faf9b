/**
 * overlay/mod.rs
 *
 * Room overlay core implementing:
 * - local endpoint discovery
 * - WebSocket signalling client (room rosters)
 * - UDP hole punching
 * - chat / video-frame transport over one UDP socket
 */

mod events;
mod framing;
mod identity;
mod peers;
mod punch;
mod reassembly;
mod signalling;
mod transport;
mod types;

pub use events::EventBridge;
pub use framing::{fragment, ChunkHeader, CHUNK_HEADER_LEN, MAX_UDP_PAYLOAD};
pub use peers::PeerTable;
pub use punch::PUNCH_SENTINEL;
pub use reassembly::{FrameKey, ReassemblyEngine};
pub use signalling::SignallingClient;
pub use types::{Endpoint, OverlayConfig, RoomEvent};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The overlay core: local identity, transport socket, peer table,
/// signalling connection and event bridge owned as one value. `start`
/// once, then drive it with `join_room`, `send_message` and
/// `send_frame`.
pub struct Core {
    config: OverlayConfig,
    identity: Endpoint,
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<PeerTable>>,
    events: EventBridge,
    roster_task: Mutex<Option<JoinHandle<()>>>,
}

impl Core {
    /// Bind the transport socket, discover the local endpoint and launch
    /// the UDP reader. Bind failure is fatal; a missing public or private
    /// IP is not. The endpoint is immutable for the life of the core.
    pub async fn start(config: OverlayConfig, events: EventBridge) -> Result<Core> {
        let socket = Arc::new(
            UdpSocket::bind("0.0.0.0:0")
                .await
                .context("bind overlay UDP socket")?,
        );
        let port = socket
            .local_addr()
            .context("read local UDP address")?
            .port();
        let identity =
            identity::discover(port, &config.reflector_url, config.reflector_timeout).await;
        info!(
            public_ip = %identity.public_ip,
            private_ip = %identity.private_ip,
            port,
            "local endpoint ready"
        );

        let peers = Arc::new(Mutex::new(PeerTable::new()));
        let reassembly =
            ReassemblyEngine::new(config.reassembly_timeout, config.max_buckets_per_sender);
        tokio::spawn(transport::run_reader(
            socket.clone(),
            peers.clone(),
            reassembly,
            events.clone(),
        ));

        Ok(Core {
            config,
            identity,
            socket,
            peers,
            events,
            roster_task: Mutex::new(None),
        })
    }

    /// Join a named room, replacing any previous room connection. The
    /// return value is the human-readable outcome for the UI; errors do
    /// not cross this boundary in any other form, and a failed join
    /// leaves the peer table untouched.
    pub async fn join_room(&self, room: &str) -> String {
        if let Some(task) = self.roster_task.lock().await.take() {
            task.abort();
        }
        if room.is_empty() {
            return "room name must not be empty".to_string();
        }

        match SignallingClient::join(&self.config.signalling_host, room, &self.identity).await {
            Ok(client) => {
                let task = tokio::spawn(run_roster_reader(
                    client,
                    self.socket.clone(),
                    self.peers.clone(),
                    self.identity.clone(),
                    self.events.clone(),
                    self.config.clone(),
                ));
                *self.roster_task.lock().await = Some(task);
                format!("joined room '{}'", room)
            }
            Err(e) => format!("could not join room '{}': {:#}", room, e),
        }
    }

    /// Send a chat line to every connected peer. Zero peers is a no-op.
    pub async fn send_message(&self, text: &str) {
        transport::send_text(&self.socket, &self.peers, text).await;
    }

    /// Fragment one encoded frame (JPEG or PNG) and send it to every
    /// connected peer. Fire-and-forget: no retransmission, no ordering.
    pub async fn send_frame(&self, frame: &[u8]) {
        transport::send_frame(&self.socket, &self.peers, frame).await;
    }

    /// The immutable local endpoint.
    pub fn identity(&self) -> &Endpoint {
        &self.identity
    }
}

/// Reads roster deliveries until error or close. Each delivery is diffed
/// into the peer table, new peers get a hole-punch burst, and the roster
/// as received goes to the UI. A dead connection publishes an empty
/// roster so the UI reflects the disconnection, then the task ends.
async fn run_roster_reader(
    mut client: SignallingClient,
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<PeerTable>>,
    identity: Endpoint,
    events: EventBridge,
    config: OverlayConfig,
) {
    loop {
        match client.next_roster().await {
            Ok(Some(roster)) => {
                let fresh = peers.lock().await.apply_roster(&roster, &identity);
                for (peer_key, addr) in fresh {
                    tokio::spawn(punch::punch_peer(
                        socket.clone(),
                        peer_key,
                        addr,
                        config.punch_attempts,
                        config.punch_interval,
                    ));
                }
                events.emit(RoomEvent::PeerListUpdated(roster));
            }
            Ok(None) => {
                info!("signalling connection closed");
                events.emit(RoomEvent::PeerListUpdated(Vec::new()));
                return;
            }
            Err(e) => {
                warn!("signalling connection lost: {:#}", e);
                events.emit(RoomEvent::PeerListUpdated(Vec::new()));
                return;
            }
        }
    }
}
