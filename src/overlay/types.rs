/**
 * overlay/types.rs
 *
 * Core data types for the room overlay
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a client can be reached: public and private IPs plus its UDP port.
/// Field names and the string-typed port are the signalling wire contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub public_ip: String,
    pub private_ip: String,
    pub port: String,
}

impl Endpoint {
    /// Target address for this peer as seen from `local`, in `"ip:port"`
    /// form. When both sides share a public IP most NATs will not hairpin
    /// a packet back inside, so the private IP is chosen instead.
    pub fn target_key(&self, local: &Endpoint) -> String {
        let ip = if !local.public_ip.is_empty() && local.public_ip == self.public_ip {
            &self.private_ip
        } else {
            &self.public_ip
        };
        format!("{}:{}", ip, self.port)
    }

    /// True when this roster entry describes the local client itself.
    /// The server echoes back exactly what was sent in the handshake.
    pub fn is_local(&self, local: &Endpoint) -> bool {
        self == local
    }
}

/// Overlay configuration.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Signalling service in `host:port` form.
    pub signalling_host: String,
    /// Datagrams per hole-punch burst.
    pub punch_attempts: u32,
    /// Delay between punch datagrams.
    pub punch_interval: Duration,
    /// Age after which a partial frame is discarded.
    pub reassembly_timeout: Duration,
    /// Live partial frames allowed per sender.
    pub max_buckets_per_sender: usize,
    /// Plain-text public IP reflector.
    pub reflector_url: String,
    /// Budget for public IP discovery at startup.
    pub reflector_timeout: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            signalling_host: "127.0.0.1:8080".to_string(),
            punch_attempts: 10,
            punch_interval: Duration::from_millis(100),
            reassembly_timeout: Duration::from_secs(2),
            max_buckets_per_sender: 8,
            reflector_url: "https://api.ipify.org".to_string(),
            reflector_timeout: Duration::from_secs(5),
        }
    }
}

/// Domain events pushed to the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The roster exactly as the signalling service delivered it.
    PeerListUpdated(Vec<Endpoint>),
    /// A chat line from a peer, keyed by its transport address.
    MessageReceived { sender: String, message: String },
    /// A fully reassembled encoded image.
    FrameReceived(Vec<u8>),
}

impl RoomEvent {
    /// Event name on the UI boundary.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::PeerListUpdated(_) => "peer-list-updated",
            RoomEvent::MessageReceived { .. } => "new-message-received",
            RoomEvent::FrameReceived(_) => "frame-received",
        }
    }
}
