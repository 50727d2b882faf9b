/**
 * overlay/signalling.rs
 *
 * WebSocket signalling client: one room connection, a stream of rosters
 */

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::types::Endpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Signalling connection for one room. The protocol is a single JSON
/// handshake followed by an unbounded stream of roster arrays; no further
/// client-to-server messages exist.
pub struct SignallingClient {
    stream: WsStream,
}

impl SignallingClient {
    /// Dial the room endpoint and send the one-shot handshake: the local
    /// endpoint as JSON. Every member of the room does the same, and the
    /// server answers all of them with roster deliveries from then on.
    pub async fn join(host: &str, room: &str, identity: &Endpoint) -> Result<Self> {
        let url = format!("ws://{}/ws?room={}", host, room);
        let (stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("connect to signalling server at {}", url))?;

        let mut client = Self { stream };
        let hello = serde_json::to_string(identity).context("encode local endpoint")?;
        client
            .stream
            .send(Message::Text(hello))
            .await
            .context("send endpoint handshake")?;
        Ok(client)
    }

    /// Next roster delivery. `Ok(None)` means the server closed the
    /// connection; `Err` is a read or decode failure. Pings are answered
    /// inline; other frames are skipped.
    pub async fn next_roster(&mut self) -> Result<Option<Vec<Endpoint>>> {
        loop {
            let msg = match self.stream.next().await {
                Some(msg) => msg.context("signalling read")?,
                None => return Ok(None),
            };
            match msg {
                Message::Text(text) => {
                    let roster: Vec<Endpoint> =
                        serde_json::from_str(&text).context("decode roster")?;
                    return Ok(Some(roster));
                }
                Message::Ping(data) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("answer ping")?;
                }
                Message::Close(_) => return Ok(None),
                other => {
                    debug!("skipping signalling frame: {:?}", other);
                }
            }
        }
    }
}
