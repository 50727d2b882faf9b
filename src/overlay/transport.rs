/**
 * overlay/transport.rs
 *
 * UDP demultiplexer and the two send paths
 */

use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::events::EventBridge;
use super::framing::{self, ChunkHeader, CHUNK_HEADER_LEN, MAX_UDP_PAYLOAD};
use super::peers::PeerTable;
use super::punch::PUNCH_SENTINEL;
use super::reassembly::ReassemblyEngine;
use super::types::RoomEvent;

/// What one inbound datagram turned out to be.
enum Datagram<'a> {
    Text(&'a [u8]),
    Chunk(ChunkHeader, &'a [u8]),
}

/// Classify by length and header sanity: short datagrams and implausible
/// chunk counts are chat. The magic-number gate on the assembled frame is
/// the real media check.
fn classify(buf: &[u8]) -> Datagram<'_> {
    if buf.len() < CHUNK_HEADER_LEN {
        return Datagram::Text(buf);
    }
    match ChunkHeader::decode(buf) {
        Some(header) if header.plausible() => Datagram::Chunk(header, &buf[CHUNK_HEADER_LEN..]),
        _ => Datagram::Text(buf),
    }
}

/// Single reader loop owning the inbound half of the socket. Any datagram
/// source becomes a peer (punching works in both directions, so a peer
/// may reach us before any roster mentions it). Exits on socket error,
/// after which the overlay no longer receives.
pub async fn run_reader(
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<PeerTable>>,
    mut reassembly: ReassemblyEngine,
    events: EventBridge,
) {
    let mut buf = [0u8; MAX_UDP_PAYLOAD + 100];
    loop {
        let (n, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("udp reader terminating: {}", e);
                return;
            }
        };
        let peer_key = addr.to_string();

        {
            let mut table = peers.lock().await;
            if table.insert_if_absent(&peer_key, addr) {
                info!(%peer_key, "first datagram from new peer");
            }
        }

        match classify(&buf[..n]) {
            Datagram::Text(bytes) => {
                let message = String::from_utf8_lossy(bytes).into_owned();
                if message.contains(PUNCH_SENTINEL) {
                    continue;
                }
                events.emit(RoomEvent::MessageReceived {
                    sender: peer_key,
                    message,
                });
            }
            Datagram::Chunk(header, payload) => {
                if let Some(frame) = reassembly.accept(&peer_key, header, payload) {
                    events.emit(RoomEvent::FrameReceived(frame));
                }
            }
        }
    }
}

/// Send one chat line to every live peer. Zero peers is a no-op.
pub async fn send_text(socket: &UdpSocket, peers: &Mutex<PeerTable>, text: &str) {
    let targets = peers.lock().await.snapshot();
    if targets.is_empty() {
        info!("no connected peers yet, dropping outbound message");
        return;
    }
    debug!(peers = targets.len(), "sending chat line");
    for (peer_key, addr) in targets {
        if let Err(e) = socket.send_to(text.as_bytes(), addr).await {
            warn!(%peer_key, "chat send failed: {}", e);
        }
    }
}

/// Fragment one encoded frame and offer its chunks in ascending order to
/// every live peer. A failure towards one peer does not abort the frame
/// for the others.
pub async fn send_frame(socket: &UdpSocket, peers: &Mutex<PeerTable>, frame: &[u8]) {
    let targets = peers.lock().await.snapshot();
    if targets.is_empty() {
        return;
    }
    let chunks = framing::fragment(framing::next_frame_id(), frame);
    debug!(
        bytes = frame.len(),
        chunks = chunks.len(),
        peers = targets.len(),
        "sending frame"
    );
    for chunk in &chunks {
        for (peer_key, addr) in &targets {
            if let Err(e) = socket.send_to(chunk, *addr).await {
                warn!(%peer_key, "chunk send failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::framing::fragment;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    #[test]
    fn short_datagrams_are_text() {
        assert!(matches!(classify(b"hi"), Datagram::Text(b"hi")));
        assert!(matches!(classify(&[]), Datagram::Text(&[])));
    }

    #[test]
    fn zero_chunk_count_is_text() {
        // frame_id 0x68692074, chunk 0x6865, total 0x0000
        let buf = [0x68, 0x69, 0x20, 0x74, 0x68, 0x65, 0x00, 0x00];
        assert!(matches!(classify(&buf), Datagram::Text(_)));
    }

    #[test]
    fn implausible_chunk_count_is_text() {
        let mut buf = Vec::new();
        ChunkHeader {
            frame_id: 1,
            chunk_id: 0,
            total_chunks: 1001,
        }
        .encode(&mut buf);
        assert!(matches!(classify(&buf), Datagram::Text(_)));
    }

    #[test]
    fn bare_header_is_media_with_empty_payload() {
        let mut buf = Vec::new();
        ChunkHeader {
            frame_id: 9,
            chunk_id: 0,
            total_chunks: 1,
        }
        .encode(&mut buf);
        match classify(&buf) {
            Datagram::Chunk(header, payload) => {
                assert_eq!(header.total_chunks, 1);
                assert!(payload.is_empty());
            }
            Datagram::Text(_) => panic!("classified as text"),
        }
    }

    #[test]
    fn header_plus_payload_is_media() {
        let frame = [0xFF, 0xD8, 0xFF, 0x00];
        let datagram = &fragment(5, &frame)[0];
        match classify(datagram) {
            Datagram::Chunk(header, payload) => {
                assert_eq!(header.frame_id, 5);
                assert_eq!(payload, &frame[..]);
            }
            Datagram::Text(_) => panic!("classified as text"),
        }
    }

    async fn recv_event(rx: &mut UnboundedReceiver<RoomEvent>) -> RoomEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn demultiplexes_punches_chat_and_frames() {
        let reader_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let reader_addr = reader_socket.local_addr().unwrap();
        let peers = Arc::new(Mutex::new(PeerTable::new()));
        let (events, mut rx) = EventBridge::channel();
        let engine = ReassemblyEngine::new(Duration::from_secs(2), 8);
        tokio::spawn(run_reader(reader_socket, peers.clone(), engine, events));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender_key = sender.local_addr().unwrap().to_string();

        sender
            .send_to(PUNCH_SENTINEL.as_bytes(), reader_addr)
            .await
            .unwrap();
        sender.send_to(b"hi", reader_addr).await.unwrap();

        // The punch datagram was suppressed; the chat line comes through.
        match recv_event(&mut rx).await {
            RoomEvent::MessageReceived { sender: from, message } => {
                assert_eq!(from, sender_key);
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // The punch still registered the sender as a peer.
        assert!(peers.lock().await.contains(&sender_key));

        let mut frame = vec![0xFF, 0xD8, 0xFF];
        frame.extend(std::iter::repeat(0xAB).take(8997));
        let mut chunks = fragment(1234, &frame);
        assert_eq!(chunks.len(), 7);
        chunks.reverse();
        for chunk in &chunks {
            sender.send_to(chunk, reader_addr).await.unwrap();
        }

        match recv_event(&mut rx).await {
            RoomEvent::FrameReceived(received) => assert_eq!(received, frame),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_text_reaches_every_peer() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let peers = Mutex::new(PeerTable::new());
        for peer in [&peer_a, &peer_b] {
            let addr = peer.local_addr().unwrap();
            peers.lock().await.insert_if_absent(&addr.to_string(), addr);
        }

        send_text(&socket, &peers, "hello").await;

        let mut buf = [0u8; 64];
        for peer in [&peer_a, &peer_b] {
            let (n, _) = timeout(Duration::from_secs(5), peer.recv_from(&mut buf))
                .await
                .expect("timed out waiting for chat datagram")
                .unwrap();
            assert_eq!(&buf[..n], b"hello");
        }
    }

    #[tokio::test]
    async fn sending_with_no_peers_is_a_noop() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peers = Mutex::new(PeerTable::new());
        send_text(&socket, &peers, "hello").await;
        send_frame(&socket, &peers, &[0xFF, 0xD8, 0xFF, 0x00]).await;
    }
}
