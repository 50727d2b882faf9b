/**
 * overlay/framing.rs
 *
 * Chunk header codec and frame fragmentation
 */

use bytes::{Buf, BufMut, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Largest datagram offered to the socket, header included.
pub const MAX_UDP_PAYLOAD: usize = 1400;

/// Fixed prefix on every media datagram.
pub const CHUNK_HEADER_LEN: usize = 8;

/// Payload bytes carried per chunk.
pub const CHUNK_DATA_LEN: usize = MAX_UDP_PAYLOAD - CHUNK_HEADER_LEN;

/// Upper bound on `total_chunks`; anything above is treated as chat text
/// by the demultiplexer.
pub const MAX_TOTAL_CHUNKS: u16 = 1000;

/// 8-byte big-endian prefix: frame id, chunk index, chunk count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub frame_id: u32,
    pub chunk_id: u16,
    pub total_chunks: u16,
}

impl ChunkHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.frame_id);
        buf.put_u16(self.chunk_id);
        buf.put_u16(self.total_chunks);
    }

    /// Parse the fixed prefix. `None` when the datagram is too short.
    pub fn decode(mut buf: &[u8]) -> Option<ChunkHeader> {
        if buf.len() < CHUNK_HEADER_LEN {
            return None;
        }
        Some(ChunkHeader {
            frame_id: buf.get_u32(),
            chunk_id: buf.get_u16(),
            total_chunks: buf.get_u16(),
        })
    }

    /// Sanity bound used to tell media chunks from chat text. The
    /// magic-number gate on the assembled frame is the real check.
    pub fn plausible(&self) -> bool {
        self.total_chunks != 0 && self.total_chunks <= MAX_TOTAL_CHUNKS
    }
}

/// Split one encoded frame into wire datagrams, ascending chunk id.
/// An empty frame yields no datagrams.
pub fn fragment(frame_id: u32, data: &[u8]) -> Vec<Vec<u8>> {
    let total = data.len().div_ceil(CHUNK_DATA_LEN);
    if total > MAX_TOTAL_CHUNKS as usize {
        warn!(
            bytes = data.len(),
            chunks = total,
            "frame exceeds the chunk bound, receivers will discard it as text"
        );
    }
    let mut out = Vec::with_capacity(total);
    for (chunk_id, slice) in data.chunks(CHUNK_DATA_LEN).enumerate() {
        let mut datagram = BytesMut::with_capacity(CHUNK_HEADER_LEN + slice.len());
        let header = ChunkHeader {
            frame_id,
            chunk_id: chunk_id as u16,
            total_chunks: total as u16,
        };
        header.encode(&mut datagram);
        datagram.extend_from_slice(slice);
        out.push(datagram.to_vec());
    }
    out
}

/// Sender-chosen frame identifier: wall-clock milliseconds truncated to
/// 32 bits. Opaque to receivers.
pub fn next_frame_id() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn jpeg_frame(len: usize) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF];
        data.extend((3..len).map(|i| (i % 251) as u8));
        data.truncate(len);
        data
    }

    #[test]
    fn header_roundtrip() {
        let header = ChunkHeader {
            frame_id: 0xDEAD_BEEF,
            chunk_id: 7,
            total_chunks: 9,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), CHUNK_HEADER_LEN);
        assert_eq!(ChunkHeader::decode(&buf), Some(header));
    }

    #[test]
    fn header_is_big_endian() {
        let mut buf = BytesMut::new();
        ChunkHeader {
            frame_id: 1,
            chunk_id: 2,
            total_chunks: 3,
        }
        .encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 1, 0, 2, 0, 3]);
    }

    #[test]
    fn short_buffer_does_not_decode() {
        assert_eq!(ChunkHeader::decode(&[1, 2, 3]), None);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(CHUNK_DATA_LEN - 1, 1)]
    #[case(CHUNK_DATA_LEN, 1)]
    #[case(CHUNK_DATA_LEN + 1, 2)]
    #[case(CHUNK_DATA_LEN * 3, 3)]
    #[case(9000, 7)]
    fn fragment_chunk_counts(#[case] len: usize, #[case] expected: usize) {
        let chunks = fragment(42, &jpeg_frame(len));
        assert_eq!(chunks.len(), expected);
        let header = ChunkHeader::decode(&chunks[0]).unwrap();
        assert_eq!(header.total_chunks as usize, expected);
        // An exact multiple of the chunk size must not emit an empty tail.
        assert!(chunks.last().unwrap().len() > CHUNK_HEADER_LEN);
    }

    #[test]
    fn fragment_concatenation_restores_frame() {
        let frame = jpeg_frame(5000);
        let chunks = fragment(7, &frame);
        let mut rebuilt = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let header = ChunkHeader::decode(chunk).unwrap();
            assert_eq!(header.frame_id, 7);
            assert_eq!(header.chunk_id as usize, i);
            rebuilt.extend_from_slice(&chunk[CHUNK_HEADER_LEN..]);
        }
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn empty_frame_yields_no_datagrams() {
        assert!(fragment(1, &[]).is_empty());
    }

    #[test]
    fn datagrams_respect_mtu() {
        for chunk in fragment(1, &jpeg_frame(100_000)) {
            assert!(chunk.len() <= MAX_UDP_PAYLOAD);
        }
    }
}
