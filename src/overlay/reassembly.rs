/**
 * overlay/reassembly.rs
 *
 * Chunk buffering and frame reassembly under loss and reorder
 */

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::framing::ChunkHeader;

const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];
const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Assembled frames must be an encoded still image; anything else is
/// line noise that happened to parse as chunks.
pub fn is_image(data: &[u8]) -> bool {
    data.starts_with(&PNG_MAGIC) || data.starts_with(&JPEG_MAGIC)
}

/// Identifies one in-flight frame: the sending peer plus its frame id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub sender: String,
    pub frame_id: u32,
}

/// Chunks received so far for one frame. `total_chunks` is fixed at
/// creation; contradicting chunks are dropped.
struct Bucket {
    total_chunks: u16,
    first_seen: Instant,
    chunks: HashMap<u16, Vec<u8>>,
}

/// Buffers chunks per `(sender, frame_id)` and emits each frame exactly
/// once when its chunk set is complete and passes the image gate.
/// Partial frames are bounded by an age limit and a per-sender cap.
pub struct ReassemblyEngine {
    buckets: HashMap<FrameKey, Bucket>,
    timeout: Duration,
    max_buckets_per_sender: usize,
}

impl ReassemblyEngine {
    pub fn new(timeout: Duration, max_buckets_per_sender: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            timeout,
            max_buckets_per_sender,
        }
    }

    /// Feed one media chunk. Returns the assembled image when this chunk
    /// completes a frame that passes the magic-number gate.
    pub fn accept(&mut self, sender: &str, header: ChunkHeader, payload: &[u8]) -> Option<Vec<u8>> {
        self.accept_at(Instant::now(), sender, header, payload)
    }

    fn accept_at(
        &mut self,
        now: Instant,
        sender: &str,
        header: ChunkHeader,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        self.evict_stale(now);

        let key = FrameKey {
            sender: sender.to_string(),
            frame_id: header.frame_id,
        };
        if !self.buckets.contains_key(&key) {
            self.enforce_sender_cap(sender);
            self.buckets.insert(
                key.clone(),
                Bucket {
                    total_chunks: header.total_chunks,
                    first_seen: now,
                    chunks: HashMap::new(),
                },
            );
        }
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return None;
        };

        if bucket.total_chunks != header.total_chunks {
            debug!(
                sender,
                frame_id = header.frame_id,
                "chunk contradicts recorded chunk count, dropping"
            );
            return None;
        }
        // Duplicates replace the same bytes.
        bucket.chunks.insert(header.chunk_id, payload.to_vec());
        if bucket.chunks.len() < bucket.total_chunks as usize {
            return None;
        }

        // Complete or corrupt; the bucket is terminal either way.
        let bucket = self.buckets.remove(&key)?;
        let mut frame = Vec::with_capacity(bucket.chunks.values().map(Vec::len).sum());
        for chunk_id in 0..bucket.total_chunks {
            match bucket.chunks.get(&chunk_id) {
                Some(chunk) => frame.extend_from_slice(chunk),
                None => {
                    // Count matched but an index is missing: the declared
                    // count was corrupt. Drop the frame.
                    warn!(
                        sender,
                        frame_id = header.frame_id,
                        chunk_id,
                        "chunk index missing from a complete bucket, dropping frame"
                    );
                    return None;
                }
            }
        }
        if !is_image(&frame) {
            warn!(
                sender,
                frame_id = header.frame_id,
                bytes = frame.len(),
                "assembled payload is not an encoded image, dropping"
            );
            return None;
        }
        debug!(
            sender,
            frame_id = header.frame_id,
            bytes = frame.len(),
            chunks = bucket.total_chunks,
            "frame assembled"
        );
        Some(frame)
    }

    /// Discard partial frames older than the timeout so losses cannot
    /// leak memory. Runs on every chunk arrival.
    fn evict_stale(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.buckets.retain(|key, bucket| {
            let keep = now.duration_since(bucket.first_seen) <= timeout;
            if !keep {
                debug!(
                    sender = %key.sender,
                    frame_id = key.frame_id,
                    "evicting stale partial frame"
                );
            }
            keep
        });
    }

    /// Make room before creating a bucket for `sender`: when the sender is
    /// at its cap, its oldest partial frame is dropped.
    fn enforce_sender_cap(&mut self, sender: &str) {
        let live = self
            .buckets
            .keys()
            .filter(|key| key.sender == sender)
            .count();
        if live < self.max_buckets_per_sender {
            return;
        }
        let oldest = self
            .buckets
            .iter()
            .filter(|(key, _)| key.sender == sender)
            .min_by_key(|(_, bucket)| bucket.first_seen)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!(sender, frame_id = key.frame_id, "sender at bucket cap, evicting oldest");
            self.buckets.remove(&key);
        }
    }
}
