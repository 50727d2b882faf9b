/**
 * overlay/events.rs
 *
 * Event bridge to the UI collaborator
 */

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::types::RoomEvent;

/// Best-effort publisher of domain events. Sends never block the
/// transport tasks; a vanished receiver means the UI is gone and events
/// are silently discarded.
#[derive(Clone)]
pub struct EventBridge {
    tx: UnboundedSender<RoomEvent>,
}

impl EventBridge {
    /// The bridge plus the receiving end the UI collaborator consumes.
    pub fn channel() -> (EventBridge, UnboundedReceiver<RoomEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventBridge { tx }, rx)
    }

    pub fn emit(&self, event: RoomEvent) {
        let _ = self.tx.send(event);
    }
}
