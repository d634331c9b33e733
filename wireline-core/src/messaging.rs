//! Outgoing message sequencing, the pending-receipt queue, and receipt
//! resolution.
//!
//! There is no cross-message ordering guarantee and no automatic
//! retransmission in this core — delivery is best-effort and
//! receipt-driven. The queue is a flat `Vec` scanned linearly on each
//! receipt; see SPEC_FULL.md's open-question note on why this isn't
//! indexed by message-id.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// A message awaiting delivery confirmation.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub message_id: String,
    pub recipient_user_id: String,
    pub recipient_display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Thread-safe queue of in-flight sends, guarded by the same lock
/// discipline as the peer table: never held across I/O.
#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<Vec<PendingMessage>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: PendingMessage) {
        self.inner.lock().expect("pending queue mutex poisoned").push(message);
    }

    /// Remove the first entry matching `message_id`. Returns it if found;
    /// additional receipts for the same id are harmless no-ops once the
    /// first has been removed.
    pub fn resolve(&self, message_id: &str) -> Option<PendingMessage> {
        let mut queue = self.inner.lock().expect("pending queue mutex poisoned");
        let index = queue.iter().position(|m| m.message_id == message_id)?;
        Some(queue.remove(index))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unix seconds for the `timestamp` field of an outgoing `message` payload.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> PendingMessage {
        PendingMessage {
            message_id: id.to_string(),
            recipient_user_id: "u2".to_string(),
            recipient_display_name: "bob".to_string(),
            content: "hi".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolve_removes_exactly_one_matching_entry() {
        let queue = PendingQueue::new();
        queue.push(sample("m1"));
        queue.push(sample("m2"));
        assert_eq!(queue.len(), 2);

        let resolved = queue.resolve("m1").unwrap();
        assert_eq!(resolved.message_id, "m1");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn duplicate_receipts_are_harmless_after_first_resolution() {
        let queue = PendingQueue::new();
        queue.push(sample("m1"));
        assert!(queue.resolve("m1").is_some());
        assert!(queue.resolve("m1").is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn unmatched_receipt_leaves_queue_unchanged() {
        let queue = PendingQueue::new();
        queue.push(sample("m1"));
        assert!(queue.resolve("does-not-exist").is_none());
        assert_eq!(queue.len(), 1);
    }
}
