use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::envelope::Envelope;

/// Maximum times a queued message is retried before being dropped.
const MAX_SEND_RETRIES: u32 = 3;

/// An outbound message buffered while the connection was unusable.
#[derive(Debug, Clone)]
pub(crate) struct QueuedMessage {
    pub(crate) envelope: Envelope,
    pub(crate) enqueued_at: Instant,
    pub(crate) retry_count: u32,
}

impl QueuedMessage {
    fn new(envelope: Envelope, now: Instant) -> Self {
        Self {
            envelope,
            enqueued_at: now,
            retry_count: 0,
        }
    }

    /// Whether this entry should be dropped instead of retried.
    pub(crate) fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        now.duration_since(self.enqueued_at) > max_age || self.retry_count > MAX_SEND_RETRIES
    }
}

/// Bounded FIFO buffer of outbound messages.
///
/// `enqueue` appends; once the buffer is at capacity the oldest entry is
/// evicted first (drop-oldest). Draining preserves strict insertion order.
#[derive(Debug)]
pub(crate) struct MessageQueue {
    entries: VecDeque<QueuedMessage>,
    capacity: usize,
    max_age: Duration,
}

impl MessageQueue {
    pub(crate) fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            max_age,
        }
    }

    /// Append a message, evicting the oldest entry on overflow.
    ///
    /// Returns `true` if an entry was evicted to make room.
    pub(crate) fn enqueue(&mut self, envelope: Envelope, now: Instant) -> bool {
        let mut evicted = false;
        while self.entries.len() >= self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                warn!(
                    "Outbound queue full ({}), evicting oldest message (type: {})",
                    self.capacity, oldest.envelope.kind
                );
                evicted = true;
            }
        }
        self.entries.push_back(QueuedMessage::new(envelope, now));
        evicted
    }

    /// Take the whole buffer for a drain pass, oldest first.
    pub(crate) fn take_all(&mut self) -> Vec<QueuedMessage> {
        self.entries.drain(..).collect()
    }

    /// Put a message back at the front after a failed send.
    pub(crate) fn requeue_front(&mut self, message: QueuedMessage) {
        self.entries.push_front(message);
    }

    /// Whether an entry should be dropped instead of sent or retried.
    pub(crate) fn should_drop(&self, message: &QueuedMessage, now: Instant) -> bool {
        message.is_stale(now, self.max_age)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> MessageQueue {
        MessageQueue::new(capacity, Duration::from_secs(60))
    }

    fn env(kind: &str) -> Envelope {
        Envelope::event(kind, None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order() {
        let mut q = queue(10);
        let now = Instant::now();
        q.enqueue(env("a"), now);
        q.enqueue(env("b"), now);
        q.enqueue(env("c"), now);

        let drained: Vec<String> = q.take_all().into_iter().map(|m| m.envelope.kind).collect();
        assert_eq!(drained, vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_evicts_oldest() {
        let mut q = queue(100);
        let now = Instant::now();
        for i in 0..150 {
            q.enqueue(env(&format!("m{}", i)), now);
        }

        assert_eq!(q.len(), 100);
        let drained = q.take_all();
        // The first 50 were evicted; exactly the last 100 remain, in order
        assert_eq!(drained[0].envelope.kind, "m50");
        assert_eq!(drained[99].envelope.kind, "m149");
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_reports_eviction() {
        let mut q = queue(2);
        let now = Instant::now();
        assert!(!q.enqueue(env("a"), now));
        assert!(!q.enqueue(env("b"), now));
        assert!(q.enqueue(env("c"), now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_front_preserves_order() {
        let mut q = queue(10);
        let now = Instant::now();
        q.enqueue(env("a"), now);
        q.enqueue(env("b"), now);

        let mut drained = q.take_all();
        let mut first = drained.remove(0);
        first.retry_count += 1;
        // Put back the failed head, then the untouched remainder
        for m in drained.into_iter().rev() {
            q.requeue_front(m);
        }
        q.requeue_front(first);

        let kinds: Vec<String> = q.take_all().into_iter().map(|m| m.envelope.kind).collect();
        assert_eq!(kinds, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_by_age() {
        let q = MessageQueue::new(10, Duration::from_millis(500));
        let now = Instant::now();
        let msg = QueuedMessage::new(env("old"), now);

        assert!(!q.should_drop(&msg, now + Duration::from_millis(500)));
        assert!(q.should_drop(&msg, now + Duration::from_millis(501)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_by_retries() {
        let q = queue(10);
        let now = Instant::now();
        let mut msg = QueuedMessage::new(env("flaky"), now);

        msg.retry_count = MAX_SEND_RETRIES;
        assert!(!q.should_drop(&msg, now));
        msg.retry_count = MAX_SEND_RETRIES + 1;
        assert!(q.should_drop(&msg, now));
    }
}
