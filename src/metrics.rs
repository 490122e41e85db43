use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Counters and gauges for monitoring the client.
///
/// Counters are monotonic totals; gauges track the current size of the
/// outbound queue, the pending-request table, and the reconnect attempt
/// counter. Use `snapshot()` for a point-in-time view suitable for export.
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnects_scheduled_total: AtomicU64,
    messages_sent_total: AtomicU64,
    messages_received_total: AtomicU64,
    heartbeats_sent_total: AtomicU64,
    queue_evictions_total: AtomicU64,
    request_timeouts_total: AtomicU64,
    protocol_errors_total: AtomicU64,
    errors_total: AtomicU64,

    queued_messages: AtomicUsize,
    pending_requests: AtomicUsize,
    reconnect_attempts: AtomicU32,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Total connections established
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Total reconnect attempts scheduled
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled_total.load(Ordering::Relaxed)
    }

    /// Total messages written to the transport
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Total well-formed envelopes received
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Total heartbeat envelopes sent
    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent_total.load(Ordering::Relaxed)
    }

    /// Total queued messages evicted by the capacity policy
    pub fn queue_evictions(&self) -> u64 {
        self.queue_evictions_total.load(Ordering::Relaxed)
    }

    /// Total pending requests rejected by deadline expiry
    pub fn request_timeouts(&self) -> u64 {
        self.request_timeouts_total.load(Ordering::Relaxed)
    }

    /// Total malformed inbound frames dropped
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors_total.load(Ordering::Relaxed)
    }

    /// Total transport/lifecycle errors observed
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Current outbound queue depth
    pub fn queued_messages(&self) -> usize {
        self.queued_messages.load(Ordering::Relaxed)
    }

    /// Current number of pending requests
    pub fn pending_requests(&self) -> usize {
        self.pending_requests.load(Ordering::Relaxed)
    }

    /// Current reconnect attempt counter (0 while connected)
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    // ========== Recording methods (called by the driver) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_eviction(&self) {
        self.queue_evictions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request_timeout(&self, count: u64) {
        self.request_timeouts_total.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_queued_messages(&self, depth: usize) {
        self.queued_messages.store(depth, Ordering::Relaxed);
    }

    pub(crate) fn set_pending_requests(&self, count: usize) {
        self.pending_requests.store(count, Ordering::Relaxed);
    }

    pub(crate) fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnects_scheduled_total: self.reconnects_scheduled_total.load(Ordering::Acquire),
            messages_sent_total: self.messages_sent_total.load(Ordering::Acquire),
            messages_received_total: self.messages_received_total.load(Ordering::Acquire),
            heartbeats_sent_total: self.heartbeats_sent_total.load(Ordering::Acquire),
            queue_evictions_total: self.queue_evictions_total.load(Ordering::Acquire),
            request_timeouts_total: self.request_timeouts_total.load(Ordering::Acquire),
            protocol_errors_total: self.protocol_errors_total.load(Ordering::Acquire),
            errors_total: self.errors_total.load(Ordering::Acquire),
            queued_messages: self.queued_messages.load(Ordering::Acquire),
            pending_requests: self.pending_requests.load(Ordering::Acquire),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Acquire),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnects_scheduled_total: u64,
    pub messages_sent_total: u64,
    pub messages_received_total: u64,
    pub heartbeats_sent_total: u64,
    pub queue_evictions_total: u64,
    pub request_timeouts_total: u64,
    pub protocol_errors_total: u64,
    pub errors_total: u64,
    pub queued_messages: usize,
    pub pending_requests: usize,
    pub reconnect_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counters() {
        let metrics = Metrics::new();

        metrics.record_connection();
        metrics.record_connection();
        metrics.record_reconnect_scheduled();
        metrics.record_message_sent();
        metrics.record_request_timeout(2);

        assert_eq!(metrics.connections(), 2);
        assert_eq!(metrics.reconnects_scheduled(), 1);
        assert_eq!(metrics.messages_sent(), 1);
        assert_eq!(metrics.request_timeouts(), 2);
        assert_eq!(metrics.messages_received(), 0);
    }

    #[test]
    fn test_gauges_track_current_value() {
        let metrics = Metrics::new();

        metrics.set_queued_messages(7);
        metrics.set_pending_requests(2);
        metrics.set_reconnect_attempts(3);
        assert_eq!(metrics.queued_messages(), 7);
        assert_eq!(metrics.pending_requests(), 2);
        assert_eq!(metrics.reconnect_attempts(), 3);

        metrics.set_queued_messages(0);
        assert_eq!(metrics.queued_messages(), 0);
    }

    #[test]
    fn test_snapshot() {
        let metrics = Metrics::new();

        metrics.record_connection();
        metrics.record_heartbeat();
        metrics.set_pending_requests(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connections_total, 1);
        assert_eq!(snapshot.heartbeats_sent_total, 1);
        assert_eq!(snapshot.pending_requests, 1);
    }
}
