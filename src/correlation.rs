use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::envelope::Envelope;
use crate::error::Error;

type ResponseSender = oneshot::Sender<Result<Envelope, Error>>;

#[derive(Debug)]
struct PendingEntry {
    deadline: Instant,
    timeout: Duration,
    tx: ResponseSender,
}

/// Maps outstanding request ids to callers awaiting a matching response.
///
/// Entries are removed before their sender is invoked, so every pending
/// request completes at most once: on a matching response, on deadline
/// expiry, or en masse when the connection is torn down.
#[derive(Debug, Default)]
pub(crate) struct CorrelationTable {
    entries: HashMap<String, PendingEntry>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a pending request.
    ///
    /// Returns the sender back on an id collision so the caller can reject
    /// it; ids must be unique among currently-pending requests.
    pub(crate) fn register(
        &mut self,
        id: String,
        deadline: Instant,
        timeout: Duration,
        tx: ResponseSender,
    ) -> Option<ResponseSender> {
        if self.entries.contains_key(&id) {
            return Some(tx);
        }
        self.entries.insert(
            id,
            PendingEntry {
                deadline,
                timeout,
                tx,
            },
        );
        None
    }

    /// Route an inbound envelope to its pending caller.
    ///
    /// Consumes the envelope and returns `None` when a pending entry
    /// matched; otherwise hands the envelope back for event dispatch.
    pub(crate) fn try_resolve(&mut self, envelope: Envelope) -> Option<Envelope> {
        let id = match envelope.id.as_deref() {
            Some(id) => id,
            None => return Some(envelope),
        };
        match self.entries.remove(id) {
            Some(entry) => {
                debug!("Resolved pending request {}", id);
                let _ = entry.tx.send(Ok(envelope));
                None
            }
            None => Some(envelope),
        }
    }

    /// Reject every entry whose deadline has passed.
    ///
    /// Returns the number of requests timed out.
    pub(crate) fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                debug!("Request {} timed out after {:?}", id, entry.timeout);
                let _ = entry.tx.send(Err(Error::RequestTimeout {
                    id: id.clone(),
                    timeout: entry.timeout,
                }));
            }
        }
        expired.len()
    }

    /// Reject a single pending request. Returns `false` if the id was not
    /// pending.
    pub(crate) fn reject(&mut self, id: &str, error: Error) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                debug!("Rejecting pending request {}: {}", id, error);
                let _ = entry.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Reject every remaining entry with the produced error.
    pub(crate) fn reject_all(&mut self, error: impl Fn() -> Error) {
        for (id, entry) in self.entries.drain() {
            debug!("Rejecting pending request {}", id);
            let _ = entry.tx.send(Err(error()));
        }
    }

    /// Earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn response(id: &str) -> Envelope {
        Envelope {
            id: Some(id.to_string()),
            kind: "response".to_string(),
            timestamp: 1,
            data: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_removes_entry() {
        let mut table = CorrelationTable::new();
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        assert!(table.register("r1".to_string(), now + TIMEOUT, TIMEOUT, tx).is_none());
        assert_eq!(table.len(), 1);

        assert!(table.try_resolve(response("r1")).is_none());
        assert_eq!(table.len(), 0);

        let resolved = rx.await.unwrap().unwrap();
        assert_eq!(resolved.id.as_deref(), Some("r1"));

        // A second envelope with the same id no longer matches
        assert!(table.try_resolve(response("r1")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_envelope_is_returned() {
        let mut table = CorrelationTable::new();
        assert!(table.try_resolve(response("unknown")).is_some());

        let no_id = Envelope::event("notice", None);
        assert!(table.try_resolve(no_id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_rejected() {
        let mut table = CorrelationTable::new();
        let now = Instant::now();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        assert!(table.register("r1".to_string(), now + TIMEOUT, TIMEOUT, tx1).is_none());
        assert!(table.register("r1".to_string(), now + TIMEOUT, TIMEOUT, tx2).is_some());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_rejects_with_timeout() {
        let mut table = CorrelationTable::new();
        let now = Instant::now();
        let (tx, rx) = oneshot::channel();
        table.register("r1".to_string(), now + TIMEOUT, TIMEOUT, tx);

        assert_eq!(table.expire(now + TIMEOUT - Duration::from_millis(1)), 0);
        assert_eq!(table.expire(now + TIMEOUT), 1);
        assert_eq!(table.len(), 0);

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline_is_earliest() {
        let mut table = CorrelationTable::new();
        let now = Instant::now();
        assert!(table.next_deadline().is_none());

        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        table.register("a".to_string(), now + Duration::from_secs(10), TIMEOUT, tx1);
        table.register("b".to_string(), now + Duration::from_secs(5), TIMEOUT, tx2);

        assert_eq!(table.next_deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_all() {
        let mut table = CorrelationTable::new();
        let now = Instant::now();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.register("a".to_string(), now + TIMEOUT, TIMEOUT, tx1);
        table.register("b".to_string(), now + TIMEOUT, TIMEOUT, tx2);

        table.reject_all(|| Error::ConnectionClosed);
        assert_eq!(table.len(), 0);

        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConnectionClosed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_is_harmless() {
        let mut table = CorrelationTable::new();
        let now = Instant::now();
        let (tx, rx) = oneshot::channel();
        table.register("r1".to_string(), now + TIMEOUT, TIMEOUT, tx);
        drop(rx);

        // Resolving into a dropped receiver must not panic
        assert!(table.try_resolve(response("r1")).is_none());
    }
}
