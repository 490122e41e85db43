use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::client::ConnectionState;
use crate::envelope::Envelope;
use crate::error::Error;

/// Events delivered to subscribers.
#[derive(Debug)]
pub enum ClientEvent {
    /// The transport opened successfully
    Open,
    /// The transport closed; `code` is the close code when one was received
    Close { code: Option<u16> },
    /// A transport or lifecycle error occurred
    Error(Error),
    /// An inbound envelope that did not match a pending request
    Message(Envelope),
    /// A reconnect attempt was scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// A reconnect attempt succeeded
    Reconnected,
    /// The connection state changed
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl ClientEvent {
    /// The subscription channel this event is delivered on.
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Open => EventKind::Open,
            ClientEvent::Close { .. } => EventKind::Close,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::Message(_) => EventKind::Message,
            ClientEvent::Reconnecting { .. } => EventKind::Reconnecting,
            ClientEvent::Reconnected => EventKind::Reconnected,
            ClientEvent::StateChanged { .. } => EventKind::StateChanged,
        }
    }
}

/// Named event channels a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Message,
    Reconnecting,
    Reconnected,
    StateChanged,
}

/// Token returned by `subscribe`; pass it to `unsubscribe` to detach the
/// handler. Subscriptions are explicit so handlers cannot leak across
/// repeated reconnect cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    subscribers: HashMap<EventKind, Vec<(u64, Handler)>>,
    next_token: u64,
}

/// Routes events to per-kind subscriber lists.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    registry: RwLock<Registry>,
}

impl EventDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&ClientEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        let mut registry = self.registry.write();
        let token = registry.next_token;
        registry.next_token += 1;
        registry
            .subscribers
            .entry(kind)
            .or_default()
            .push((token, Arc::new(handler)));
        SubscriptionToken(token)
    }

    /// Detach a handler. Returns `false` if the token was already removed.
    pub(crate) fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut registry = self.registry.write();
        for subscribers in registry.subscribers.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|(t, _)| *t != token.0);
            if subscribers.len() != before {
                return true;
            }
        }
        false
    }

    /// Deliver an event to every subscriber of its kind.
    ///
    /// Handlers are invoked outside the registry lock, so a handler may
    /// subscribe or unsubscribe without deadlocking.
    pub(crate) fn emit(&self, event: &ClientEvent) {
        let handlers: Vec<Handler> = {
            let registry = self.registry.read();
            registry
                .subscribers
                .get(&event.kind())
                .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in handlers {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_matching_kind_only() {
        let dispatcher = EventDispatcher::new();
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));

        let o = opens.clone();
        dispatcher.subscribe(EventKind::Open, move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });
        let c = closes.clone();
        dispatcher.subscribe(EventKind::Close, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.emit(&ClientEvent::Open);
        dispatcher.emit(&ClientEvent::Open);
        dispatcher.emit(&ClientEvent::Close { code: Some(1000) });

        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let n = count.clone();
        let token = dispatcher.subscribe(EventKind::Message, move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });

        let env = Envelope::event("chat", None);
        dispatcher.emit(&ClientEvent::Message(env.clone()));
        assert!(dispatcher.unsubscribe(token));
        dispatcher.emit(&ClientEvent::Message(env));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Second unsubscribe is a no-op
        assert!(!dispatcher.unsubscribe(token));
    }

    #[test]
    fn test_multiple_subscribers_all_fire() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let n = count.clone();
            dispatcher.subscribe(EventKind::Reconnected, move |_| {
                n.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.emit(&ClientEvent::Reconnected);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handler_can_subscribe_during_emit() {
        let dispatcher = Arc::new(EventDispatcher::new());

        let d = dispatcher.clone();
        dispatcher.subscribe(EventKind::Open, move |_| {
            d.subscribe(EventKind::Close, |_| {});
        });

        // Must not deadlock
        dispatcher.emit(&ClientEvent::Open);
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(ClientEvent::Open.kind(), EventKind::Open);
        assert_eq!(
            ClientEvent::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .kind(),
            EventKind::Reconnecting
        );
        assert_eq!(
            ClientEvent::StateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connecting,
            }
            .kind(),
            EventKind::StateChanged
        );
    }
}
