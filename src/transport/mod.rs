//! # Pub/Sub Transport
//!
//! Narrow contract over a publish/subscribe client. The synchronization core
//! depends only on [`Transport`]; the broker client is injected, never global.
//!
//! ```text
//! transport/
//! ├── mod.rs     - Transport trait, subscription table, connection state
//! ├── mqtt.rs    - rumqttc-backed transport with reconnect and re-subscribe
//! └── memory.rs  - in-process loopback bus for tests and offline tooling
//! ```
//!
//! ## Contract
//! - `publish` while disconnected fails with [`TransportError::NotConnected`];
//!   nothing is queued.
//! - At most one handler per topic: subscribing again replaces the handler.
//! - Reconnect and backoff stay inside the concrete transport.

pub mod memory;
pub mod mqtt;

pub use memory::MemoryTransport;
pub use mqtt::MqttTransport;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Callback invoked with `(topic, payload)` for every message on a subscribed topic
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Boxes a closure as a [`MessageHandler`].
pub fn handler<F>(f: F) -> MessageHandler
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Publish or subscribe attempted before a successful connect
    #[error("transport is not connected")]
    NotConnected,

    /// Broker did not acknowledge the connection in time
    #[error("broker did not accept the connection within {0} ms")]
    ConnectTimeout(u64),

    /// Request could not be handed to the client
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("connection error: {0}")]
    Connection(String),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError>;

    /// Registers `handler` for `topic`, replacing any previous handler.
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Unsubscribes `topic` only while `handler` is still the registered one.
    ///
    /// Returns `false` and leaves the subscription alone when another handler
    /// has taken the topic over.
    async fn unsubscribe_handler(
        &self,
        topic: &str,
        handler: &MessageHandler,
    ) -> Result<bool, TransportError>;
}

/// Topic to handler registry, last registration wins
#[derive(Default)]
pub struct SubscriptionTable {
    handlers: Mutex<HashMap<String, MessageHandler>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MessageHandler>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns `true` when an existing handler was replaced.
    pub fn insert(&self, topic: &str, handler: MessageHandler) -> bool {
        let replaced = self.lock().insert(topic.to_string(), handler).is_some();
        if replaced {
            debug!("Replaced handler for topic {}", topic);
        }
        replaced
    }

    /// Returns `true` when a handler was registered.
    pub fn remove(&self, topic: &str) -> bool {
        self.lock().remove(topic).is_some()
    }

    /// Removes the entry for `topic` if it still holds `handler`.
    pub fn remove_handler(&self, topic: &str, handler: &MessageHandler) -> bool {
        let mut handlers = self.lock();
        let owned = handlers
            .get(topic)
            .is_some_and(|current| same_handler(current, handler));
        if owned {
            handlers.remove(topic);
        }
        owned
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.lock().contains_key(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Delivers a message to the handler for `topic`, if any.
    ///
    /// The handler runs without the table lock held so it may publish or
    /// (un)subscribe itself.
    pub fn dispatch(&self, topic: &str, payload: &str) -> bool {
        let handler = self.lock().get(topic).cloned();
        match handler {
            Some(handler) => {
                handler(topic, payload);
                true
            }
            None => {
                trace!("No handler for message on {}", topic);
                false
            }
        }
    }
}

fn same_handler(a: &MessageHandler, b: &MessageHandler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn last_registration_wins() {
        let table = SubscriptionTable::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        assert!(!table.insert(
            "data/dev-A",
            handler(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        ));
        let counter = second.clone();
        assert!(table.insert(
            "data/dev-A",
            handler(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        ));

        assert!(table.dispatch("data/dev-A", "42"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(table.topics(), vec!["data/dev-A".to_string()]);
    }

    #[test]
    fn remove_handler_spares_a_replacement() {
        let table = SubscriptionTable::new();
        let first = handler(|_, _| {});
        let second = handler(|_, _| {});

        table.insert("config/subscribe/dev-A/response", first.clone());
        table.insert("config/subscribe/dev-A/response", second.clone());

        assert!(!table.remove_handler("config/subscribe/dev-A/response", &first));
        assert!(table.contains("config/subscribe/dev-A/response"));
        assert!(table.remove_handler("config/subscribe/dev-A/response", &second));
        assert!(!table.contains("config/subscribe/dev-A/response"));
    }

    #[test]
    fn handler_may_touch_the_table() {
        let table = Arc::new(SubscriptionTable::new());
        let inner = table.clone();
        table.insert(
            "once",
            handler(move |topic, _| {
                inner.remove(topic);
            }),
        );

        assert!(table.dispatch("once", ""));
        assert!(!table.contains("once"));
        assert!(!table.dispatch("once", ""));
    }
}
