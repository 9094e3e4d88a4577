//! In-process loopback bus
//!
//! Every publish is recorded and delivered straight to the handler registered
//! for the same topic, which lets a simulated device and the synchronization
//! core talk to each other without a broker.

use super::{MessageHandler, SubscriptionTable, Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
}

#[derive(Default)]
struct BusLog {
    published: Vec<PublishedMessage>,
    subscribes: HashMap<String, usize>,
    unsubscribes: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MemoryTransport {
    connected: AtomicBool,
    subscriptions: SubscriptionTable,
    log: Mutex<BusLog>,
}

impl MemoryTransport {
    /// Starts disconnected, like a freshly constructed broker client.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, BusLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulates a link drop or recovery without touching subscriptions.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delivers a message as if it arrived from the broker.
    pub fn inject(&self, topic: &str, payload: &str) -> bool {
        self.subscriptions.dispatch(topic, payload)
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.log().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.log()
            .published
            .iter()
            .filter(|message| message.topic == topic)
            .map(|message| message.payload.clone())
            .collect()
    }

    pub fn subscribe_count(&self, topic: &str) -> usize {
        self.log().subscribes.get(topic).copied().unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, topic: &str) -> usize {
        self.log().unsubscribes.get(topic).copied().unwrap_or(0)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            debug!("Dropping publish to {} while disconnected", topic);
            return Err(TransportError::NotConnected);
        }

        self.log().published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        self.subscriptions.dispatch(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        self.subscriptions.insert(topic, handler);
        *self.log().subscribes.entry(topic.to_string()).or_default() += 1;
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions.remove(topic);
        *self.log().unsubscribes.entry(topic.to_string()).or_default() += 1;
        Ok(())
    }

    async fn unsubscribe_handler(
        &self,
        topic: &str,
        handler: &MessageHandler,
    ) -> Result<bool, TransportError> {
        let removed = self.subscriptions.remove_handler(topic, handler);
        if removed {
            *self.log().unsubscribes.entry(topic.to_string()).or_default() += 1;
        }
        Ok(removed)
    }
}
