//! MQTT transport backed by rumqttc
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ◄──► Reconnecting
//!                      │
//!                      └──► Failed (no ConnAck within connect_timeout_ms)
//! ```
//!
//! The rumqttc event loop runs in its own tokio task. Incoming publishes are
//! routed through the [`SubscriptionTable`]; every ConnAck re-issues the
//! broker subscriptions for all registered topics because the broker may have
//! dropped the session.

use super::{ConnectionState, MessageHandler, SubscriptionTable, Transport, TransportError};
use crate::config::BrokerConfig;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct Session {
    client: AsyncClient,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

pub struct MqttTransport {
    broker: BrokerConfig,
    session: Mutex<Option<Session>>,
    subscriptions: Arc<SubscriptionTable>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl MqttTransport {
    pub fn new(broker: BrokerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            broker,
            session: Mutex::new(None),
            subscriptions: Arc::new(SubscriptionTable::new()),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn client(&self) -> Option<AsyncClient> {
        self.session().as_ref().map(|session| session.client.clone())
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.broker.client_id.clone(),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs));
        if let (Some(user), Some(pw)) = (&self.broker.username, &self.broker.password) {
            options.set_credentials(user.clone(), pw.clone());
        }
        options
    }

    async fn broker_unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        if let Some(client) = self.client().filter(|_| self.is_connected()) {
            debug!("Unsubscribing from {}", topic);
            client.unsubscribe(topic).await?;
        }
        Ok(())
    }

    fn stop_event_loop(&self) {
        if let Some(session) = self.session().take() {
            session.shutdown.cancel();
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        self.stop_event_loop();

        info!(
            "Connecting to MQTT broker {}:{} as {}",
            self.broker.host, self.broker.port, self.broker.client_id
        );
        self.state.send_replace(ConnectionState::Connecting);

        let (client, eventloop) = AsyncClient::new(self.options(), self.broker.channel_capacity);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            self.subscriptions.clone(),
            self.state.clone(),
            shutdown.clone(),
            Duration::from_millis(self.broker.reconnect_delay_ms),
        ));
        *self.session() = Some(Session {
            client,
            shutdown,
            task,
        });

        let mut state_rx = self.state.subscribe();
        let connected = tokio::time::timeout(
            Duration::from_millis(self.broker.connect_timeout_ms),
            state_rx.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await
        .map(|result| result.is_ok());

        match connected {
            Ok(true) => {
                info!("MQTT connection established");
                Ok(())
            }
            Ok(false) => {
                self.stop_event_loop();
                self.state.send_replace(ConnectionState::Failed);
                Err(TransportError::Connection(
                    "connection state channel closed".to_string(),
                ))
            }
            Err(_) => {
                warn!(
                    "Broker did not acknowledge connection within {} ms",
                    self.broker.connect_timeout_ms
                );
                self.stop_event_loop();
                self.state.send_replace(ConnectionState::Failed);
                Err(TransportError::ConnectTimeout(self.broker.connect_timeout_ms))
            }
        }
    }

    async fn disconnect(&self) {
        let session = self.session().take();
        if let Some(session) = session {
            if let Err(e) = session.client.disconnect().await {
                warn!("Failed to request MQTT disconnect: {}", e);
            }
            let Session { shutdown, task, .. } = session;
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                debug!("Event loop did not stop in time, cancelling");
                shutdown.cancel();
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!("MQTT transport disconnected");
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        let client = match self.client() {
            Some(client) if self.is_connected() => client,
            _ => {
                warn!("Publish to {} rejected: not connected", topic);
                return Err(TransportError::NotConnected);
            }
        };

        debug!("Publishing {} bytes to {}", payload.len(), topic);
        client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        let replaced = self.subscriptions.insert(topic, handler);
        if replaced {
            return Ok(());
        }

        // Without a live session the next ConnAck subscribes for us.
        if let Some(client) = self.client().filter(|_| self.is_connected()) {
            debug!("Subscribing to {}", topic);
            client.subscribe(topic, QoS::AtLeastOnce).await?;
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        if self.subscriptions.remove(topic) {
            self.broker_unsubscribe(topic).await?;
        }
        Ok(())
    }

    async fn unsubscribe_handler(
        &self,
        topic: &str,
        handler: &MessageHandler,
    ) -> Result<bool, TransportError> {
        if !self.subscriptions.remove_handler(topic, handler) {
            return Ok(false);
        }
        self.broker_unsubscribe(topic).await?;
        Ok(true)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.stop_event_loop();
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Arc<SubscriptionTable>,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: CancellationToken,
    reconnect_delay: Duration,
) {
    info!("MQTT event loop started");
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                state.send_replace(ConnectionState::Connected);
                for topic in subscriptions.topics() {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        error!("Re-subscribe to {} failed: {}", topic, e);
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload);
                debug!("Received {} bytes on {}", payload.len(), publish.topic);
                subscriptions.dispatch(&publish.topic, &payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the connection");
                state.send_replace(ConnectionState::Reconnecting);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent, leaving event loop");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if *state.borrow() == ConnectionState::Connected {
                    warn!("MQTT connection lost: {}", e);
                } else {
                    debug!("MQTT connection attempt failed: {}", e);
                }
                if *state.borrow() != ConnectionState::Connecting {
                    state.send_replace(ConnectionState::Reconnecting);
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(reconnect_delay) => {}
                }
            }
        }
    }
    info!("MQTT event loop stopped");
}
