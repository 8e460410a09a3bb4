//! Broker connector.
//!
//! One MQTT session is shared by the inbound and the outbound flow. The
//! [`ConnectorTask`] drives the session: it subscribes on every successful
//! connect, writes inbound payloads to the [`InboundCache`] and reconnects
//! according to a [`ReconnectPolicy`]. The [`BrokerConnector`] handle
//! publishes on behalf of HTTP requests.
use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::InboundCache,
    config::{BrokerSettings, TopicConfig},
    error::RelayError,
    meter::METER,
};

/// Capacity of the request queue between the client handle and the event loop.
const REQUEST_QUEUE_CAPACITY: usize = 10;

/// Bytes a PUBLISH packet carries besides its payload: fixed header,
/// topic with its length prefix and packet id.
const PUBLISH_OVERHEAD: usize = 5 + 2 + u16::MAX as usize + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Delay before the given 1-based attempt, `None` once attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || self.max_attempts.map_or(false, |max| attempt > max) {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Anything the relay can publish predictions through.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), RelayError>;

    fn connection_state(&self) -> ConnectionState;
}

/// Publishing handle to the shared broker session.
pub struct BrokerConnector {
    client: AsyncClient,
    state: Arc<watch::Sender<ConnectionState>>,
    max_payload: usize,
}

impl BrokerConnector {
    /// Prepare the broker session.
    ///
    /// No network traffic happens until the returned task is run.
    pub fn connect(
        settings: &BrokerSettings,
        topics: &TopicConfig,
        cache: Arc<InboundCache>,
        policy: ReconnectPolicy,
    ) -> (Self, ConnectorTask) {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.address.host.clone(),
            settings.address.port,
        );
        let max_packet_size = settings.max_payload.saturating_add(PUBLISH_OVERHEAD);
        options
            .set_keep_alive(settings.keep_alive)
            .set_clean_session(true)
            .set_max_packet_size(max_packet_size, max_packet_size);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        let (state, _rx) = watch::channel(ConnectionState::Disconnected);
        let state = Arc::new(state);

        let task = ConnectorTask {
            eventloop,
            client: client.clone(),
            broker_address: format!("{}:{}", settings.address.host, settings.address.port),
            subscribe_topic: topics.subscribe.clone(),
            cache,
            state: Arc::clone(&state),
            policy,
            attempts: 0,
        };

        let connector = Self {
            client,
            state,
            max_payload: settings.max_payload,
        };
        (connector, task)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

#[async_trait]
impl Publisher for BrokerConnector {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), RelayError> {
        if self.state() != ConnectionState::Connected {
            return Err(RelayError::NotConnected);
        }
        // The event loop drops the whole session on an oversized packet.
        if payload.len() > self.max_payload {
            return Err(RelayError::PayloadTooLarge {
                limit: self.max_payload,
            });
        }

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;

        METER.tick_published();
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }
}

/// Drives the broker session until shutdown or until reconnects are exhausted.
pub struct ConnectorTask {
    eventloop: EventLoop,
    client: AsyncClient,
    broker_address: String,
    subscribe_topic: String,
    cache: Arc<InboundCache>,
    state: Arc<watch::Sender<ConnectionState>>,
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ConnectorTask {
    pub async fn run(mut self, shutdown: CancellationToken) {
        let address = self.broker_address.clone();
        log::info!("Connecting to MQTT broker at {}", &address);
        self.set_state(ConnectionState::Connecting);

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => None,
                polled = self.eventloop.poll() => Some(polled),
            };
            let Some(polled) = polled else {
                self.disconnect().await;
                break;
            };

            match polled {
                Ok(event) => self.on_event(&event),
                Err(e) => {
                    log::warn!("MQTT connection to {} failed: {}", &address, e);
                    let delay = match self.on_connection_error() {
                        Some(delay) => delay,
                        None => {
                            log::error!(
                                "Giving up on MQTT broker {} after {} attempts",
                                &address,
                                self.attempts - 1
                            );
                            break;
                        }
                    };

                    log::info!("Reconnecting in {:?} (attempt {})", delay, self.attempts);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.set_state(ConnectionState::Connecting);
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        log::info!("MQTT connector stopped");
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Apply one event of the broker session.
    pub fn on_event(&mut self, event: &Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code != ConnectReturnCode::Success {
                    log::warn!("Broker refused connection: {:?}", ack.code);
                    return;
                }
                log::info!("Connected to MQTT broker");
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                self.subscribe();
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                let refused = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                if refused {
                    let err = RelayError::Subscription {
                        topic: self.subscribe_topic.clone(),
                        reason: "refused by broker".into(),
                    };
                    log::error!("{}", err);
                } else {
                    log::info!("Subscribed to topic {}", &self.subscribe_topic);
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.on_message(&publish.topic, &publish.payload);
            }
            Event::Incoming(Packet::Disconnect) => {
                log::warn!("Broker closed the session");
                self.set_state(ConnectionState::Disconnected);
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                log::debug!("Outgoing publish {}", pkid);
            }
            _ => {}
        }
    }

    /// Overwrite the cache with an inbound payload.
    pub fn on_message(&self, topic: &str, payload: &[u8]) {
        let data = String::from_utf8_lossy(payload);
        log::debug!("Received data from MQTT on {}: {}", topic, &data);
        self.cache.store(&*data);
        METER.tick_received();
    }

    /// Record a failed connection, returning the delay before the next attempt.
    pub fn on_connection_error(&mut self) -> Option<Duration> {
        self.set_state(ConnectionState::Disconnected);
        self.attempts = self.attempts.saturating_add(1);
        self.policy.delay_for(self.attempts)
    }

    fn subscribe(&self) {
        if let Err(e) = self
            .client
            .try_subscribe(self.subscribe_topic.as_str(), QoS::AtMostOnce)
        {
            let err = RelayError::Subscription {
                topic: self.subscribe_topic.clone(),
                reason: e.to_string(),
            };
            log::error!("{}", err);
        }
    }

    async fn disconnect(&mut self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        if self.client.try_disconnect().is_err() {
            return;
        }

        // Flush the DISCONNECT packet before dropping the session.
        let flushed = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            log::warn!("Timed out disconnecting from MQTT broker");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("MQTT connection {} -> {}", previous, state);
        }
    }
}
