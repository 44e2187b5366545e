//! Transport boundary
//!
//! Wire-level pub/sub handling is an external collaborator: the pipeline
//! only sees the `Transport` trait. The connection manager wraps one
//! endpoint with retry pacing, delivery wiring and clean disconnect; the
//! in-process loopback implementation backs tests and the simulator demo.

pub mod loopback;

use crate::config::BrokerEndpoint;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

/// First retry delay in seconds; grows linearly per attempt.
pub const BASE_DELAY_SECS: u64 = 5;
/// Retry delay ceiling in seconds.
pub const MAX_DELAY_SECS: u64 = 60;

/// One message delivered from a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub enum TransportError {
    Connection(String),
    Publish(String),
    Subscribe(String),
    Cancelled,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connection(msg) => write!(f, "connection error: {}", msg),
            TransportError::Publish(msg) => write!(f, "publish error: {}", msg),
            TransportError::Subscribe(msg) => write!(f, "subscribe error: {}", msg),
            TransportError::Cancelled => write!(f, "cancelled by shutdown"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Client-side pub/sub socket contract. Implementations own framing and
/// socket lifecycle; the pipeline never sees below this line.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;

    /// Route every message arriving on `topic` into `tx`, one at a time.
    async fn subscribe(
        &self,
        topic: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> Result<(), TransportError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

/// Linear retry pacing: `min(attempt * base, cap)` with an uncapped attempt
/// counter.
#[derive(Debug)]
pub struct LinearBackoff {
    base_delay: u64,
    max_delay: u64,
    attempt: u64,
}

impl LinearBackoff {
    pub fn new(base_delay: u64, max_delay: u64) -> Self {
        Self {
            base_delay,
            max_delay,
            attempt: 0,
        }
    }

    /// Delay before the next attempt. The first call yields `base`.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        Duration::from_secs(std::cmp::min(self.base_delay * self.attempt, self.max_delay))
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Owns one transport endpoint: connect with linear backoff, publish to and
/// subscribe on the configured topic, disconnect on shutdown.
pub struct ConnectionManager {
    client_id: String,
    endpoint: BrokerEndpoint,
    transport: Arc<dyn Transport>,
}

impl ConnectionManager {
    pub fn new(client_id: String, endpoint: BrokerEndpoint, transport: Arc<dyn Transport>) -> Self {
        Self {
            client_id,
            endpoint,
            transport,
        }
    }

    pub fn topic(&self) -> &str {
        &self.endpoint.topic
    }

    /// Connect, retrying forever with linear backoff until success or
    /// shutdown. Never blocks delivery once connected; callers run this to
    /// completion before wiring subscriptions.
    pub async fn connect_with_retry(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let mut backoff = LinearBackoff::new(BASE_DELAY_SECS, MAX_DELAY_SECS);

        loop {
            log::info!(
                "🔌 [CONNECTING] {} to {}:{}...",
                self.client_id,
                self.endpoint.host,
                self.endpoint.port
            );

            match self.transport.connect().await {
                Ok(()) => {
                    log::info!(
                        "✅ [CONNECTED] {} to {}:{}",
                        self.client_id,
                        self.endpoint.host,
                        self.endpoint.port
                    );
                    return Ok(());
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    log::error!(
                        "❌ Connection failed (attempt {}): {}. Retrying in {}s...",
                        backoff.attempt(),
                        e,
                        delay.as_secs()
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.changed() => return Err(TransportError::Cancelled),
                    }
                }
            }
        }
    }

    /// Subscribe the endpoint's topic, delivering into `tx`.
    pub async fn subscribe(&self, tx: mpsc::Sender<InboundMessage>) -> Result<(), TransportError> {
        self.transport.subscribe(&self.endpoint.topic, tx).await?;
        log::info!(
            "✅ Subscribed to {}:{} [{}]",
            self.endpoint.host,
            self.endpoint.port,
            self.endpoint.topic
        );
        Ok(())
    }

    /// Publish one payload to the endpoint's topic.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.transport.publish(&self.endpoint.topic, payload).await
    }

    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
        log::info!("👋 [DISCONNECTED] {}", self.client_id);
    }
}
