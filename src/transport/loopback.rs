//! In-process loopback transport
//!
//! A shared hub fans published payloads out to every channel subscribed on
//! the topic. Backs integration tests and the standalone simulator demo; a
//! production deployment injects a broker-backed `Transport` instead.

use super::{InboundMessage, Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct LoopbackHub {
    topics: Mutex<HashMap<String, Vec<mpsc::Sender<InboundMessage>>>>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, topic: &str, tx: mpsc::Sender<InboundMessage>) {
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
    }

    async fn deliver(&self, topic: &str, payload: Vec<u8>) {
        let subscribers: Vec<mpsc::Sender<InboundMessage>> = {
            let topics = self.topics.lock().unwrap();
            topics.get(topic).cloned().unwrap_or_default()
        };

        for tx in subscribers {
            let _ = tx
                .send(InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                })
                .await;
        }
    }
}

/// Transport backed by a shared in-process hub. Always connected.
pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
}

impl LoopbackTransport {
    pub fn new(hub: Arc<LoopbackHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        tx: mpsc::Sender<InboundMessage>,
    ) -> Result<(), TransportError> {
        self.hub.register(topic, tx);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.hub.deliver(topic, payload).await;
        Ok(())
    }

    async fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let hub = LoopbackHub::new();
        let transport = LoopbackTransport::new(hub.clone());

        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);
        transport.subscribe("prediction", tx1).await.unwrap();
        transport.subscribe("prediction", tx2).await.unwrap();

        transport
            .publish("prediction", b"hello".to_vec())
            .await
            .unwrap();

        assert_eq!(rx1.recv().await.unwrap().payload, b"hello");
        assert_eq!(rx2.recv().await.unwrap().payload, b"hello");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let hub = LoopbackHub::new();
        let transport = LoopbackTransport::new(hub.clone());

        let (tx, mut rx) = mpsc::channel(10);
        transport.subscribe("prediction", tx).await.unwrap();

        transport
            .publish("cloud/training_data", b"batch".to_vec())
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_publish() {
        let hub = LoopbackHub::new();
        let transport = LoopbackTransport::new(hub.clone());

        let (tx, rx) = mpsc::channel(10);
        transport.subscribe("prediction", tx).await.unwrap();
        drop(rx);

        transport
            .publish("prediction", b"hello".to_vec())
            .await
            .unwrap();
    }
}
