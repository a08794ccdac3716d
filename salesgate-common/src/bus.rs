//! Publish/subscribe message bus
//!
//! The relay only needs two operations from the bus: publish raw bytes to a
//! topic and consume a topic as a stream of messages. [`LocalBus`] fans
//! messages out to in-process subscribers over `tokio::sync::broadcast`
//! channels, one channel per topic.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Message bus collaborator
#[async_trait]
pub trait MessageBus: Send + Sync + std::fmt::Debug {
    /// Publish one message to `topic`
    ///
    /// Delivery is best-effort: a message published while nobody is
    /// subscribed is dropped.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Subscribe to all messages published to `topic` from now on
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// Receiving end of a topic subscription
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<Bytes>,
}

impl Subscription {
    /// Wrap a broadcast receiver for `topic`
    pub fn new(topic: impl Into<String>, rx: broadcast::Receiver<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    /// Topic this subscription listens on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the bus is gone. A subscriber that falls behind
    /// skips the overwritten messages; the republish timer re-announces
    /// anything still pending.
    pub async fn next(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        topic = %self.topic,
                        skipped,
                        "Subscriber lagged, messages dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process bus with one broadcast channel per topic
#[derive(Debug)]
pub struct LocalBus {
    topics: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl LocalBus {
    /// Creates a bus whose topics buffer `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of active subscribers on `topic`
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        if let Some(tx) = self.topics.read().await.get(topic) {
            return tx.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if topic.is_empty() {
            return Err(Error::Bus("empty topic name".to_string()));
        }
        let tx = self.sender(topic).await;
        match tx.send(payload) {
            Ok(receivers) => debug!(topic, receivers, "Published message"),
            Err(_) => debug!(topic, "Published message with no subscribers"),
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        if topic.is_empty() {
            return Err(Error::Bus("empty topic name".to_string()));
        }
        let tx = self.sender(topic).await;
        Ok(Subscription::new(topic, tx.subscribe()))
    }
}
