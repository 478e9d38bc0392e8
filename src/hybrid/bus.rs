//! Message Bus Module
//!
//! The narrow contract this crate consumes from whatever broadcast
//! transport the deployment uses, plus an in-process loopback
//! implementation for tests and single-process fleets. Delivery is
//! at-least-once; nothing here assumes ordering across publishers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::error::Result;

const SUBSCRIPTION_BUFFER: usize = 64;

// == Message Bus Trait ==
/// Publish/subscribe transport for invalidation broadcast.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a payload to every subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Opens a subscription to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<BusSubscription>;
}

// == Bus Subscription ==
/// Handle to an open subscription; dropping it unsubscribes.
#[derive(Debug)]
pub struct BusSubscription {
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl BusSubscription {
    /// Wraps a channel of raw payloads as a subscription handle.
    pub fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { receiver }
    }

    /// Receives the next payload; `None` once the subscription closes.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }
}

// == In-Process Bus ==
/// Loopback bus connecting subscribers within one process.
///
/// Mostly useful in tests; also the transport of last resort when two
/// coordinators intentionally share a process.
#[derive(Debug, Default)]
pub struct InProcessBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InProcessBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
            .clone()
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let sender = self.sender(topic);
        // No subscribers is not a failure; the broadcast just vanishes.
        if sender.send(payload).is_err() {
            debug!(topic, "published to topic with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusSubscription> {
        let mut source = self.sender(topic).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let topic = topic.to_string();
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(BusSubscription::new(rx))
    }
}

/// A bus that always fails; lets tests exercise publish-failure paths.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingBus;

#[cfg(test)]
#[async_trait]
impl MessageBus for FailingBus {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<()> {
        Err(crate::error::CacheError::Bus("publish refused".to_string()))
    }

    async fn subscribe(&self, _topic: &str) -> Result<BusSubscription> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(BusSubscription::new(rx))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe("t").await.unwrap();

        bus.publish("t", b"hello".to_vec()).await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = InProcessBus::new();
        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.subscribe("t").await.unwrap();

        bus.publish("t", b"x".to_vec()).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), b"x");
        assert_eq!(b.recv().await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InProcessBus::new();
        let mut other = bus.subscribe("other").await.unwrap();

        bus.publish("t", b"x".to_vec()).await.unwrap();
        bus.publish("other", b"y".to_vec()).await.unwrap();
        assert_eq!(other.recv().await.unwrap(), b"y");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = InProcessBus::new();
        assert!(bus.publish("t", b"x".to_vec()).await.is_ok());
    }
}
