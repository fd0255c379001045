//! Pub/sub transport boundary.
//!
//! The simulator never talks to a broker directly; actors and the
//! supervisor publish and subscribe through [`Transport`]. Deployments back
//! it with an external broker client; tests and the sandbox binary use
//! [`LocalBroker`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Upper bound on any single broker call made by an actor or the
/// supervisor. A stalled broker costs one deadline, not a wedged loop.
pub const TRANSPORT_DEADLINE: Duration = Duration::from_secs(5);

/// Frames queued per subscription before the broker starts dropping.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Inbound frames for one subscription. Dropping the receiver ends the
/// subscription; the broker prunes the sender on its next publish.
pub type Subscription = mpsc::Receiver<Vec<u8>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish one frame to `topic`.
    async fn publish(&self, topic: &str, frame: Vec<u8>, qos: Qos) -> Result<(), TransportError>;

    /// Open a subscription for exact-match `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError>;
}

/// Bound a transport call with `deadline`; expiry is a transport failure.
pub async fn with_deadline<F, T>(deadline: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}

/// In-process broker: fans published frames out to every subscriber of the
/// exact topic. No wildcards, no retained messages, no persistence.
#[derive(Default)]
pub struct LocalBroker {
    topics: DashMap<String, Vec<mpsc::Sender<Vec<u8>>>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LocalBroker {
    async fn publish(&self, topic: &str, frame: Vec<u8>, _qos: Qos) -> Result<(), TransportError> {
        if let Some(mut senders) = self.topics.get_mut(topic) {
            senders.retain(|tx| match tx.try_send(frame.clone()) {
                Ok(()) => true,
                // Slow subscriber: the frame is lost, the subscription lives.
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.topics.entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber_of_the_topic() {
        let broker = LocalBroker::new();
        let mut a = broker.subscribe("lab/drone/d1/telemetry").await.unwrap();
        let mut b = broker.subscribe("lab/drone/d1/telemetry").await.unwrap();
        let mut other = broker.subscribe("lab/drone/d2/telemetry").await.unwrap();

        broker
            .publish("lab/drone/d1/telemetry", b"hello".to_vec(), Qos::AtMostOnce)
            .await
            .unwrap();

        assert_eq!(a.recv().await.unwrap(), b"hello");
        assert_eq!(b.recv().await.unwrap(), b"hello");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let broker = LocalBroker::new();
        let rx = broker.subscribe("t").await.unwrap();
        drop(rx);

        broker
            .publish("t", b"x".to_vec(), Qos::AtMostOnce)
            .await
            .unwrap();

        assert!(broker.topics.get("t").unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_buffer_drops_frames_not_subscriptions() {
        let broker = LocalBroker::new();
        let mut rx = broker.subscribe("t").await.unwrap();

        for i in 0..(SUBSCRIPTION_BUFFER + 10) {
            broker
                .publish("t", vec![i as u8], Qos::AtMostOnce)
                .await
                .unwrap();
        }

        // The earliest frames survive, later ones were shed.
        assert_eq!(rx.recv().await.unwrap(), vec![0]);
        assert_eq!(broker.topics.get("t").unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_transport_failure() {
        let result: Result<(), TransportError> =
            with_deadline(Duration::from_millis(50), std::future::pending()).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }
}
