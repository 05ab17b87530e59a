//! In-process message bus — named topics, mailbox per consumer.
//!
//! Each `subscribe` call attaches an unbounded mpsc mailbox drained by a
//! dedicated worker task. `publish` appends to the topic's bounded history
//! and enqueues the message to every mailbox registered at publish time,
//! in registration order. Enqueueing never blocks, so a slow consumer
//! cannot stall the publishing call or other consumers.
//!
//! Ordering: each consumer observes one topic's messages in publish order
//! (per-consumer FIFO). Ordering across consumers or across topics is
//! unspecified.
//!
//! Failure isolation: a handler error is logged by its worker and the
//! mailbox keeps draining; it never reaches the publisher.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error};

use crate::error::PipelineError;

/// Messages retained per topic for inspection/replay.
const TOPIC_HISTORY_LIMIT: usize = 256;

struct TopicState<M> {
    history: VecDeque<M>,
    subscribers: Vec<mpsc::UnboundedSender<M>>,
}

impl<M> Default for TopicState<M> {
    fn default() -> Self {
        Self {
            history: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }
}

/// Named-topic publish/subscribe broker.
pub struct MessageBus<M> {
    topics: RwLock<HashMap<String, TopicState<M>>>,
}

impl<M> Default for MessageBus<M>
where
    M: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageBus<M>
where
    M: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Publish a message to a topic. Returns the number of consumers the
    /// message was delivered to (consumers registered after this call do
    /// not see it).
    pub async fn publish(&self, topic: &str, message: M) -> usize {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();

        state.history.push_back(message.clone());
        if state.history.len() > TOPIC_HISTORY_LIMIT {
            state.history.pop_front();
        }

        state.subscribers.retain(|tx| !tx.is_closed());
        let mut delivered = 0;
        for tx in &state.subscribers {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }

        debug!(topic, delivered, "Message published");
        delivered
    }

    /// Register a consumer on a topic. The handler runs on its own worker
    /// task and sees future publishes only — history is not replayed.
    pub async fn subscribe<F, Fut>(&self, topic: &str, consumer: &str, handler: F)
    where
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut topics = self.topics.write().await;
            topics
                .entry(topic.to_string())
                .or_default()
                .subscribers
                .push(tx);
        }

        let topic = topic.to_string();
        let consumer = consumer.to_string();
        tokio::spawn(async move {
            debug!(topic = %topic, consumer = %consumer, "Consumer registered");
            while let Some(message) = rx.recv().await {
                if let Err(e) = handler(message).await {
                    error!(
                        topic = %topic,
                        consumer = %consumer,
                        error = %e,
                        "Consumer handler failed"
                    );
                }
            }
            debug!(topic = %topic, consumer = %consumer, "Consumer mailbox closed");
        });
    }

    /// Retained messages for a topic, oldest first.
    pub async fn history(&self, topic: &str) -> Vec<M> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live consumers on a topic.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|s| s.subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Mutex;

    async fn drain() {
        // Give worker tasks a chance to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn delivers_to_registered_consumer() {
        let bus: MessageBus<String> = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe("greetings", "test", move |msg: String| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(msg);
                Ok(())
            }
        })
        .await;

        let delivered = bus.publish("greetings", "hello".to_string()).await;
        assert_eq!(delivered, 1);

        drain().await;
        assert_eq!(*seen.lock().await, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn consumer_sees_messages_in_publish_order() {
        let bus: MessageBus<u32> = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe("numbers", "test", move |n: u32| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(n);
                Ok(())
            }
        })
        .await;

        for n in 0..20 {
            bus.publish("numbers", n).await;
        }

        drain().await;
        assert_eq!(*seen.lock().await, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn publish_before_subscribe_is_not_replayed() {
        let bus: MessageBus<String> = MessageBus::new();
        bus.publish("topic", "early".to_string()).await;

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe("topic", "late", move |_msg: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        bus.publish("topic", "on-time".to_string()).await;
        drain().await;

        // Only the post-subscribe message is seen; history stays queryable.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.history("topic").await.len(), 2);
    }

    #[tokio::test]
    async fn failing_handler_does_not_affect_other_consumers() {
        let bus: MessageBus<String> = MessageBus::new();

        bus.subscribe("topic", "broken", |_msg: String| async {
            Err(PipelineError::Classification("boom".into()))
        })
        .await;

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe("topic", "healthy", move |_msg: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        bus.publish("topic", "one".to_string()).await;
        bus.publish("topic", "two".to_string()).await;
        drain().await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_handler_keeps_draining_its_own_mailbox() {
        let bus: MessageBus<u32> = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe("topic", "flaky", move |n: u32| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(n);
                if n % 2 == 0 {
                    Err(PipelineError::Classification("even numbers fail".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        for n in 0..6 {
            bus.publish("topic", n).await;
        }
        drain().await;

        assert_eq!(*seen.lock().await, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus: MessageBus<String> = MessageBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        bus.subscribe("a", "only-a", move |_msg: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        bus.publish("b", "for-b".to_string()).await;
        drain().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.publish("a", "for-a".to_string()).await;
        drain().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let bus: MessageBus<usize> = MessageBus::new();
        for n in 0..(TOPIC_HISTORY_LIMIT + 10) {
            bus.publish("big", n).await;
        }
        let history = bus.history("big").await;
        assert_eq!(history.len(), TOPIC_HISTORY_LIMIT);
        // Oldest entries were evicted.
        assert_eq!(history[0], 10);
    }

    #[tokio::test]
    async fn publish_to_empty_topic_delivers_zero() {
        let bus: MessageBus<String> = MessageBus::new();
        assert_eq!(bus.publish("nobody", "msg".to_string()).await, 0);
        assert_eq!(bus.subscriber_count("nobody").await, 0);
    }
}
