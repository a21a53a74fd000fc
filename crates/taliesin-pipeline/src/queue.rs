//! Per-topic FIFO task lanes.
//!
//! Responses for one topic are generated strictly one at a time; different
//! topics proceed concurrently. Each lane is an unbounded channel drained by
//! a dedicated worker task that awaits each queued task to completion before
//! taking the next.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use taliesin_types::TopicId;

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Lazily created FIFO lanes keyed by topic.
#[derive(Default)]
pub struct TopicQueues {
    lanes: Mutex<HashMap<TopicId, mpsc::UnboundedSender<Task>>>,
}

impl TopicQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task on the topic's lane, creating the lane on first use.
    pub async fn enqueue<F>(&self, topic_id: TopicId, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut lanes = self.lanes.lock().await;
        let sender = lanes.entry(topic_id).or_insert_with(|| {
            debug!(topic_id = %topic_id, "starting topic lane");
            let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
            tokio::spawn(async move {
                while let Some(task) = rx.recv().await {
                    task.await;
                }
            });
            tx
        });
        // The worker owns the receiver for the lane's lifetime, so this only
        // fails if the runtime is shutting down.
        let _ = sender.send(Box::pin(task));
    }

    /// Number of live lanes.
    pub async fn lane_count(&self) -> usize {
        self.lanes.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_topic_runs_serially_in_order() {
        let queues = TopicQueues::new();
        let topic = TopicId::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let log1 = log.clone();
        queues
            .enqueue(topic, async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                log1.lock().unwrap().push(1);
            })
            .await;
        let log2 = log.clone();
        queues
            .enqueue(topic, async move {
                log2.lock().unwrap().push(2);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_different_topics_run_concurrently() {
        let queues = TopicQueues::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let log1 = log.clone();
        queues
            .enqueue(TopicId::new(), async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                log1.lock().unwrap().push("slow");
            })
            .await;
        let log2 = log.clone();
        queues
            .enqueue(TopicId::new(), async move {
                log2.lock().unwrap().push("fast");
            })
            .await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        // The fast lane finished while the slow lane was still sleeping.
        assert_eq!(*log.lock().unwrap(), vec!["fast", "slow"]);
        assert_eq!(queues.lane_count().await, 2);
    }

    #[tokio::test]
    async fn test_lane_reused_across_enqueues() {
        let queues = TopicQueues::new();
        let topic = TopicId::new();
        for _ in 0..5 {
            queues.enqueue(topic, async {}).await;
        }
        assert_eq!(queues.lane_count().await, 1);
    }
}
