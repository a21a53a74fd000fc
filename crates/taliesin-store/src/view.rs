//! Reactive view feed for the presentation layer.

use tokio::sync::broadcast;
use tracing::trace;

use taliesin_types::{BlockId, Message, MessageBlock, MessageId, TopicId};

use crate::patch::BlockPatch;

/// A discrete mutation to the presentation layer's normalized view.
#[derive(Debug, Clone)]
pub enum ViewEvent {
    MessageUpserted(Message),
    BlockUpserted(MessageBlock),
    BlockUpdated { id: BlockId, patch: BlockPatch },
    BlocksRemoved(Vec<BlockId>),
    MessageRemoved(MessageId),
    TopicCleared(TopicId),
}

/// Broadcast feed of [`ViewEvent`] mutations.
///
/// UI-facing state commits flow through this feed on their own cadence,
/// independent of how often the store is written. Publishing with no
/// subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct ViewPublisher {
    tx: broadcast::Sender<ViewEvent>,
}

impl ViewPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the mutation feed.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }

    /// Publish a mutation. Lagging or absent subscribers never block the
    /// pipeline.
    pub fn publish(&self, event: ViewEvent) {
        trace!(?event, "view mutation");
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ViewPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
