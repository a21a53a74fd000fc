//! Write coalescing for high-frequency block updates.
//!
//! The generation collaborator emits token-granularity updates at an
//! unbounded rate; every persisted write has a cost. Each block id owns an
//! independent trailing-edge throttle: within one window only the most recent
//! patch survives, and exactly one write happens when the window closes.
//! Terminal updates bypass the window entirely; pending coalesced work is
//! invalidated first so a stale write can never land after the terminal
//! state.
//!
//! Throttle entries live in an [`UpdateCache`] bounded by count and idle TTL;
//! eviction invalidates the entry's armed timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use taliesin_cache::{CacheConfig, EvictionHandler, UpdateCache};
use taliesin_store::{BlockPatch, ConversationStore, ViewEvent, ViewPublisher};
use taliesin_types::BlockId;

use crate::error::Result;

/// Default coalescing window.
pub const DEFAULT_WRITE_WINDOW: Duration = Duration::from_millis(150);

struct ThrottleEntry {
    block_id: BlockId,
    pending: Mutex<Option<BlockPatch>>,
    /// Bumped to invalidate an armed timer (flush, cancel, eviction).
    generation: AtomicU64,
    armed: AtomicBool,
}

impl ThrottleEntry {
    fn new(block_id: BlockId) -> Self {
        Self {
            block_id,
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
            armed: AtomicBool::new(false),
        }
    }

    /// Invalidate any armed timer and drop the pending patch.
    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.armed.store(false, Ordering::SeqCst);
        self.pending.lock().take();
    }
}

struct CancelOnEvict;

impl EvictionHandler<Arc<ThrottleEntry>> for CancelOnEvict {
    fn on_evict(&self, _key: &str, entry: &Arc<ThrottleEntry>) {
        entry.invalidate();
    }
}

/// Per-block trailing-edge write throttler.
///
/// UI-facing commits and store writes are decoupled: when a window closes the
/// latest patch is published to the view feed and then persisted, each on its
/// own channel.
#[derive(Clone)]
pub struct WriteThrottler {
    entries: UpdateCache<Arc<ThrottleEntry>>,
    store: Arc<dyn ConversationStore>,
    view: ViewPublisher,
    window: Duration,
}

impl WriteThrottler {
    /// Create a throttler over the given store and view feed.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        view: ViewPublisher,
        cache_config: CacheConfig,
        window: Duration,
    ) -> Self {
        Self {
            entries: UpdateCache::with_eviction_handler(cache_config, CancelOnEvict),
            store,
            view,
            window,
        }
    }

    /// Schedule a coalesced write: the patch replaces any pending one for
    /// this block, and a window timer is armed if none is running.
    pub async fn schedule(&self, block_id: BlockId, patch: BlockPatch) {
        let key = block_id.to_string();
        let entry = self
            .entries
            .get_or_insert_with(&key, || Arc::new(ThrottleEntry::new(block_id)))
            .await;

        *entry.pending.lock() = Some(patch);

        if !entry.armed.swap(true, Ordering::SeqCst) {
            let generation = entry.generation.load(Ordering::SeqCst);
            let store = Arc::clone(&self.store);
            let view = self.view.clone();
            let window = self.window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                if entry.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                let patch = entry.pending.lock().take();
                entry.armed.store(false, Ordering::SeqCst);
                if let Some(patch) = patch {
                    view.publish(ViewEvent::BlockUpdated {
                        id: entry.block_id,
                        patch: patch.clone(),
                    });
                    if let Err(e) = store.update_block(entry.block_id, &patch).await {
                        warn!(block_id = %entry.block_id, error = %e, "coalesced write failed");
                    }
                }
            });
        }
    }

    /// Commit a terminal patch synchronously, invalidating any pending
    /// coalesced write first.
    pub async fn flush(&self, block_id: BlockId, patch: BlockPatch) -> Result<()> {
        let key = block_id.to_string();
        if let Some(entry) = self.entries.remove(&key).await {
            entry.invalidate();
        }
        self.view.publish(ViewEvent::BlockUpdated {
            id: block_id,
            patch: patch.clone(),
        });
        self.store.update_block(block_id, &patch).await?;
        Ok(())
    }

    /// Drop any pending write for this block without persisting it.
    pub async fn cancel(&self, block_id: BlockId) {
        let key = block_id.to_string();
        if let Some(entry) = self.entries.remove(&key).await {
            entry.invalidate();
        }
    }

    /// Cancel pending writes for many blocks (message reset / deletion).
    pub async fn cancel_many(&self, block_ids: &[BlockId]) {
        for id in block_ids {
            self.cancel(*id).await;
        }
    }

    /// Number of live throttle entries.
    pub async fn entry_count(&self) -> usize {
        self.entries.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taliesin_store::MemoryStore;
    use taliesin_types::{BlockPayload, BlockStatus, Message, MessageBlock, TopicId};

    fn throttler(store: Arc<MemoryStore>, window_ms: u64) -> WriteThrottler {
        WriteThrottler::new(
            store,
            ViewPublisher::default(),
            CacheConfig::new().without_ttl(),
            Duration::from_millis(window_ms),
        )
    }

    async fn seeded_block(store: &MemoryStore) -> MessageBlock {
        let message = Message::user(TopicId::new());
        let block = MessageBlock::new(
            message.id,
            BlockPayload::MainText {
                content: String::new(),
            },
            BlockStatus::Streaming,
        );
        store.upsert_blocks(std::slice::from_ref(&block)).await.unwrap();
        block
    }

    #[tokio::test]
    async fn test_burst_coalesces_to_one_write_with_last_content() {
        let store = Arc::new(MemoryStore::new());
        let throttler = throttler(store.clone(), 30);
        let block = seeded_block(&store).await;
        let writes_before = store.block_write_count(block.id);

        for i in 1..=20 {
            throttler
                .schedule(block.id, BlockPatch::streaming_content("x".repeat(i)))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.block_write_count(block.id) - writes_before, 1);
        let loaded = store.get_block(block.id).await.unwrap().unwrap();
        assert!(matches!(
            loaded.payload,
            BlockPayload::MainText { content } if content == "x".repeat(20)
        ));
    }

    #[tokio::test]
    async fn test_flush_beats_pending_window() {
        let store = Arc::new(MemoryStore::new());
        let throttler = throttler(store.clone(), 40);
        let block = seeded_block(&store).await;
        let writes_before = store.block_write_count(block.id);

        throttler
            .schedule(block.id, BlockPatch::streaming_content("stale"))
            .await;
        throttler
            .flush(
                block.id,
                BlockPatch::default()
                    .with_content("final")
                    .with_status(BlockStatus::Success),
            )
            .await
            .unwrap();

        // Let the armed window elapse; the stale write must not fire.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.block_write_count(block.id) - writes_before, 1);
        let loaded = store.get_block(block.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, BlockStatus::Success);
        assert!(matches!(
            loaded.payload,
            BlockPayload::MainText { content } if content == "final"
        ));
    }

    #[tokio::test]
    async fn test_cancel_drops_pending_write() {
        let store = Arc::new(MemoryStore::new());
        let throttler = throttler(store.clone(), 30);
        let block = seeded_block(&store).await;
        let writes_before = store.block_write_count(block.id);

        throttler
            .schedule(block.id, BlockPatch::streaming_content("doomed"))
            .await;
        throttler.cancel(block.id).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.block_write_count(block.id), writes_before);
        assert_eq!(throttler.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_separate_blocks_do_not_contend() {
        let store = Arc::new(MemoryStore::new());
        let throttler = throttler(store.clone(), 30);
        let a = seeded_block(&store).await;
        let b = seeded_block(&store).await;

        throttler
            .schedule(a.id, BlockPatch::streaming_content("a"))
            .await;
        throttler
            .schedule(b.id, BlockPatch::streaming_content("b"))
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        let loaded_a = store.get_block(a.id).await.unwrap().unwrap();
        let loaded_b = store.get_block(b.id).await.unwrap().unwrap();
        assert!(matches!(loaded_a.payload, BlockPayload::MainText { content } if content == "a"));
        assert!(matches!(loaded_b.payload, BlockPayload::MainText { content } if content == "b"));
    }

    #[tokio::test]
    async fn test_view_sees_coalesced_update() {
        let store = Arc::new(MemoryStore::new());
        let view = ViewPublisher::default();
        let throttler = WriteThrottler::new(
            store.clone(),
            view.clone(),
            CacheConfig::new().without_ttl(),
            Duration::from_millis(20),
        );
        let block = seeded_block(&store).await;
        let mut rx = view.subscribe();

        throttler
            .schedule(block.id, BlockPatch::streaming_content("seen"))
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        match rx.try_recv().unwrap() {
            ViewEvent::BlockUpdated { id, patch } => {
                assert_eq!(id, block.id);
                assert_eq!(patch.content.as_deref(), Some("seen"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_window_opens_after_fire() {
        let store = Arc::new(MemoryStore::new());
        let throttler = throttler(store.clone(), 20);
        let block = seeded_block(&store).await;
        let writes_before = store.block_write_count(block.id);

        throttler
            .schedule(block.id, BlockPatch::streaming_content("first"))
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        throttler
            .schedule(block.id, BlockPatch::streaming_content("second"))
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.block_write_count(block.id) - writes_before, 2);
        let loaded = store.get_block(block.id).await.unwrap().unwrap();
        assert!(matches!(
            loaded.payload,
            BlockPayload::MainText { content } if content == "second"
        ));
    }
}
