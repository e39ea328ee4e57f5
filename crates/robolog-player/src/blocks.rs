//! Preload Blocks and the Block Topic Cursor
//!
//! Timeline scrubbing needs the recording pre-decoded into blocks ahead of
//! the playhead. An external scheduler fills a `Vec<Option<MessageBlock>>`
//! incrementally — slots start as `None` and get filled, blocks are never
//! shrunk — while consumers drain it through [`BlockTopicCursor`] without
//! ever re-scanning what they already saw.
//!
//! ## Cursor Guarantees
//!
//! For one topic, `next` delivers each block's messages **exactly once, in
//! order, with no gaps**, however fast or slow preloading runs:
//!
//! - index past the known array → `None`, no advance (nothing new yet)
//! - slot empty or topic not loaded in it → `None`, no advance (still
//!   loading — skipping ahead would drop data)
//! - loaded slice → returned, index advances
//!
//! ## Reset Detection
//!
//! The block set can be rebuilt out from under a cursor (subscription
//! dropped and re-added, seek invalidation). Identity is tracked with
//! explicit [`BlockId`] generation counters, not pointers: when the id at
//! index 0 or at the last-consumed index changes, the cursor restarts from
//! block 0 on its next call. Callers may ask [`BlockTopicCursor::next_will_reset`]
//! first when they need to throw away downstream state accumulated from
//! the old enumeration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use robolog_core::{MessageEvent, SubscribePayload};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique generation id for one loaded block.
///
/// Fresh on every (re)computation of a block, so equal ids mean "the same
/// load" and a changed id means the slot was rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u64);

impl BlockId {
    pub fn next() -> Self {
        Self(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One preloaded unit of the timeline.
#[derive(Debug, Clone)]
pub struct MessageBlock {
    /// Generation id of this load
    pub id: BlockId,

    /// Preloaded messages per topic; a missing topic is still loading
    pub messages_by_topic: HashMap<String, Arc<Vec<MessageEvent>>>,

    /// Subscriptions this block still needs loaded
    pub need_topics: Vec<SubscribePayload>,

    /// Estimated memory held by this block
    pub size_in_bytes: usize,
}

impl MessageBlock {
    pub fn new() -> Self {
        Self {
            id: BlockId::next(),
            messages_by_topic: HashMap::new(),
            need_topics: Vec::new(),
            size_in_bytes: 0,
        }
    }

    /// Store a loaded topic slice and account its size.
    pub fn insert_topic(&mut self, topic: impl Into<String>, messages: Vec<MessageEvent>) {
        self.size_in_bytes += messages.iter().map(|m| m.size_in_bytes).sum::<usize>();
        self.messages_by_topic
            .insert(topic.into(), Arc::new(messages));
    }
}

impl Default for MessageBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental, non-blocking drain of one topic across the block array.
pub struct BlockTopicCursor {
    topic: String,
    next_index: usize,
    /// Ids of block 0 and the last-consumed block, observed at the last
    /// successful `next`. `None` until something was consumed.
    observed: Option<(BlockId, BlockId)>,
}

impl BlockTopicCursor {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            next_index: 0,
            observed: None,
        }
    }

    /// True when the block set was rebuilt since the last consume and the
    /// next `next` call will restart enumeration from block 0.
    pub fn next_will_reset(&self, blocks: &[Option<MessageBlock>]) -> bool {
        let Some((first_id, last_id)) = self.observed else {
            return false;
        };

        let current_first = blocks.first().and_then(|slot| slot.as_ref()).map(|b| b.id);
        if current_first != Some(first_id) {
            return true;
        }

        // next_index is at least 1 whenever `observed` is set
        let last_index = self.next_index - 1;
        let current_last = blocks
            .get(last_index)
            .and_then(|slot| slot.as_ref())
            .map(|b| b.id);
        current_last != Some(last_id)
    }

    /// Return the next loaded slice for this topic, or `None` when nothing
    /// new is available yet.
    ///
    /// Never skips: an unloaded slot blocks the cursor until the scheduler
    /// fills it. A detected reset silently restarts at block 0.
    pub fn next(&mut self, blocks: &[Option<MessageBlock>]) -> Option<Arc<Vec<MessageEvent>>> {
        if self.next_will_reset(blocks) {
            tracing::debug!(topic = %self.topic, "Block set rebuilt, cursor restarting");
            self.next_index = 0;
            self.observed = None;
        }

        let block = blocks.get(self.next_index)?.as_ref()?;
        let messages = block.messages_by_topic.get(&self.topic)?;

        let first_id = blocks.first().and_then(|slot| slot.as_ref()).map(|b| b.id)?;
        self.observed = Some((first_id, block.id));
        self.next_index += 1;
        Some(messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robolog_core::Time;

    fn event(topic: &str, nanos: u64) -> MessageEvent {
        MessageEvent {
            topic: topic.to_string(),
            receive_time: Time::from_nanos(nanos),
            publish_time: Time::from_nanos(nanos),
            message: serde_json::json!({"t": nanos}),
            schema_name: String::new(),
            size_in_bytes: 8,
        }
    }

    fn loaded_block(topic: &str, nanos: u64) -> MessageBlock {
        let mut block = MessageBlock::new();
        block.insert_topic(topic, vec![event(topic, nanos)]);
        block
    }

    #[test]
    fn test_drains_progressively_filled_blocks_exactly_once() {
        let mut cursor = BlockTopicCursor::new("/imu");

        // Nothing known yet
        assert!(cursor.next(&[]).is_none());

        // One loaded block
        let mut blocks = vec![Some(loaded_block("/imu", 1))];
        let first = cursor.next(&blocks).unwrap();
        assert_eq!(first[0].receive_time, Time::from_nanos(1));

        // No new data: None, repeatedly, without advancing
        assert!(cursor.next(&blocks).is_none());
        assert!(cursor.next(&blocks).is_none());

        // Scheduler appends a block
        blocks.push(Some(loaded_block("/imu", 2)));
        let second = cursor.next(&blocks).unwrap();
        assert_eq!(second[0].receive_time, Time::from_nanos(2));
        assert!(cursor.next(&blocks).is_none());
    }

    #[test]
    fn test_waits_on_unloaded_slot_without_skipping() {
        let mut cursor = BlockTopicCursor::new("/imu");
        let mut blocks = vec![Some(loaded_block("/imu", 1)), None, Some(loaded_block("/imu", 3))];

        cursor.next(&blocks).unwrap();
        // Slot 1 is still loading; slot 2 must not be delivered early
        assert!(cursor.next(&blocks).is_none());

        blocks[1] = Some(loaded_block("/imu", 2));
        assert_eq!(
            cursor.next(&blocks).unwrap()[0].receive_time,
            Time::from_nanos(2)
        );
        assert_eq!(
            cursor.next(&blocks).unwrap()[0].receive_time,
            Time::from_nanos(3)
        );
    }

    #[test]
    fn test_waits_when_topic_not_yet_loaded_in_block() {
        let mut cursor = BlockTopicCursor::new("/imu");
        let mut other = MessageBlock::new();
        other.insert_topic("/scan", vec![event("/scan", 5)]);
        let mut blocks = vec![Some(other)];

        // Block exists but this topic's slice is still loading
        assert!(cursor.next(&blocks).is_none());

        let block = blocks[0].as_mut().unwrap();
        block.insert_topic("/imu", vec![event("/imu", 5)]);
        assert!(cursor.next(&blocks).is_some());
    }

    #[test]
    fn test_reset_restarts_from_block_zero() {
        let mut cursor = BlockTopicCursor::new("/imu");
        let blocks = vec![Some(loaded_block("/imu", 1)), Some(loaded_block("/imu", 2))];

        cursor.next(&blocks).unwrap();
        cursor.next(&blocks).unwrap();
        assert!(!cursor.next_will_reset(&blocks));

        // Subscription dropped and re-added: fresh block set, fresh ids
        let rebuilt = vec![Some(loaded_block("/imu", 10)), Some(loaded_block("/imu", 20))];
        assert!(cursor.next_will_reset(&rebuilt));

        let first = cursor.next(&rebuilt).unwrap();
        assert_eq!(first[0].receive_time, Time::from_nanos(10));
    }

    #[test]
    fn test_reset_detected_by_last_consumed_slot_change() {
        let mut cursor = BlockTopicCursor::new("/imu");
        let mut blocks = vec![Some(loaded_block("/imu", 1)), Some(loaded_block("/imu", 2))];

        cursor.next(&blocks).unwrap();
        cursor.next(&blocks).unwrap();

        // Block 0 unchanged, but the last-consumed slot was reloaded
        blocks[1] = Some(loaded_block("/imu", 99));
        assert!(cursor.next_will_reset(&blocks));
        let first = cursor.next(&blocks).unwrap();
        assert_eq!(first[0].receive_time, Time::from_nanos(1));
    }

    #[test]
    fn test_never_returns_same_block_twice_for_unchanged_array() {
        let mut cursor = BlockTopicCursor::new("/imu");
        let blocks = vec![
            Some(loaded_block("/imu", 1)),
            Some(loaded_block("/imu", 2)),
            Some(loaded_block("/imu", 3)),
        ];

        let mut seen = Vec::new();
        while let Some(messages) = cursor.next(&blocks) {
            seen.push(messages[0].receive_time);
        }
        assert_eq!(
            seen,
            vec![Time::from_nanos(1), Time::from_nanos(2), Time::from_nanos(3)]
        );
        assert!(cursor.next(&blocks).is_none());
    }

    #[test]
    fn test_fresh_cursor_never_signals_reset() {
        let cursor = BlockTopicCursor::new("/imu");
        assert!(!cursor.next_will_reset(&[]));
        assert!(!cursor.next_will_reset(&[Some(loaded_block("/imu", 1))]));
    }
}
