//! Player State
//!
//! The frame-by-frame snapshot a player hands to its consumers: the
//! current frame's messages, the topic catalog, endpoint maps, and the
//! background preload progress.
//!
//! ## Revision Counters
//!
//! Downstream layers (the aliasing processor in particular) memoize work
//! per slice of this state and must know when a slice actually changed.
//! Pointer identity is fragile for that, so every mutable slice carries an
//! explicit revision counter: the player bumps `messages_revision` when it
//! publishes a new frame, `topics_revision` when the topic list changes,
//! and so on. Equal revision ⇒ identical content ⇒ memoized output is
//! returned as the same `Arc`.
//!
//! Blocks carry their own generation ids (see `blocks::BlockId`) because
//! they are invalidated per slot, not as a whole.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use robolog_core::{Alert, MessageEvent, Time, Topic};

use crate::blocks::MessageBlock;

/// Topic name -> endpoint identities (publishers or subscribers).
pub type TopicEndpointMap = HashMap<String, BTreeSet<String>>;

/// Data present while a source is active (initialized and playing).
#[derive(Debug, Clone, Default)]
pub struct ActiveData {
    /// Messages of the current frame
    pub messages: Arc<Vec<MessageEvent>>,
    /// Bumped whenever `messages` is replaced
    pub messages_revision: u64,

    /// Topic catalog
    pub topics: Arc<Vec<Topic>>,
    /// Bumped whenever `topics` is replaced
    pub topics_revision: u64,

    /// Publishers per topic, when known
    pub published_topics: Option<Arc<TopicEndpointMap>>,
    /// Bumped whenever `published_topics` is replaced
    pub published_topics_revision: u64,

    /// Subscribers per topic, when known
    pub subscribed_topics: Option<Arc<TopicEndpointMap>>,
    /// Bumped whenever `subscribed_topics` is replaced
    pub subscribed_topics_revision: u64,

    /// Current playback position
    pub current_time: Time,
    pub start_time: Time,
    pub end_time: Time,
}

/// Background preload progress.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    /// Preloaded blocks; `None` slots are not yet loaded.
    ///
    /// Filled in place by the preloading scheduler, never shrunk.
    pub blocks: Option<Arc<Vec<Option<MessageBlock>>>>,
}

/// One frame of player output.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    /// Present once the source is initialized
    pub active: Option<ActiveData>,

    /// Preload progress
    pub progress: Progress,

    /// Player-level alerts for this frame
    pub alerts: Vec<Alert>,
}
