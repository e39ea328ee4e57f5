//! robolog Playback Primitives
//!
//! The pieces a visualizer builds on top of a recording source:
//!
//! - [`state`]: the frame-by-frame [`PlayerState`](state::PlayerState)
//!   snapshot with explicit revision counters for memoization
//! - [`blocks`]: the preload block cache types and
//!   [`BlockTopicCursor`](blocks::BlockTopicCursor), an incremental drain
//!   that delivers each block's per-topic messages exactly once
//! - [`alias`]: the topic-aliasing decorator — alias map application in
//!   player output, subscription back-mapping, conflict rejection, and
//!   reference-stable memoization
//! - [`sync`]: the timestamp-aligned multi-stream buffer behind
//!   synchronized multi-sensor snapshots
//!
//! Everything here is single-owner, synchronous state: one logical control
//! flow drives each instance in frame order. Message I/O lives in
//! `robolog-format`.

pub mod alias;
pub mod blocks;
pub mod state;
pub mod sync;

pub use alias::{AliasFunction, AliasResolver, AliasingStateProcessor, TopicAlias, TopicAliasMap};
pub use blocks::{BlockId, BlockTopicCursor, MessageBlock};
pub use state::{ActiveData, PlayerState, Progress, TopicEndpointMap};
pub use sync::{SyncBuffer, SyncResult};
