//! Messages, Topics, and Subscriptions
//!
//! This module defines the data that flows between a recording source and
//! its consumers:
//!
//! - [`Topic`] / [`MessageEvent`]: what a source produces
//! - [`SubscribePayload`]: what a consumer requests
//! - [`Initialization`]: the one-time catalog a source returns when opened
//! - [`IteratorItem`]: the tagged union yielded by message iterators, so a
//!   recoverable problem (bad message, unknown channel) travels in-band as
//!   an [`Alert`] instead of terminating playback
//!
//! `MessageEvent` is immutable once produced. Its `size_in_bytes` is a
//! best-effort in-memory estimate used for cache accounting, not the wire
//! size.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::time::Time;

/// A named stream of messages within a recording.
///
/// Unique by `name` within one [`Initialization`]. `aliased_from_name` is
/// present only on entries generated by the topic-aliasing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Topic name, e.g. `/imu`
    pub name: String,

    /// Name of the schema describing this topic's messages, if declared
    pub schema_name: Option<String>,

    /// Original topic name when this entry is an alias
    pub aliased_from_name: Option<String>,
}

impl Topic {
    pub fn new(name: impl Into<String>, schema_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            schema_name,
            aliased_from_name: None,
        }
    }
}

/// A single decoded message from a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Topic this message was received on
    pub topic: String,

    /// Time the message was recorded
    pub receive_time: Time,

    /// Time the message was published by its producer
    pub publish_time: Time,

    /// Decoded payload
    pub message: serde_json::Value,

    /// Schema name of the channel that produced this message
    pub schema_name: String,

    /// Best-effort estimate of in-memory size
    pub size_in_bytes: usize,
}

/// How much of the timeline a subscription wants preloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadType {
    /// Preload the whole timeline for this topic (plots, scrubbing)
    Full,
    /// Only the current playback window
    #[default]
    Partial,
}

/// A consumer's request for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscribePayload {
    /// Topic to subscribe to
    pub topic: String,

    /// Optional projection: keep only these top-level fields of the payload
    pub fields: Option<Vec<String>>,

    /// Preload behavior
    #[serde(default)]
    pub preload_type: PreloadType,
}

impl SubscribePayload {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            fields: None,
            preload_type: PreloadType::default(),
        }
    }

    pub fn with_fields(topic: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            fields: Some(fields),
            preload_type: PreloadType::default(),
        }
    }

    /// Sorted, de-duplicated projection fields.
    ///
    /// Subscription identity for caching purposes is `(topic, sorted
    /// fields)`, so two subscriptions differing only in field order share
    /// one cache entry.
    pub fn normalized_fields(&self) -> Option<Vec<String>> {
        self.fields.as_ref().map(|fields| {
            let mut sorted: Vec<String> = fields.clone();
            sorted.sort();
            sorted.dedup();
            sorted
        })
    }
}

/// Severity of a player alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Error,
    Warn,
    Info,
}

/// A recoverable problem surfaced to the user without stopping playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Human-readable description
    pub message: String,

    /// Severity shown in the UI
    pub severity: AlertSeverity,

    /// Underlying error detail, if any
    pub error: Option<String>,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: AlertSeverity::Error,
            error: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: AlertSeverity::Warn,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A schema definition from the recording's datatype registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    /// Schema encoding, e.g. `jsonschema`
    pub encoding: String,

    /// Raw schema definition bytes
    pub data: Bytes,
}

/// Per-topic message statistics from the recording's statistics section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopicStats {
    /// Total number of messages on this topic
    pub num_messages: u64,
}

/// The one-time catalog produced when a source is opened.
///
/// Immutable after creation; it is the authoritative topic/schema/time-range
/// catalog for the whole session.
#[derive(Debug, Clone, Default)]
pub struct Initialization {
    /// Earliest message time in the recording
    pub start: Time,

    /// Latest message time in the recording
    pub end: Time,

    /// All readable topics
    pub topics: Vec<Topic>,

    /// Schema registry: schema name -> definition
    pub datatypes: HashMap<String, SchemaDefinition>,

    /// Recording profile string
    pub profile: Option<String>,

    /// Problems encountered while opening (skipped channels etc.)
    pub alerts: Vec<Alert>,

    /// Recording-level metadata
    pub metadata: BTreeMap<String, String>,

    /// Publisher identities per topic
    pub publishers_by_topic: HashMap<String, BTreeSet<String>>,

    /// Message statistics per topic, when the recording carries them
    pub topic_stats: HashMap<String, TopicStats>,
}

/// Direction of a message iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    /// Newest-first; used by backfill to find state at a seek point
    Reverse,
}

/// Arguments for opening a message iterator.
#[derive(Debug, Clone, Default)]
pub struct ReadArgs {
    /// Topics to read; an empty list yields nothing
    pub topics: Vec<SubscribePayload>,

    /// Start of the time range; defaults to the recording start
    pub start: Option<Time>,

    /// End of the time range (inclusive); defaults to the recording end
    pub end: Option<Time>,

    /// Iteration direction
    pub direction: Direction,
}

impl ReadArgs {
    pub fn for_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(SubscribePayload::new).collect(),
            ..Default::default()
        }
    }
}

/// One item from a message iterator.
///
/// Recoverable problems travel in-band as alerts so the stream keeps
/// flowing; see the error taxonomy in `robolog-core::error`.
#[derive(Debug, Clone)]
pub enum IteratorItem {
    /// A successfully decoded message
    Message(MessageEvent),

    /// A recoverable problem tied to one channel
    Alert {
        /// Channel id the problem belongs to
        connection_id: u16,
        alert: Alert,
    },
}

impl IteratorItem {
    pub fn is_alert(&self) -> bool {
        matches!(self, IteratorItem::Alert { .. })
    }

    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            IteratorItem::Message(event) => Some(event),
            IteratorItem::Alert { .. } => None,
        }
    }

    pub fn into_message(self) -> Option<MessageEvent> {
        match self {
            IteratorItem::Message(event) => Some(event),
            IteratorItem::Alert { .. } => None,
        }
    }
}
