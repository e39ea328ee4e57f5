//! Core data model for robolog
//!
//! This crate defines the types shared by every layer of the playback
//! engine: timestamps, topics, message events, subscriptions, the
//! `Initialization` catalog a source produces when it opens, and the
//! tagged items a message iterator yields.
//!
//! Nothing here touches the wire format or any I/O. Readers live in
//! `robolog-format`; playback-side primitives live in `robolog-player`.

pub mod error;
pub mod message;
pub mod time;
pub mod varint;

pub use error::{Error, Result};
pub use message::{
    Alert, AlertSeverity, Direction, Initialization, IteratorItem, MessageEvent, PreloadType,
    ReadArgs, SchemaDefinition, SubscribePayload, Topic, TopicStats,
};
pub use time::Time;
