//! Channel Catalog and Message Decoding
//!
//! This module turns the raw channel/schema tables of a recording into the
//! readable catalog both readers share, and decodes individual records into
//! [`MessageEvent`]s.
//!
//! ## Channel Acceptance
//!
//! A channel is readable only if its declared schema exists and its message
//! encoding is one we can decode. Anything else is skipped with an alert —
//! never a fatal error — so one exotic channel can't take down playback of
//! the rest of the recording:
//!
//! - schema declared but missing from the schema table → skip + alert
//! - message encoding we don't understand → skip + alert
//!
//! ## Encoding Dispatch
//!
//! Encodings are a closed enum with an explicit [`MessageEncoding::Unsupported`]
//! arm, so an unknown encoding string is data (skip-with-alert), not a
//! dispatch failure at decode time.
//!
//! ## Size Estimates
//!
//! Estimating the in-memory size of a decoded value walks the whole value
//! tree, which is far too expensive per message. The estimate is computed
//! once per distinct subscription shape `(topic, sorted fields)` and cached;
//! see [`decode_message`].

use std::collections::{BTreeSet, HashMap, HashSet};

use robolog_core::{Alert, MessageEvent, SchemaDefinition, Time, Topic};
use serde_json::Value;

use crate::codec::{ChannelRecord, RawRecord, SchemaRecord};

/// Well-known channel metadata key carrying the publisher identity.
pub const PUBLISHER_METADATA_KEY: &str = "publisher";

/// Message payload encodings, as a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEncoding {
    /// JSON payloads, decoded to a dynamic value
    Json,
    /// Anything else: declared so dispatch is total, never decodable
    Unsupported(String),
}

impl MessageEncoding {
    pub fn parse(encoding: &str) -> Self {
        match encoding {
            "json" => MessageEncoding::Json,
            other => MessageEncoding::Unsupported(other.to_string()),
        }
    }
}

/// A readable channel from the catalog.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: u16,
    pub topic: String,
    pub schema_name: String,
    pub encoding: MessageEncoding,
}

/// The readable view of a recording's channel and schema tables.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Accepted channels only; skipped channels are absent here
    pub channels_by_id: HashMap<u16, ChannelInfo>,

    /// Topic list, unique by name
    pub topics: Vec<Topic>,

    /// Schema registry union across channels
    pub datatypes: HashMap<String, SchemaDefinition>,

    /// Publisher identities per topic
    pub publishers_by_topic: HashMap<String, BTreeSet<String>>,

    /// Channels skipped while building the catalog
    pub alerts: Vec<Alert>,
}

/// Build the readable catalog from decoded channel/schema tables.
pub fn build_catalog(channels: &[ChannelRecord], schemas: &[SchemaRecord]) -> Catalog {
    let mut catalog = Catalog::default();

    for schema in schemas {
        // Two channels may declare the same schema name with different
        // definitions; the later one wins. Intentionally unchanged from the
        // recorder's behavior, pending confirmation that it's deliberate.
        catalog.datatypes.insert(
            schema.name.clone(),
            SchemaDefinition {
                encoding: schema.encoding.clone(),
                data: schema.definition.clone(),
            },
        );
    }

    let mut seen_topics: HashSet<String> = HashSet::new();

    for channel in channels {
        let encoding = MessageEncoding::parse(&channel.message_encoding);
        if let MessageEncoding::Unsupported(name) = &encoding {
            catalog.alerts.push(Alert::warn(format!(
                "Channel {} ({}): unsupported message encoding \"{}\"; channel skipped",
                channel.id, channel.topic, name
            )));
            continue;
        }

        // Empty schema name means a schema-less channel, which is allowed.
        if !channel.schema_name.is_empty() && !catalog.datatypes.contains_key(&channel.schema_name)
        {
            catalog.alerts.push(Alert::warn(format!(
                "Channel {} ({}): missing schema \"{}\"; channel skipped",
                channel.id, channel.topic, channel.schema_name
            )));
            continue;
        }

        let publisher = channel
            .metadata
            .get(PUBLISHER_METADATA_KEY)
            .cloned()
            .unwrap_or_else(|| channel.id.to_string());
        catalog
            .publishers_by_topic
            .entry(channel.topic.clone())
            .or_default()
            .insert(publisher);

        if seen_topics.insert(channel.topic.clone()) {
            let schema_name = if channel.schema_name.is_empty() {
                None
            } else {
                Some(channel.schema_name.clone())
            };
            catalog.topics.push(Topic::new(&channel.topic, schema_name));
        }

        catalog.channels_by_id.insert(
            channel.id,
            ChannelInfo {
                id: channel.id,
                topic: channel.topic.clone(),
                schema_name: channel.schema_name.clone(),
                encoding,
            },
        );
    }

    catalog
}

/// Cache key for per-subscription size estimates: `(topic, sorted fields)`.
pub type SizeCacheKey = (String, Option<Vec<String>>);

/// Per-subscription-shape size estimate cache.
pub type SizeCache = HashMap<SizeCacheKey, usize>;

/// Decode one raw record into a [`MessageEvent`].
///
/// `fields`, when present, must already be sorted (see
/// `SubscribePayload::normalized_fields`); the decoded object is cut down
/// to those top-level fields before the caller sees it.
///
/// The reported size is `max(raw encoded length, estimate)` without a
/// projection, or just the estimate with one — the raw length would
/// over-count a projected payload.
///
/// Errors are returned as a plain description: the caller decides whether
/// that becomes an in-band alert (iteration) or a log line (backfill).
pub fn decode_message(
    channel: &ChannelInfo,
    raw: &RawRecord,
    fields: Option<&[String]>,
    size_cache: &mut SizeCache,
) -> std::result::Result<MessageEvent, String> {
    let value = decode_payload(&channel.encoding, &raw.payload)?;

    let message = match fields {
        Some(fields) => project_fields(value, fields),
        None => value,
    };

    let key: SizeCacheKey = (channel.topic.clone(), fields.map(|f| f.to_vec()));
    let estimate = *size_cache
        .entry(key)
        .or_insert_with(|| estimate_value_size(&message));

    let size_in_bytes = if fields.is_some() {
        estimate
    } else {
        estimate.max(raw.payload.len())
    };

    Ok(MessageEvent {
        topic: channel.topic.clone(),
        receive_time: Time::from_nanos(raw.log_time),
        publish_time: Time::from_nanos(raw.publish_time),
        message,
        schema_name: channel.schema_name.clone(),
        size_in_bytes,
    })
}

fn decode_payload(encoding: &MessageEncoding, payload: &[u8]) -> std::result::Result<Value, String> {
    match encoding {
        MessageEncoding::Json => serde_json::from_slice(payload)
            .map_err(|e| format!("message is not valid JSON: {}", e)),
        MessageEncoding::Unsupported(name) => {
            Err(format!("unsupported message encoding \"{}\"", name))
        }
    }
}

/// Cut a decoded object down to the requested top-level fields.
///
/// Non-object payloads pass through unchanged; a shallow projection has
/// nothing to slice there.
fn project_fields(value: Value, fields: &[String]) -> Value {
    match value {
        Value::Object(mut map) => {
            map.retain(|key, _| fields.binary_search(key).is_ok());
            Value::Object(map)
        }
        other => other,
    }
}

/// Rough in-memory size of a decoded value.
///
/// Deliberately cheap and approximate; it feeds cache accounting, not
/// allocation decisions.
pub fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => 8,
        Value::String(s) => 24 + s.len(),
        Value::Array(items) => 24 + items.iter().map(estimate_value_size).sum::<usize>(),
        Value::Object(map) => {
            32 + map
                .iter()
                .map(|(key, item)| 24 + key.len() + estimate_value_size(item))
                .sum::<usize>()
        }
    }
}
