//! Unindexed Reader - Sequential Fallback
//!
//! When a recording's footer or chunk index is unusable (truncated upload,
//! crashed recorder, corrupt summary), the data chunks themselves are often
//! still intact. This reader ignores the summary entirely and makes one
//! forward pass over the whole byte stream, keeping every record in memory.
//!
//! That makes it strictly a small-file path:
//!
//! - no random access, no chunk-level time estimates ahead of the full parse
//! - the global time range comes from scanning every record
//! - memory is proportional to the recording size
//!
//! The facade enforces a size ceiling before choosing this reader (see
//! `ReadConfig::max_unindexed_bytes`). The iterator and backfill contracts
//! are identical to the indexed reader's, including the recoverable-error
//! taxonomy, so consumers cannot tell which reader they got.
//!
//! Chunk walking stops at the first position that doesn't open with the
//! chunk magic — that's the index section (or the corruption that made us
//! fall back in the first place).

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use robolog_core::{
    Alert, Direction, Initialization, IteratorItem, MessageEvent, ReadArgs, SubscribePayload,
    Time, TopicStats,
};
use tokio::sync::Mutex;

use crate::catalog::{self, Catalog, SizeCache};
use crate::codec::{self, RawRecord, CHUNK_HEADER_SIZE, CHUNK_MAGIC, HEADER_SIZE};
use crate::error::Result;

/// Sequential whole-file reader used when the chunk index is unusable.
pub struct UnindexedReader {
    catalog: Catalog,
    /// Every record in the recording, sorted by log time
    records: Vec<RawRecord>,
    channel_ids_by_topic: HashMap<String, Vec<u16>>,
    init: Initialization,
    size_cache: Mutex<SizeCache>,
}

impl UnindexedReader {
    /// Parse the entire recording in one forward pass.
    pub fn new(data: Bytes) -> Result<Self> {
        let header = codec::decode_header(&data)?;

        if header.data_position < HEADER_SIZE as u64 || header.data_position > data.len() as u64 {
            return Err(robolog_core::Error::InvalidRecording(
                "data position out of bounds".to_string(),
            )
            .into());
        }

        let mut tables_cursor = &data[HEADER_SIZE..header.data_position as usize];
        let profile = codec::decode_string(&mut tables_cursor)?;
        let mut channels = Vec::with_capacity(header.channel_count as usize);
        for _ in 0..header.channel_count {
            channels.push(codec::decode_channel(&mut tables_cursor)?);
        }
        let mut schemas = Vec::with_capacity(header.schema_count as usize);
        for _ in 0..header.schema_count {
            schemas.push(codec::decode_schema(&mut tables_cursor)?);
        }

        let catalog = catalog::build_catalog(&channels, &schemas);

        // Walk chunks until the bytes stop looking like chunks; the footer
        // and index are never consulted.
        let mut records: Vec<RawRecord> = Vec::new();
        let mut pos = header.data_position as usize;
        while pos + CHUNK_HEADER_SIZE <= data.len() && data[pos..pos + 4] == CHUNK_MAGIC {
            let chunk_header = codec::decode_chunk_header(&data[pos..])?;
            let payload_start = pos + CHUNK_HEADER_SIZE;
            let payload_end = payload_start + chunk_header.compressed_size as usize;
            if payload_end > data.len() {
                return Err(robolog_core::Error::InvalidRecording(
                    "chunk extends past end of recording".to_string(),
                )
                .into());
            }

            let payload =
                codec::open_chunk_payload(&chunk_header, &data[payload_start..payload_end])?;
            records.extend(codec::decode_chunk_records(&payload, chunk_header.start_time)?);
            pos = payload_end;
        }

        records.sort_by_key(|record| record.log_time);

        let mut channel_ids_by_topic: HashMap<String, Vec<u16>> = HashMap::new();
        for channel in catalog.channels_by_id.values() {
            channel_ids_by_topic
                .entry(channel.topic.clone())
                .or_default()
                .push(channel.id);
        }

        // Stats are exact here: the full parse already visited everything.
        let mut topic_stats: HashMap<String, TopicStats> = HashMap::new();
        for record in &records {
            if let Some(channel) = catalog.channels_by_id.get(&record.channel_id) {
                topic_stats
                    .entry(channel.topic.clone())
                    .or_default()
                    .num_messages += 1;
            }
        }

        let start = records.first().map(|record| record.log_time);
        let end = records.last().map(|record| record.log_time);

        let init = Initialization {
            start: start.map(Time::from_nanos).unwrap_or(Time::ZERO),
            end: end.map(Time::from_nanos).unwrap_or(Time::ZERO),
            topics: catalog.topics.clone(),
            datatypes: catalog.datatypes.clone(),
            profile: if profile.is_empty() {
                None
            } else {
                Some(profile)
            },
            alerts: catalog.alerts.clone(),
            metadata: Default::default(),
            publishers_by_topic: catalog.publishers_by_topic.clone(),
            topic_stats,
        };

        tracing::debug!(
            records = records.len(),
            channels = catalog.channels_by_id.len(),
            "Opened recording without an index"
        );

        Ok(Self {
            catalog,
            records,
            channel_ids_by_topic,
            init,
            size_cache: Mutex::new(SizeCache::new()),
        })
    }

    pub fn initialize(&self) -> Initialization {
        self.init.clone()
    }

    pub fn start(&self) -> Option<Time> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.init.start)
        }
    }

    fn end(&self) -> Option<Time> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.init.end)
        }
    }

    /// Open a pull-based cursor with the same contract as the indexed one.
    pub fn message_cursor(&self, args: ReadArgs) -> UnindexedCursor<'_> {
        let fields_by_topic: HashMap<String, Option<Vec<String>>> = args
            .topics
            .iter()
            .map(|sub| (sub.topic.clone(), sub.normalized_fields()))
            .collect();

        let range = match (
            args.start.or(self.start()),
            args.end.or(self.end()),
            fields_by_topic.is_empty(),
        ) {
            (Some(start), Some(end), false) => Some((start.to_nanos(), end.to_nanos())),
            _ => None,
        };

        let remaining = if range.is_some() { self.records.len() } else { 0 };

        UnindexedCursor {
            reader: self,
            fields_by_topic,
            range,
            direction: args.direction,
            visited: 0,
            remaining,
            alerted_channels: HashSet::new(),
        }
    }

    /// Backfill with the same per-topic reverse-scan semantics as the
    /// indexed reader; here the "scan" is over the in-memory record list.
    pub async fn backfill_messages(
        &self,
        subscriptions: &[SubscribePayload],
        time: Time,
    ) -> Result<Vec<MessageEvent>> {
        let time_ns = time.to_nanos();
        let mut results = Vec::new();

        for sub in subscriptions {
            let Some(channel_ids) = self.channel_ids_by_topic.get(&sub.topic) else {
                continue;
            };
            let fields = sub.normalized_fields();

            let newest = self
                .records
                .iter()
                .rev()
                .find(|record| {
                    record.log_time <= time_ns && channel_ids.contains(&record.channel_id)
                });
            let Some(record) = newest else {
                continue;
            };
            let Some(channel) = self.catalog.channels_by_id.get(&record.channel_id) else {
                continue;
            };

            let mut cache = self.size_cache.lock().await;
            match catalog::decode_message(channel, record, fields.as_deref(), &mut cache) {
                Ok(event) => results.push(event),
                Err(error) => {
                    tracing::warn!(
                        topic = %sub.topic,
                        error = %error,
                        "Failed to decode backfill message"
                    );
                }
            }
        }

        results.sort_by_key(|event| event.receive_time);
        Ok(results)
    }
}

/// Pull-based cursor over an [`UnindexedReader`].
pub struct UnindexedCursor<'a> {
    reader: &'a UnindexedReader,
    fields_by_topic: HashMap<String, Option<Vec<String>>>,
    range: Option<(u64, u64)>,
    direction: Direction,
    visited: usize,
    remaining: usize,
    alerted_channels: HashSet<u16>,
}

impl UnindexedCursor<'_> {
    pub async fn next(&mut self) -> Option<Result<IteratorItem>> {
        let (start, end) = self.range?;

        while self.remaining > 0 {
            let idx = match self.direction {
                Direction::Forward => self.visited,
                Direction::Reverse => self.reader.records.len() - 1 - self.visited,
            };
            self.visited += 1;
            self.remaining -= 1;

            let record = &self.reader.records[idx];
            if record.log_time < start || record.log_time > end {
                continue;
            }

            let Some(channel) = self.reader.catalog.channels_by_id.get(&record.channel_id)
            else {
                if self.alerted_channels.insert(record.channel_id) {
                    return Some(Ok(IteratorItem::Alert {
                        connection_id: record.channel_id,
                        alert: Alert::warn(format!(
                            "Messages on unknown channel {} were skipped",
                            record.channel_id
                        )),
                    }));
                }
                continue;
            };

            let Some(fields) = self.fields_by_topic.get(&channel.topic) else {
                continue;
            };

            let mut cache = self.reader.size_cache.lock().await;
            let item = match catalog::decode_message(channel, record, fields.as_deref(), &mut cache)
            {
                Ok(event) => IteratorItem::Message(event),
                Err(error) => IteratorItem::Alert {
                    connection_id: channel.id,
                    alert: Alert::warn(format!("Failed to decode message on {}", channel.topic))
                        .with_error(error),
                },
            };
            return Some(Ok(item));
        }

        None
    }

    /// Drain the cursor into a vector. Test and tooling convenience.
    pub async fn collect_all(&mut self) -> Result<Vec<IteratorItem>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }
}
