//! Indexed Reader - Random Access Over a Chunked Recording
//!
//! This is the fast path for reading recordings: it never scans messages it
//! wasn't asked for.
//!
//! ## What Does IndexedReader Do?
//!
//! 1. **Validates framing** (magic bytes, version, footer, summary CRC)
//! 2. **Parses the summary**: chunk index, channel/schema tables, statistics
//! 3. **Computes the global time range** from chunk index entries —
//!    O(chunks), never O(messages)
//! 4. **Serves cursors** that fetch, verify, and decode only the chunks
//!    intersecting the requested time range
//! 5. **Serves backfill**: per-topic reverse scans ending at a seek point
//!
//! ## Iteration Model
//!
//! Cursors are pull-based: the consumer drives the pace with
//! `next().await`, and cancellation is simply dropping the cursor. One live
//! cursor per reader is the expected usage; a seek abandons the cursor and
//! opens a new one at the new start time.
//!
//! ## Error Handling
//!
//! Recoverable problems flow through the stream as alert items (see the
//! taxonomy in `robolog-core::error`):
//! - a message that fails to decode → alert + skip that message
//! - a record on an unknown channel id → alert once per channel + skip
//!
//! Hard failures (unreadable bytes, chunk CRC mismatch) end the cursor
//! with an error. Corrupt framing fails construction — which is exactly
//! what the facade uses to fall back to the unindexed reader.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use robolog_core::{
    Alert, Direction, Initialization, IteratorItem, MessageEvent, ReadArgs, SubscribePayload,
    Time, TopicStats,
};
use tokio::sync::Mutex;

use crate::blob::RandomAccessBlob;
use crate::catalog::{self, Catalog, SizeCache};
use crate::codec::{
    self, ChunkIndexEntry, Header, RawRecord, CHUNK_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE,
};
use crate::error::Result;

/// Random-access reader over a chunked, indexed recording.
pub struct IndexedReader {
    blob: Arc<dyn RandomAccessBlob>,
    header: Header,
    catalog: Catalog,
    chunk_index: Vec<ChunkIndexEntry>,
    channel_ids_by_topic: HashMap<String, Vec<u16>>,
    init: Initialization,
    /// Per-subscription-shape size estimates, shared across cursors
    size_cache: Mutex<SizeCache>,
}

impl IndexedReader {
    /// Parse the recording's summary sections and build the catalog.
    pub async fn new(blob: Arc<dyn RandomAccessBlob>) -> Result<Self> {
        let size = blob.size();
        if size < (HEADER_SIZE + FOOTER_SIZE) as u64 {
            return Err(robolog_core::Error::InvalidRecording(
                "recording too small".to_string(),
            )
            .into());
        }

        let header_bytes = blob.read_range(0, HEADER_SIZE as u64).await?;
        let header = codec::decode_header(&header_bytes)?;

        let footer_start = size - FOOTER_SIZE as u64;
        let footer_bytes = blob.read_range(footer_start, FOOTER_SIZE as u64).await?;
        let footer = codec::decode_footer(&footer_bytes)?;

        if footer.index_position > footer.stats_position || footer.stats_position > footer_start {
            return Err(robolog_core::Error::InvalidRecording(
                "summary section positions out of order".to_string(),
            )
            .into());
        }

        // The summary (index + statistics) is always read whole; the footer
        // CRC covers exactly this region.
        let summary = blob
            .read_range(footer.index_position, footer_start - footer.index_position)
            .await?;
        if crc32fast::hash(&summary) != footer.crc32 {
            return Err(robolog_core::Error::CrcMismatch.into());
        }

        let index_len = (footer.stats_position - footer.index_position) as usize;
        let mut index_cursor = &summary[..index_len];
        let mut chunk_index = codec::decode_chunk_index(&mut index_cursor)?;
        let mut stats_cursor = &summary[index_len..];
        let stats = codec::decode_stats(&mut stats_cursor)?;

        chunk_index.sort_by_key(|entry| entry.start_time);

        if header.data_position < HEADER_SIZE as u64 || header.data_position > footer.index_position
        {
            return Err(robolog_core::Error::InvalidRecording(
                "data position out of bounds".to_string(),
            )
            .into());
        }
        let tables = blob
            .read_range(
                HEADER_SIZE as u64,
                header.data_position - HEADER_SIZE as u64,
            )
            .await?;
        let mut tables_cursor = &tables[..];
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

        let mut channel_ids_by_topic: HashMap<String, Vec<u16>> = HashMap::new();
        for channel in catalog.channels_by_id.values() {
            channel_ids_by_topic
                .entry(channel.topic.clone())
                .or_default()
                .push(channel.id);
        }

        // Global range from chunk index entries, not from any message scan.
        let start = chunk_index.iter().map(|e| e.start_time).min();
        let end = chunk_index.iter().map(|e| e.end_time).max();

        let mut topic_stats: HashMap<String, TopicStats> = HashMap::new();
        for (channel_id, count) in &stats {
            if let Some(channel) = catalog.channels_by_id.get(channel_id) {
                topic_stats
                    .entry(channel.topic.clone())
                    .or_default()
                    .num_messages += count;
            }
        }

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
            chunks = chunk_index.len(),
            channels = catalog.channels_by_id.len(),
            topics = init.topics.len(),
            "Opened indexed recording"
        );

        Ok(Self {
            blob,
            header,
            catalog,
            chunk_index,
            channel_ids_by_topic,
            init,
            size_cache: Mutex::new(SizeCache::new()),
        })
    }

    /// Chunk count as declared by the recording header.
    pub fn chunk_count(&self) -> u32 {
        self.header.chunk_count
    }

    /// Channel count as declared by the recording header.
    pub fn channel_count(&self) -> u32 {
        self.header.channel_count
    }

    /// The one-time catalog for this recording.
    pub fn initialize(&self) -> Initialization {
        self.init.clone()
    }

    /// Cached recording start from `initialize`.
    pub fn start(&self) -> Option<Time> {
        if self.chunk_index.is_empty() {
            None
        } else {
            Some(self.init.start)
        }
    }

    fn end(&self) -> Option<Time> {
        if self.chunk_index.is_empty() {
            None
        } else {
            Some(self.init.end)
        }
    }

    /// Open a lazy, pull-based cursor over the requested topics and range.
    pub fn message_cursor(&self, args: ReadArgs) -> IndexedCursor<'_> {
        let fields_by_topic: HashMap<String, Option<Vec<String>>> = args
            .topics
            .iter()
            .map(|sub| (sub.topic.clone(), sub.normalized_fields()))
            .collect();

        // Empty topics or an unresolvable range yields nothing, not an error.
        let range = match (
            args.start.or(self.start()),
            args.end.or(self.end()),
            fields_by_topic.is_empty(),
        ) {
            (Some(start), Some(end), false) => Some((start.to_nanos(), end.to_nanos())),
            _ => None,
        };

        let mut chunk_queue: VecDeque<usize> = VecDeque::new();
        if let Some((start, end)) = range {
            for (idx, entry) in self.chunk_index.iter().enumerate() {
                if entry.end_time >= start && entry.start_time <= end {
                    chunk_queue.push_back(idx);
                }
            }
            if args.direction == Direction::Reverse {
                chunk_queue = chunk_queue.into_iter().rev().collect();
            }
        }

        IndexedCursor {
            reader: self,
            fields_by_topic,
            range,
            direction: args.direction,
            chunk_queue,
            pending: VecDeque::new(),
            alerted_channels: HashSet::new(),
        }
    }

    /// Most recent message at-or-before `time` for each requested topic.
    ///
    /// One reverse scan per topic, sequentially, on purpose: with very
    /// different message rates per topic, a single multi-topic reverse scan
    /// would wade through arbitrary amounts of irrelevant history for the
    /// slow topics. The result is merged and sorted ascending by receive
    /// time.
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

            'chunks: for entry in self
                .chunk_index
                .iter()
                .rev()
                .filter(|entry| entry.start_time <= time_ns)
            {
                let records = self.read_chunk(entry).await?;
                for record in records.iter().rev() {
                    if record.log_time > time_ns || !channel_ids.contains(&record.channel_id) {
                        continue;
                    }

                    // Newest candidate found; one decode attempt decides
                    // whether this topic contributes at all.
                    let Some(channel) = self.catalog.channels_by_id.get(&record.channel_id)
                    else {
                        break 'chunks;
                    };
                    let mut cache = self.size_cache.lock().await;
                    match catalog::decode_message(channel, record, fields.as_deref(), &mut cache)
                    {
                        Ok(event) => results.push(event),
                        Err(error) => {
                            tracing::warn!(
                                topic = %sub.topic,
                                error = %error,
                                "Failed to decode backfill message"
                            );
                        }
                    }
                    break 'chunks;
                }
            }
        }

        results.sort_by_key(|event| event.receive_time);
        Ok(results)
    }

    async fn read_chunk(&self, entry: &ChunkIndexEntry) -> Result<Vec<RawRecord>> {
        let len = CHUNK_HEADER_SIZE as u64 + entry.compressed_size;
        let bytes = self.blob.read_range(entry.file_position, len).await?;
        let header = codec::decode_chunk_header(&bytes)?;
        let payload = codec::open_chunk_payload(&header, &bytes[CHUNK_HEADER_SIZE..])?;
        Ok(codec::decode_chunk_records(&payload, header.start_time)?)
    }
}

/// Pull-based message cursor over an [`IndexedReader`].
pub struct IndexedCursor<'a> {
    reader: &'a IndexedReader,
    fields_by_topic: HashMap<String, Option<Vec<String>>>,
    range: Option<(u64, u64)>,
    direction: Direction,
    chunk_queue: VecDeque<usize>,
    pending: VecDeque<IteratorItem>,
    alerted_channels: HashSet<u16>,
}

impl IndexedCursor<'_> {
    /// Produce the next item, or `None` when the range is exhausted.
    ///
    /// A hard error (unreadable or corrupt chunk) ends the cursor.
    pub async fn next(&mut self) -> Option<Result<IteratorItem>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }

            let chunk_idx = self.chunk_queue.pop_front()?;
            if let Err(error) = self.load_chunk(chunk_idx).await {
                self.chunk_queue.clear();
                return Some(Err(error));
            }
        }
    }

    async fn load_chunk(&mut self, chunk_idx: usize) -> Result<()> {
        let entry = &self.reader.chunk_index[chunk_idx];
        let records = self.reader.read_chunk(entry).await?;
        let (start, end) = self.range.unwrap_or((0, 0));
        let mut cache = self.reader.size_cache.lock().await;

        let mut items = Vec::new();
        for record in &records {
            if record.log_time < start || record.log_time > end {
                continue;
            }

            let Some(channel) = self.reader.catalog.channels_by_id.get(&record.channel_id)
            else {
                // Missing channel metadata: skip the record, alert once.
                if self.alerted_channels.insert(record.channel_id) {
                    items.push(IteratorItem::Alert {
                        connection_id: record.channel_id,
                        alert: Alert::warn(format!(
                            "Messages on unknown channel {} were skipped",
                            record.channel_id
                        )),
                    });
                }
                continue;
            };

            let Some(fields) = self.fields_by_topic.get(&channel.topic) else {
                continue;
            };

            match catalog::decode_message(channel, record, fields.as_deref(), &mut cache) {
                Ok(event) => items.push(IteratorItem::Message(event)),
                Err(error) => items.push(IteratorItem::Alert {
                    connection_id: channel.id,
                    alert: Alert::warn(format!(
                        "Failed to decode message on {}",
                        channel.topic
                    ))
                    .with_error(error),
                }),
            }
        }

        if self.direction == Direction::Reverse {
            items.reverse();
        }
        self.pending.extend(items);
        Ok(())
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
