//! Recording Writer
//!
//! Builds a complete `.rlog` recording in memory: channels and schemas are
//! declared up front, messages are appended in time order, and `finish`
//! assembles header, tables, chunks, chunk index, statistics, and footer.
//!
//! The playback engine itself never writes — this exists for capture
//! tooling and for tests that need real recordings to read back.
//!
//! ## Usage
//!
//! ```ignore
//! use robolog_format::{Compression, LogWriter};
//! use robolog_core::Time;
//!
//! let mut writer = LogWriter::new("robot-a", Compression::Lz4);
//! writer.add_schema("imu/Sample", "jsonschema", b"{}");
//! let imu = writer.add_channel("/imu", "imu/Sample", "json", Default::default());
//!
//! for (i, sample) in samples.iter().enumerate() {
//!     let t = Time::from_nanos(i as u64 * 1_000_000);
//!     writer.write(imu, t, t, &serde_json::to_vec(sample)?)?;
//! }
//!
//! let bytes = writer.finish()?;
//! std::fs::write("capture.rlog", bytes)?;
//! ```
//!
//! ## Chunk Rolling
//!
//! Records accumulate into the current chunk; when it reaches the size
//! target the chunk is compressed, checksummed, and sealed, and a fresh one
//! starts. Each sealed chunk later becomes one chunk-index entry, which is
//! exactly the granularity the indexed reader seeks at.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};
use robolog_core::{Error, Result, Time};

use crate::codec::{
    self, ChannelRecord, ChunkHeader, ChunkIndexEntry, Compression, Footer, Header, RawRecord,
    SchemaRecord, FORMAT_VERSION, HEADER_SIZE,
};

/// Default chunk roll size (~1MB uncompressed)
pub const CHUNK_SIZE_TARGET: usize = 1024 * 1024;

/// Builds a `.rlog` recording in memory.
pub struct LogWriter {
    profile: String,
    compression: Compression,
    chunk_size_target: usize,

    channels: Vec<ChannelRecord>,
    schemas: Vec<SchemaRecord>,
    next_channel_id: u16,

    /// Current chunk payload being built
    current: BytesMut,
    current_start: Option<u64>,
    current_end: u64,
    current_count: u32,
    prev_log_time: u64,

    /// Sealed chunks: header plus on-disk bytes
    chunks: Vec<(ChunkHeader, u32, Vec<u8>)>,

    /// Message counts per channel for the statistics section
    message_counts: BTreeMap<u16, u64>,
}

impl LogWriter {
    pub fn new(profile: impl Into<String>, compression: Compression) -> Self {
        Self {
            profile: profile.into(),
            compression,
            chunk_size_target: CHUNK_SIZE_TARGET,
            channels: Vec::new(),
            schemas: Vec::new(),
            next_channel_id: 1,
            current: BytesMut::new(),
            current_start: None,
            current_end: 0,
            current_count: 0,
            prev_log_time: 0,
            chunks: Vec::new(),
            message_counts: BTreeMap::new(),
        }
    }

    /// Override the chunk roll size (small values force multi-chunk files,
    /// which tests rely on).
    pub fn with_chunk_size_target(mut self, target: usize) -> Self {
        self.chunk_size_target = target.max(1);
        self
    }

    /// Declare a schema. Later declarations of the same name win.
    pub fn add_schema(&mut self, name: impl Into<String>, encoding: impl Into<String>, definition: &[u8]) {
        self.schemas.push(SchemaRecord {
            name: name.into(),
            encoding: encoding.into(),
            definition: Bytes::copy_from_slice(definition),
        });
    }

    /// Declare a channel and get its id back.
    pub fn add_channel(
        &mut self,
        topic: impl Into<String>,
        schema_name: impl Into<String>,
        message_encoding: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> u16 {
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        self.channels.push(ChannelRecord {
            id,
            topic: topic.into(),
            schema_name: schema_name.into(),
            message_encoding: message_encoding.into(),
            metadata,
        });
        id
    }

    /// Append one message. Messages must arrive in `receive_time` order.
    pub fn write(
        &mut self,
        channel_id: u16,
        receive_time: Time,
        publish_time: Time,
        payload: &[u8],
    ) -> Result<()> {
        if !self.channels.iter().any(|c| c.id == channel_id) {
            return Err(Error::InvalidRecording(format!(
                "write to undeclared channel {}",
                channel_id
            )));
        }

        let log_time = receive_time.to_nanos();

        if self.current.len() >= self.chunk_size_target {
            self.seal_current()?;
        }

        if self.current_start.is_none() {
            self.current_start = Some(log_time);
            self.prev_log_time = log_time;
        }

        let record = RawRecord {
            channel_id,
            log_time,
            publish_time: publish_time.to_nanos(),
            payload: Bytes::copy_from_slice(payload),
        };
        codec::encode_record(&mut self.current, self.prev_log_time, &record);

        self.prev_log_time = log_time;
        self.current_end = self.current_end.max(log_time);
        self.current_count += 1;
        *self.message_counts.entry(channel_id).or_insert(0) += 1;

        Ok(())
    }

    /// Seal the current chunk, if it holds any records.
    pub fn flush_chunk(&mut self) -> Result<()> {
        self.seal_current()
    }

    fn seal_current(&mut self) -> Result<()> {
        let Some(start) = self.current_start else {
            return Ok(());
        };

        let (header, bytes) =
            codec::seal_chunk(self.compression, start, self.current_end, &self.current)?;
        self.chunks.push((header, self.current_count, bytes));

        self.current.clear();
        self.current_start = None;
        self.current_end = 0;
        self.current_count = 0;

        Ok(())
    }

    /// Assemble the complete recording.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.seal_current()?;

        // Tables section: profile, channels, schemas
        let mut tables = BytesMut::new();
        codec::encode_string(&mut tables, &self.profile);
        for channel in &self.channels {
            codec::encode_channel(&mut tables, channel);
        }
        for schema in &self.schemas {
            codec::encode_schema(&mut tables, schema);
        }

        let data_position = (HEADER_SIZE + tables.len()) as u64;

        let mut out = BytesMut::new();
        codec::encode_header(
            &mut out,
            &Header {
                version: FORMAT_VERSION,
                flags: 0,
                channel_count: self.channels.len() as u32,
                schema_count: self.schemas.len() as u32,
                chunk_count: self.chunks.len() as u32,
                data_position,
            },
        );
        out.put_slice(&tables);

        let mut index = Vec::with_capacity(self.chunks.len());
        for (header, message_count, bytes) in &self.chunks {
            index.push(ChunkIndexEntry {
                start_time: header.start_time,
                end_time: header.end_time,
                file_position: out.len() as u64,
                compressed_size: header.compressed_size,
                message_count: *message_count,
            });
            out.put_slice(bytes);
        }

        let index_position = out.len() as u64;
        codec::encode_chunk_index(&mut out, &index);

        let stats_position = out.len() as u64;
        codec::encode_stats(&mut out, &self.message_counts);

        let crc32 = crc32fast::hash(&out[index_position as usize..]);
        codec::encode_footer(
            &mut out,
            &Footer {
                index_position,
                stats_position,
                crc32,
            },
        );

        Ok(out.to_vec())
    }
}
