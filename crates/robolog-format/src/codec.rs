//! Recording File Format
//!
//! This module implements the binary layout of a `.rlog` recording and the
//! low-level encode/decode routines shared by the writer and both readers.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (32 bytes)                                           │
//! │ - Magic bytes: "RLOG" (4)                                   │
//! │ - Version (2) · Flags (2)                                   │
//! │ - Channel count (4) · Schema count (4) · Chunk count (4)    │
//! │ - Data position (8): offset of the first chunk              │
//! │ - Reserved (4)                                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Tables                                                      │
//! │ - Profile string                                            │
//! │ - Channel table: id, topic, schema name, encoding, metadata │
//! │ - Schema table: name, encoding, definition bytes            │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Chunk 1                                                     │
//! │ - Magic "CHNK" (4) · Start/end time (8+8)                   │
//! │ - Compression (2) · Uncompressed/compressed sizes (8+8)     │
//! │ - CRC32 of the compressed payload (4)                       │
//! │ - Payload: delta-encoded records                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │ ...                                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Chunk index                                                 │
//! │ - Entry count (4); per chunk: start/end time, file          │
//! │   position, compressed size, message count                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Statistics                                                  │
//! │ - Entry count (4); per channel: id (2), message count (8)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (32 bytes)                                           │
//! │ - Index position (8) · Stats position (8)                   │
//! │ - CRC32 over index + statistics sections (4)                │
//! │ - Magic bytes: "RLOG" again (4) · Reserved (8)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Format (inside a decompressed chunk)
//!
//! ```text
//! Record:
//!   - Channel id (varint, unsigned)
//!   - Log time delta (varint, signed) - from the previous record's log
//!     time; the first record is relative to the chunk's start time
//!   - Publish time delta (varint, signed) - relative to this record's
//!     own log time
//!   - Payload length (varint, unsigned) + payload bytes
//! ```
//!
//! ## Why This Design?
//!
//! ### Per-chunk compression and CRC
//! The indexed reader fetches individual chunks with range reads, so
//! integrity checks have to live at chunk granularity; a whole-file CRC
//! would force a full download just to validate. The footer CRC covers the
//! index and statistics sections, which the indexed reader always reads in
//! full.
//!
//! ### Chunk magic
//! Each chunk opens with "CHNK" so the unindexed reader can walk the file
//! sequentially and stop cleanly at the index section without trusting the
//! (possibly corrupt) footer that made it fall back in the first place.
//!
//! ### Delta encoding
//! Records are microseconds to milliseconds apart, so time deltas are tiny
//! varints instead of 8-byte stamps; see `robolog-core::varint`.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use robolog_core::{varint, Error, Result};

/// Magic bytes for recording files: "RLOG"
pub const MAGIC: [u8; 4] = *b"RLOG";

/// Magic bytes opening each chunk: "CHNK"
pub const CHUNK_MAGIC: [u8; 4] = *b"CHNK";

/// Version number for the recording format
pub const FORMAT_VERSION: u16 = 1;

/// Recording header size (32 bytes)
pub const HEADER_SIZE: usize = 32;

/// Recording footer size (32 bytes)
pub const FOOTER_SIZE: usize = 32;

/// Chunk header size (42 bytes)
pub const CHUNK_HEADER_SIZE: usize = 42;

/// Size of one chunk index entry (36 bytes)
pub const INDEX_ENTRY_SIZE: usize = 36;

/// Compression type for chunk payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 0,
    Lz4 = 1,
    Zstd = 2,
}

impl TryFrom<u16> for Compression {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            2 => Ok(Compression::Zstd),
            _ => Err(Error::InvalidCompression(value)),
        }
    }
}

impl Compression {
    /// Compress a chunk payload.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Compression::Zstd => Err(Error::Unsupported(
                "Zstd compression not yet implemented".to_string(),
            )),
        }
    }

    /// Decompress a chunk payload.
    pub fn decompress(self, data: &[u8]) -> Result<Bytes> {
        match self {
            Compression::None => Ok(Bytes::copy_from_slice(data)),
            Compression::Lz4 => {
                let decompressed = lz4_flex::decompress_size_prepended(data)
                    .map_err(|e| Error::Decompression(e.to_string()))?;
                Ok(Bytes::from(decompressed))
            }
            Compression::Zstd => Err(Error::Unsupported(
                "Zstd compression not yet implemented".to_string(),
            )),
        }
    }
}

/// Parsed recording header
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u16,
    pub flags: u16,
    pub channel_count: u32,
    pub schema_count: u32,
    pub chunk_count: u32,
    /// Offset of the first chunk (end of the tables section)
    pub data_position: u64,
}

/// Parsed recording footer
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub index_position: u64,
    pub stats_position: u64,
    pub crc32: u32,
}

/// Parsed chunk header
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub start_time: u64,
    pub end_time: u64,
    pub compression: Compression,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
}

/// One chunk index entry
#[derive(Debug, Clone, Copy)]
pub struct ChunkIndexEntry {
    pub start_time: u64,
    pub end_time: u64,
    /// Absolute file position of the chunk header
    pub file_position: u64,
    pub compressed_size: u64,
    pub message_count: u32,
}

/// One channel table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub id: u16,
    pub topic: String,
    pub schema_name: String,
    pub message_encoding: String,
    pub metadata: BTreeMap<String, String>,
}

/// One schema table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    pub name: String,
    pub encoding: String,
    pub definition: Bytes,
}

/// One undecoded message record from a chunk payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub channel_id: u16,
    /// Receive time in nanoseconds
    pub log_time: u64,
    /// Publish time in nanoseconds
    pub publish_time: u64,
    pub payload: Bytes,
}

fn ensure(buf: &impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::InvalidRecording(format!(
            "unexpected end of data reading {}",
            what
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------
// Strings, bytes, metadata maps
// ---------------------------------------------------------------

pub fn encode_string(buf: &mut impl BufMut, value: &str) {
    varint::encode_varint_u64(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

pub fn decode_string(buf: &mut &[u8]) -> Result<String> {
    let len = varint::decode_varint_u64(buf)? as usize;
    ensure(buf, len, "string")?;
    let value = String::from_utf8(buf[..len].to_vec())
        .map_err(|_| Error::InvalidRecording("string is not valid UTF-8".to_string()))?;
    buf.advance(len);
    Ok(value)
}

pub fn encode_bytes(buf: &mut impl BufMut, value: &[u8]) {
    varint::encode_varint_u64(buf, value.len() as u64);
    buf.put_slice(value);
}

pub fn decode_bytes(buf: &mut &[u8]) -> Result<Bytes> {
    let len = varint::decode_varint_u64(buf)? as usize;
    ensure(buf, len, "bytes")?;
    let value = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(value)
}

pub fn encode_metadata(buf: &mut impl BufMut, metadata: &BTreeMap<String, String>) {
    varint::encode_varint_u64(buf, metadata.len() as u64);
    for (key, value) in metadata {
        encode_string(buf, key);
        encode_string(buf, value);
    }
}

pub fn decode_metadata(buf: &mut &[u8]) -> Result<BTreeMap<String, String>> {
    let count = varint::decode_varint_u64(buf)? as usize;
    let mut metadata = BTreeMap::new();
    for _ in 0..count {
        let key = decode_string(buf)?;
        let value = decode_string(buf)?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

// ---------------------------------------------------------------
// Header / footer
// ---------------------------------------------------------------

pub fn encode_header(buf: &mut impl BufMut, header: &Header) {
    buf.put_slice(&MAGIC);
    buf.put_u16(header.version);
    buf.put_u16(header.flags);
    buf.put_u32(header.channel_count);
    buf.put_u32(header.schema_count);
    buf.put_u32(header.chunk_count);
    buf.put_u64(header.data_position);
    buf.put_slice(&[0u8; 4]);
}

pub fn decode_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_SIZE {
        return Err(Error::InvalidRecording("header too small".to_string()));
    }
    let mut cursor = &data[..HEADER_SIZE];

    let mut magic = [0u8; 4];
    cursor.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(Error::InvalidMagic);
    }

    let version = cursor.get_u16();
    if version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }

    let flags = cursor.get_u16();
    let channel_count = cursor.get_u32();
    let schema_count = cursor.get_u32();
    let chunk_count = cursor.get_u32();
    let data_position = cursor.get_u64();

    Ok(Header {
        version,
        flags,
        channel_count,
        schema_count,
        chunk_count,
        data_position,
    })
}

pub fn encode_footer(buf: &mut impl BufMut, footer: &Footer) {
    buf.put_u64(footer.index_position);
    buf.put_u64(footer.stats_position);
    buf.put_u32(footer.crc32);
    buf.put_slice(&MAGIC);
    buf.put_slice(&[0u8; 8]);
}

pub fn decode_footer(data: &[u8]) -> Result<Footer> {
    if data.len() < FOOTER_SIZE {
        return Err(Error::InvalidRecording("footer too small".to_string()));
    }
    let mut cursor = &data[..FOOTER_SIZE];

    let index_position = cursor.get_u64();
    let stats_position = cursor.get_u64();
    let crc32 = cursor.get_u32();

    let mut magic = [0u8; 4];
    cursor.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(Error::InvalidMagic);
    }

    Ok(Footer {
        index_position,
        stats_position,
        crc32,
    })
}

// ---------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------

pub fn encode_chunk_header(buf: &mut impl BufMut, header: &ChunkHeader) {
    buf.put_slice(&CHUNK_MAGIC);
    buf.put_u64(header.start_time);
    buf.put_u64(header.end_time);
    buf.put_u16(header.compression as u16);
    buf.put_u64(header.uncompressed_size);
    buf.put_u64(header.compressed_size);
    buf.put_u32(header.crc32);
}

pub fn decode_chunk_header(data: &[u8]) -> Result<ChunkHeader> {
    if data.len() < CHUNK_HEADER_SIZE {
        return Err(Error::InvalidRecording("chunk header too small".to_string()));
    }
    let mut cursor = &data[..CHUNK_HEADER_SIZE];

    let mut magic = [0u8; 4];
    cursor.copy_to_slice(&mut magic);
    if magic != CHUNK_MAGIC {
        return Err(Error::InvalidRecording("bad chunk magic".to_string()));
    }

    let start_time = cursor.get_u64();
    let end_time = cursor.get_u64();
    let compression = Compression::try_from(cursor.get_u16())?;
    let uncompressed_size = cursor.get_u64();
    let compressed_size = cursor.get_u64();
    let crc32 = cursor.get_u32();

    Ok(ChunkHeader {
        start_time,
        end_time,
        compression,
        uncompressed_size,
        compressed_size,
        crc32,
    })
}

/// Verify a chunk payload's CRC and decompress it.
pub fn open_chunk_payload(header: &ChunkHeader, payload: &[u8]) -> Result<Bytes> {
    if payload.len() as u64 != header.compressed_size {
        return Err(Error::InvalidRecording(format!(
            "chunk payload is {} bytes, header says {}",
            payload.len(),
            header.compressed_size
        )));
    }
    if crc32fast::hash(payload) != header.crc32 {
        return Err(Error::CrcMismatch);
    }
    header.compression.decompress(payload)
}

/// Encode one record into a chunk payload being built.
///
/// `prev_log_time` is the previous record's log time, or the chunk start
/// time for the first record.
pub fn encode_record(buf: &mut impl BufMut, prev_log_time: u64, record: &RawRecord) {
    varint::encode_varint_u64(buf, record.channel_id as u64);
    varint::encode_varint(buf, record.log_time.wrapping_sub(prev_log_time) as i64);
    varint::encode_varint(buf, record.publish_time.wrapping_sub(record.log_time) as i64);
    encode_bytes(buf, &record.payload);
}

/// Decode every record in a decompressed chunk payload.
pub fn decode_chunk_records(data: &[u8], chunk_start_time: u64) -> Result<Vec<RawRecord>> {
    let mut cursor = data;
    let mut records = Vec::new();
    let mut prev_log_time = chunk_start_time;

    while cursor.has_remaining() {
        let channel_id = varint::decode_varint_u64(&mut cursor)?;
        if channel_id > u16::MAX as u64 {
            return Err(Error::InvalidRecording(format!(
                "channel id {} out of range",
                channel_id
            )));
        }

        let log_delta = varint::decode_varint(&mut cursor)?;
        let log_time = prev_log_time.wrapping_add(log_delta as u64);
        prev_log_time = log_time;

        let publish_delta = varint::decode_varint(&mut cursor)?;
        let publish_time = log_time.wrapping_add(publish_delta as u64);

        let payload = decode_bytes(&mut cursor)?;

        records.push(RawRecord {
            channel_id: channel_id as u16,
            log_time,
            publish_time,
            payload,
        });
    }

    Ok(records)
}

// ---------------------------------------------------------------
// Tables
// ---------------------------------------------------------------

pub fn encode_channel(buf: &mut impl BufMut, channel: &ChannelRecord) {
    buf.put_u16(channel.id);
    encode_string(buf, &channel.topic);
    encode_string(buf, &channel.schema_name);
    encode_string(buf, &channel.message_encoding);
    encode_metadata(buf, &channel.metadata);
}

pub fn decode_channel(buf: &mut &[u8]) -> Result<ChannelRecord> {
    ensure(buf, 2, "channel id")?;
    let id = buf.get_u16();
    let topic = decode_string(buf)?;
    let schema_name = decode_string(buf)?;
    let message_encoding = decode_string(buf)?;
    let metadata = decode_metadata(buf)?;
    Ok(ChannelRecord {
        id,
        topic,
        schema_name,
        message_encoding,
        metadata,
    })
}

pub fn encode_schema(buf: &mut impl BufMut, schema: &SchemaRecord) {
    encode_string(buf, &schema.name);
    encode_string(buf, &schema.encoding);
    encode_bytes(buf, &schema.definition);
}

pub fn decode_schema(buf: &mut &[u8]) -> Result<SchemaRecord> {
    let name = decode_string(buf)?;
    let encoding = decode_string(buf)?;
    let definition = decode_bytes(buf)?;
    Ok(SchemaRecord {
        name,
        encoding,
        definition,
    })
}

// ---------------------------------------------------------------
// Chunk index and statistics sections
// ---------------------------------------------------------------

pub fn encode_chunk_index(buf: &mut impl BufMut, entries: &[ChunkIndexEntry]) {
    buf.put_u32(entries.len() as u32);
    for entry in entries {
        buf.put_u64(entry.start_time);
        buf.put_u64(entry.end_time);
        buf.put_u64(entry.file_position);
        buf.put_u64(entry.compressed_size);
        buf.put_u32(entry.message_count);
    }
}

pub fn decode_chunk_index(buf: &mut &[u8]) -> Result<Vec<ChunkIndexEntry>> {
    ensure(buf, 4, "chunk index count")?;
    let count = buf.get_u32() as usize;
    ensure(buf, count * INDEX_ENTRY_SIZE, "chunk index entries")?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(ChunkIndexEntry {
            start_time: buf.get_u64(),
            end_time: buf.get_u64(),
            file_position: buf.get_u64(),
            compressed_size: buf.get_u64(),
            message_count: buf.get_u32(),
        });
    }
    Ok(entries)
}

pub fn encode_stats(buf: &mut impl BufMut, counts: &BTreeMap<u16, u64>) {
    buf.put_u32(counts.len() as u32);
    for (channel_id, count) in counts {
        buf.put_u16(*channel_id);
        buf.put_u64(*count);
    }
}

pub fn decode_stats(buf: &mut &[u8]) -> Result<BTreeMap<u16, u64>> {
    ensure(buf, 4, "statistics count")?;
    let count = buf.get_u32() as usize;
    ensure(buf, count * 10, "statistics entries")?;

    let mut counts = BTreeMap::new();
    for _ in 0..count {
        let channel_id = buf.get_u16();
        let message_count = buf.get_u64();
        counts.insert(channel_id, message_count);
    }
    Ok(counts)
}

/// Build a chunk: compress a payload and return the header plus bytes.
pub fn seal_chunk(
    compression: Compression,
    start_time: u64,
    end_time: u64,
    payload: &[u8],
) -> Result<(ChunkHeader, Vec<u8>)> {
    let compressed = compression.compress(payload)?;
    let header = ChunkHeader {
        start_time,
        end_time,
        compression,
        uncompressed_size: payload.len() as u64,
        compressed_size: compressed.len() as u64,
        crc32: crc32fast::hash(&compressed),
    };

    let mut bytes = BytesMut::with_capacity(CHUNK_HEADER_SIZE + compressed.len());
    encode_chunk_header(&mut bytes, &header);
    bytes.put_slice(&compressed);
    Ok((header, bytes.to_vec()))
}
