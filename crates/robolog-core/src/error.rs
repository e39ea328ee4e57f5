//! Error Types for robolog
//!
//! This module defines the errors shared by the format and playback layers.
//!
//! ## Error Categories
//!
//! ### Data Integrity Errors
//! - `InvalidMagic`: recording doesn't start/end with the expected magic bytes
//! - `CrcMismatch`: corruption detected via checksum
//! - `InvalidRecording`: malformed data (truncated sections, bad varints, ...)
//!
//! ### Version/Compatibility Errors
//! - `UnsupportedVersion`: recording was produced by a newer format version
//! - `InvalidCompression`: unknown compression type id
//!
//! ### Compression Errors
//! - `Decompression`: chunk payload failed to decompress (likely corruption)
//!
//! ### Feature Errors
//! - `Unsupported`: a declared-but-unimplemented capability (e.g. Zstd chunks)
//!
//! Recoverable conditions (a single bad message, a channel with a missing
//! schema) are NOT errors — they surface as [`Alert`](crate::Alert) items in
//! the iterator stream so playback keeps going. Only conditions that make
//! the recording unreadable produce an `Error`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(u16),

    #[error("CRC mismatch")]
    CrcMismatch,

    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}
