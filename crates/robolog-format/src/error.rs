//! Format-Layer Error Types
//!
//! Errors that can occur while opening or reading a recording.
//!
//! ## Error Categories
//!
//! ### Fatal-at-open
//! - `FileAccess`: the local file cannot be read (permissions, missing)
//! - `MixedSourceTypes`: files with different extensions were passed together
//! - `MissingContentLength`: the remote fallback fetch requires a
//!   `Content-Length` header and the server did not send one
//! - `RangesNotSupported` / `UnexpectedStatus`: the remote server cannot
//!   serve the byte ranges the indexed path needs
//!
//! ### Recording errors
//! - `Recording`: malformed/corrupt data, wrapped from `robolog-core`
//!
//! Everything recoverable (bad message, skipped channel) is NOT here — it
//! flows through the iterator stream as alert items.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recording error: {0}")]
    Recording(#[from] robolog_core::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cannot read {path}: {source}")]
    FileAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("all sources need to be the same type")]
    MixedSourceTypes,

    #[error("No sources provided")]
    NoSources,

    #[error("Remote source did not report a Content-Length header")]
    MissingContentLength,

    #[error("Server does not support range requests: {0}")]
    RangesNotSupported(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Read of {requested} bytes at offset {offset} is out of bounds (size {size})")]
    ReadOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}
