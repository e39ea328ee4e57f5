//! robolog Recording Format
//!
//! This crate implements the `.rlog` chunked/indexed binary recording
//! format and everything needed to play it back: random-access byte
//! sources, an indexed reader, a sequential fallback reader, and the
//! facade that picks between them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐
//! │  Local file      │   │  HTTP(S) URL     │
//! └────────┬─────────┘   └────────┬─────────┘
//!          │ FileBlob             │ HttpBlob (range requests,
//!          │                      │ bounded page cache)
//!          ▼                      ▼
//! ┌─────────────────────────────────────────┐
//! │ LogSource (facade)                      │
//! │ - indexed attempt first                 │
//! │ - sequential fallback for small files   │
//! └────────┬───────────────────┬────────────┘
//!          ▼                   ▼
//! ┌──────────────────┐ ┌──────────────────┐
//! │ IndexedReader    │ │ UnindexedReader  │
//! │ chunk index,     │ │ one forward pass,│
//! │ ranged reads,    │ │ in-memory        │
//! │ reverse backfill │ │                  │
//! └────────┬─────────┘ └────────┬─────────┘
//!          │  IteratorItem (message-event | alert)
//!          ▼
//!     consumers (player, panels)
//! ```
//!
//! ## Main Components
//!
//! - [`LogSource`]: open a path or URL, get the uniform reader contract
//! - [`IndexedReader`] / [`UnindexedReader`]: the two implementations
//! - [`LogWriter`]: fixture/capture writer producing `.rlog` bytes
//! - [`RandomAccessBlob`]: "read N bytes at offset" seam with local-file
//!   and remote-HTTP implementations
//!
//! Recoverable problems (one bad message, one exotic channel) never stop
//! playback; they travel in-band as alert items. See the error taxonomy in
//! `robolog-core::error`.

pub mod blob;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod indexed;
pub mod source;
pub mod unindexed;
pub mod writer;

pub use blob::{FileBlob, HttpBlob, RandomAccessBlob};
pub use codec::Compression;
pub use config::{BlobCacheConfig, ReadConfig};
pub use error::{Error, Result};
pub use indexed::{IndexedCursor, IndexedReader};
pub use source::{LogSource, MessageCursor};
pub use unindexed::{UnindexedCursor, UnindexedReader};
pub use writer::LogWriter;
