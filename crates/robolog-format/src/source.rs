//! Source Facade - One Entry Point Over Both Readers
//!
//! Consumers never pick a reader; they hand the facade a path or a URL and
//! get the uniform contract back (`initialize` / `message_cursor` /
//! `backfill_messages` / `start`), delegated to whichever reader was
//! selected at open time.
//!
//! ## Selection Algorithm
//!
//! ```text
//! open
//!   ↓
//! local file? → verify readability (permission errors surface here)
//!   ↓
//! try IndexedReader
//!   ↓
//! parse ok AND >0 chunks AND >0 channels? ──YES──→ indexed playback
//!   │
//!   NO ("effectively unindexed" is not an error)
//!   ↓
//! size within ReadConfig::max_unindexed_bytes? ──NO──→ fatal
//!   ↓
//! full sequential parse → unindexed playback
//! ```
//!
//! For remote URLs the indexed attempt runs over range requests (see
//! `blob::HttpBlob`) so a multi-gigabyte recording never downloads whole.
//! Only when that fails does the facade fetch the full body — and that
//! fallback requires a `Content-Length` response header, because the size
//! ceiling has to be checked before buffering the recording in memory.
//!
//! ## Multiple Files
//!
//! `open_files` rejects mixed extensions up front ("all sources need to be
//! the same type"); merged playback of several recordings is explicitly
//! unsupported rather than half-implemented.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use robolog_core::{Initialization, IteratorItem, MessageEvent, ReadArgs, SubscribePayload, Time};

use crate::blob::{FileBlob, HttpBlob};
use crate::config::ReadConfig;
use crate::error::{Error, Result};
use crate::indexed::{IndexedCursor, IndexedReader};
use crate::unindexed::{UnindexedCursor, UnindexedReader};

enum SourceReader {
    Indexed(IndexedReader),
    Unindexed(UnindexedReader),
}

/// An opened recording, indexed or not.
pub struct LogSource {
    reader: SourceReader,
}

impl std::fmt::Debug for LogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.reader {
            SourceReader::Indexed(_) => "Indexed",
            SourceReader::Unindexed(_) => "Unindexed",
        };
        f.debug_struct("LogSource").field("reader", &kind).finish()
    }
}

/// Pull-based cursor delegating to the selected reader.
pub enum MessageCursor<'a> {
    Indexed(IndexedCursor<'a>),
    Unindexed(UnindexedCursor<'a>),
}

impl MessageCursor<'_> {
    pub async fn next(&mut self) -> Option<Result<IteratorItem>> {
        match self {
            MessageCursor::Indexed(cursor) => cursor.next().await,
            MessageCursor::Unindexed(cursor) => cursor.next().await,
        }
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

fn effectively_unindexed(reader: &IndexedReader) -> bool {
    reader.chunk_count() == 0 || reader.channel_count() == 0
}

impl LogSource {
    /// Open a single local recording with default configuration.
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_files_with_config(&[path.as_ref().to_path_buf()], &ReadConfig::default()).await
    }

    /// Open local recordings with default configuration.
    pub async fn open_files(paths: &[std::path::PathBuf]) -> Result<Self> {
        Self::open_files_with_config(paths, &ReadConfig::default()).await
    }

    /// Open local recordings.
    ///
    /// All paths must share one file extension; merged playback of more
    /// than one recording is not supported.
    pub async fn open_files_with_config(
        paths: &[std::path::PathBuf],
        config: &ReadConfig,
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::NoSources);
        }

        let extensions: BTreeSet<String> = paths
            .iter()
            .map(|path| {
                path.extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .unwrap_or_default()
            })
            .collect();
        if extensions.len() > 1 {
            return Err(Error::MixedSourceTypes);
        }

        if paths.len() > 1 {
            return Err(Error::Unsupported(
                "opening multiple recordings is not supported".to_string(),
            ));
        }
        let path = &paths[0];

        // Readability (and permissions) surface here, before any parsing.
        let blob = FileBlob::open(path).await?;
        let size = crate::blob::RandomAccessBlob::size(&blob);

        match IndexedReader::new(Arc::new(blob)).await {
            Ok(reader) if !effectively_unindexed(&reader) => {
                return Ok(Self {
                    reader: SourceReader::Indexed(reader),
                });
            }
            Ok(_) => {
                tracing::warn!(
                    path = %path.display(),
                    "Recording has no usable index, falling back to sequential read"
                );
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "Indexed open failed, falling back to sequential read"
                );
            }
        }

        if size > config.max_unindexed_bytes {
            return Err(Error::Unsupported(format!(
                "recording is {} bytes and has no usable index; limit for sequential reads is {}",
                size, config.max_unindexed_bytes
            )));
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|source| Error::FileAccess {
                path: path.display().to_string(),
                source,
            })?;
        let reader = UnindexedReader::new(Bytes::from(data))?;
        Ok(Self {
            reader: SourceReader::Unindexed(reader),
        })
    }

    /// Open a remote recording over HTTP(S) with default configuration.
    pub async fn open_url(url: &str) -> Result<Self> {
        Self::open_url_with_config(url, &ReadConfig::default()).await
    }

    /// Open a remote recording over HTTP(S).
    ///
    /// Tries ranged reads first so indexed parsing needs no full download.
    /// The streamed fallback requires a `Content-Length` response header;
    /// its absence is fatal.
    pub async fn open_url_with_config(url: &str, config: &ReadConfig) -> Result<Self> {
        match HttpBlob::connect(url, &config.blob_cache).await {
            Ok(blob) => match IndexedReader::new(Arc::new(blob)).await {
                Ok(reader) if !effectively_unindexed(&reader) => {
                    return Ok(Self {
                        reader: SourceReader::Indexed(reader),
                    });
                }
                Ok(_) => {
                    tracing::warn!(url, "Remote recording has no usable index");
                }
                Err(error) => {
                    tracing::warn!(url, error = %error, "Indexed remote open failed");
                }
            },
            Err(error) => {
                tracing::warn!(url, error = %error, "Ranged reads unavailable");
            }
        }

        // Full streamed fetch. The size must be known up front, both for
        // the sequential reader and for the size ceiling.
        let response = reqwest::Client::new().get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let size = response
            .content_length()
            .ok_or(Error::MissingContentLength)?;
        if size > config.max_unindexed_bytes {
            return Err(Error::Unsupported(format!(
                "remote recording is {} bytes and has no usable index; limit for sequential reads is {}",
                size, config.max_unindexed_bytes
            )));
        }

        let data = response.bytes().await?;
        let reader = UnindexedReader::new(data)?;
        Ok(Self {
            reader: SourceReader::Unindexed(reader),
        })
    }

    /// Whether the indexed reader was selected.
    pub fn is_indexed(&self) -> bool {
        matches!(self.reader, SourceReader::Indexed(_))
    }

    /// The one-time catalog for this recording.
    pub fn initialize(&self) -> Initialization {
        match &self.reader {
            SourceReader::Indexed(reader) => reader.initialize(),
            SourceReader::Unindexed(reader) => reader.initialize(),
        }
    }

    /// Open a lazy, pull-based cursor over the requested topics and range.
    pub fn message_cursor(&self, args: ReadArgs) -> MessageCursor<'_> {
        match &self.reader {
            SourceReader::Indexed(reader) => MessageCursor::Indexed(reader.message_cursor(args)),
            SourceReader::Unindexed(reader) => {
                MessageCursor::Unindexed(reader.message_cursor(args))
            }
        }
    }

    /// Most recent message at-or-before `time` per requested topic.
    pub async fn backfill_messages(
        &self,
        subscriptions: &[SubscribePayload],
        time: Time,
    ) -> Result<Vec<MessageEvent>> {
        match &self.reader {
            SourceReader::Indexed(reader) => reader.backfill_messages(subscriptions, time).await,
            SourceReader::Unindexed(reader) => {
                reader.backfill_messages(subscriptions, time).await
            }
        }
    }

    /// Recording start time, when the recording has any messages.
    pub fn start(&self) -> Option<Time> {
        match &self.reader {
            SourceReader::Indexed(reader) => reader.start(),
            SourceReader::Unindexed(reader) => reader.start(),
        }
    }
}
