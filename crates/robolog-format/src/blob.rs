//! Random-Access Byte Sources
//!
//! The indexed reader never wants the whole recording — it reads the
//! footer, the index, then individual chunks. This module abstracts "read
//! N bytes at offset" over the two places a recording lives:
//!
//! - [`FileBlob`]: a local file
//! - [`HttpBlob`]: a remote HTTP(S) resource read with `Range` requests
//!
//! ## Remote Read Flow
//!
//! ```text
//! read_range(offset, len)
//!     ↓
//! Split into fixed-size pages
//!     ↓
//! Page cached? ──YES──→ serve from cache
//!     │
//!     NO
//!     ↓
//! GET bytes=start-end (expect 206)
//!     ↓
//! Cache page (evict LRU pages past the byte budget)
//!     ↓
//! Assemble and slice the exact range
//! ```
//!
//! Page granularity keeps the request count bounded while scrubbing
//! (neighboring chunk reads hit the same pages), and the byte budget keeps
//! a multi-gigabyte recording from migrating into memory.
//!
//! ## Requirements on the Server
//!
//! `HttpBlob::connect` requires a `Content-Length` and `Accept-Ranges:
//! bytes` on the probe response. Servers that can't do ranges fall back to
//! the facade's full streamed fetch (see `source`), which has its own
//! `Content-Length` requirement.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use crate::config::BlobCacheConfig;
use crate::error::{Error, Result};

/// Read N bytes at an offset from a recording, wherever it lives.
#[async_trait]
pub trait RandomAccessBlob: Send + Sync {
    /// Total size in bytes, known at open time.
    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes>;
}

fn check_bounds(offset: u64, len: u64, size: u64) -> Result<()> {
    let end = offset
        .checked_add(len)
        .ok_or(Error::ReadOutOfBounds {
            offset,
            requested: len,
            size,
        })?;
    if end > size {
        return Err(Error::ReadOutOfBounds {
            offset,
            requested: len,
            size,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------
// Local files
// ---------------------------------------------------------------

/// Random access over a local file.
pub struct FileBlob {
    file: Mutex<tokio::fs::File>,
    size: u64,
}

impl FileBlob {
    /// Open a local recording.
    ///
    /// Permission problems surface here, before any parsing, with the path
    /// in the message.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| Error::FileAccess {
                path: path.display().to_string(),
                source,
            })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| Error::FileAccess {
                path: path.display().to_string(),
                source,
            })?
            .len();

        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

#[async_trait]
impl RandomAccessBlob for FileBlob {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        check_bounds(offset, len, self.size)?;

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

// ---------------------------------------------------------------
// Page cache
// ---------------------------------------------------------------

struct PageCacheInner {
    pages: LruCache<u64, Bytes>,
    current_bytes: u64,
}

/// Bounded LRU cache of fixed-size pages keyed by page index.
pub(crate) struct PageCache {
    inner: Mutex<PageCacheInner>,
    max_bytes: u64,
}

impl PageCache {
    pub(crate) fn new(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(PageCacheInner {
                // Entry count is bounded by the byte budget, which drives
                // all eviction; a capacity bound would evict behind the
                // byte accounting's back.
                pages: LruCache::unbounded(),
                current_bytes: 0,
            }),
            max_bytes,
        }
    }

    pub(crate) async fn get(&self, page: u64) -> Option<Bytes> {
        self.inner.lock().await.pages.get(&page).cloned()
    }

    /// Insert a page, evicting least-recently-used pages past the budget.
    pub(crate) async fn put(&self, page: u64, data: Bytes) {
        let mut inner = self.inner.lock().await;
        let size = data.len() as u64;

        while inner.current_bytes + size > self.max_bytes {
            match inner.pages.pop_lru() {
                Some((evicted, bytes)) => {
                    inner.current_bytes -= bytes.len() as u64;
                    tracing::debug!(page = evicted, size = bytes.len(), "Evicted cached page");
                }
                None => {
                    // Single page larger than the whole budget; serve it
                    // uncached rather than thrash.
                    tracing::warn!(
                        size,
                        max_bytes = self.max_bytes,
                        "Page larger than cache budget, not caching"
                    );
                    return;
                }
            }
        }

        inner.current_bytes += size;
        inner.pages.put(page, data);
    }

    #[cfg(test)]
    pub(crate) async fn current_bytes(&self) -> u64 {
        self.inner.lock().await.current_bytes
    }

    #[cfg(test)]
    pub(crate) async fn page_count(&self) -> usize {
        self.inner.lock().await.pages.len()
    }
}

// ---------------------------------------------------------------
// Remote HTTP resources
// ---------------------------------------------------------------

/// Random access over a remote HTTP(S) resource via `Range` requests.
pub struct HttpBlob {
    client: reqwest::Client,
    url: String,
    size: u64,
    page_size: u64,
    cache: PageCache,
}

impl HttpBlob {
    /// Probe the server and prepare ranged reads.
    ///
    /// Fails when the server reports no `Content-Length` or does not
    /// advertise byte-range support; the caller is expected to fall back
    /// to a full fetch.
    pub async fn connect(url: &str, config: &BlobCacheConfig) -> Result<Self> {
        let client = reqwest::Client::new();

        let response = client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let size = response
            .content_length()
            .ok_or(Error::MissingContentLength)?;

        let accepts_ranges = response
            .headers()
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains("bytes"))
            .unwrap_or(false);
        if !accepts_ranges {
            return Err(Error::RangesNotSupported(url.to_string()));
        }

        tracing::debug!(url, size, "Opened remote recording");

        Ok(Self {
            client,
            url: url.to_string(),
            size,
            page_size: config.page_size,
            cache: PageCache::new(config.max_bytes),
        })
    }

    async fn fetch_page(&self, page: u64) -> Result<Bytes> {
        let start = page * self.page_size;
        let end = (start + self.page_size).min(self.size) - 1; // inclusive

        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            return Err(Error::UnexpectedStatus {
                status: response.status().as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.bytes().await?;
        let expected = end - start + 1;
        if body.len() as u64 != expected {
            return Err(Error::UnexpectedStatus {
                status: 206,
                url: self.url.clone(),
            });
        }

        tracing::debug!(page, start, len = body.len(), "Fetched remote page");
        Ok(body)
    }
}

#[async_trait]
impl RandomAccessBlob for HttpBlob {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        check_bounds(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let first_page = offset / self.page_size;
        let last_page = (offset + len - 1) / self.page_size;

        let mut assembled = BytesMut::with_capacity(len as usize);
        for page in first_page..=last_page {
            let data = match self.cache.get(page).await {
                Some(data) => data,
                None => {
                    let data = self.fetch_page(page).await?;
                    self.cache.put(page, data.clone()).await;
                    data
                }
            };

            let page_start = page * self.page_size;
            let from = offset.saturating_sub(page_start) as usize;
            let to = ((offset + len - page_start) as usize).min(data.len());
            assembled.extend_from_slice(&data[from..to]);
        }

        Ok(assembled.freeze())
    }
}
