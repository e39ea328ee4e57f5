//! Reader Configuration
//!
//! ## BlobCacheConfig
//!
//! Controls the bounded page cache in front of remote byte sources:
//!
//! - **page_size**: granularity of range requests and cache entries
//!   (default: 256 KiB)
//! - **max_bytes**: byte budget across all cached pages; least recently
//!   used pages are evicted past this (default: 64 MiB)
//!
//! ## ReadConfig
//!
//! Controls the source facade:
//!
//! - **max_unindexed_bytes**: the unindexed fallback reader parses the
//!   whole recording into memory, so the facade refuses files above this
//!   size instead of silently loading gigabytes (default: 1 GiB)
//!
//! ## Usage
//!
//! ```ignore
//! use robolog_format::{BlobCacheConfig, ReadConfig};
//!
//! // Smaller cache for constrained environments
//! let cache = BlobCacheConfig {
//!     max_bytes: 8 * 1024 * 1024,
//!     ..Default::default()
//! };
//!
//! let read = ReadConfig {
//!     max_unindexed_bytes: 64 * 1024 * 1024,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobCacheConfig {
    /// Page size for range requests and cache entries (default: 256 KiB)
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Maximum total bytes of cached pages (default: 64 MiB)
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
}

impl Default for BlobCacheConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_bytes: default_cache_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadConfig {
    /// Largest recording the unindexed fallback will load (default: 1 GiB)
    #[serde(default = "default_max_unindexed_bytes")]
    pub max_unindexed_bytes: u64,

    /// Page cache configuration for remote sources
    #[serde(default)]
    pub blob_cache: BlobCacheConfig,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            max_unindexed_bytes: default_max_unindexed_bytes(),
            blob_cache: BlobCacheConfig::default(),
        }
    }
}

fn default_page_size() -> u64 {
    256 * 1024 // 256 KiB
}

fn default_cache_max_bytes() -> u64 {
    64 * 1024 * 1024 // 64 MiB
}

fn default_max_unindexed_bytes() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}
