//! Ephemeral page cache.
//!
//! The resolver talks to the cache through [`PageCache`]: opaque bytes under
//! a string key with a fixed lifetime. Entries are never invalidated
//! explicitly; they only expire. [`MemoryCache`] is the in-process backend.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! ttl_seconds = 300
//! capacity = 10000
//! ```

mod config;
mod keys;
mod lock;
mod store;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use config::CacheConfig;
pub use keys::page_key;
pub use store::MemoryCache;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache rejected the write: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}
