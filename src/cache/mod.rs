//! Key-value cache boundary — the engine's only persistence substrate.
//!
//! The engine persists its tables as JSON strings through this trait.
//! The in-process [`MemoryCache`] is the reference substrate; a real
//! persistent backend can be substituted without touching engine logic,
//! as long as it preserves the TTL-on-read contract.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

pub use memory::MemoryCache;

/// Get/set/delete with advisory TTL, checked on read.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Look up a key. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key matching `pattern` (a regex). Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;
}
