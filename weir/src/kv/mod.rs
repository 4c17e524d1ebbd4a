//! Key-value store abstraction used by enrichment transforms.
//!
//! A store is consulted with a key interpolated from the message under
//! processing and returns the stored value (or nothing). Stores are set up
//! once, lazily, before their first lookup; the [`KvStore::is_enabled`]
//! probe reflects whether that setup has completed.
use async_trait::async_trait;
use serde_json::Value;

use crate::Error;

pub mod blob;
pub mod json_file;

pub use json_file::JsonFileKvStore;

#[cfg(feature = "http_kv")]
pub use blob::HttpBlobSource;
#[cfg(feature = "s3_kv")]
pub use blob::S3BlobSource;

/// Resolves a blob URI (`http(s)://`, `s3://`) to its bytes. Local paths are
/// read directly by [`JsonFileKvStore::setup`] and never reach this trait —
/// fetching a local file isn't a network collaborator, only the remote
/// schemes are.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Fetches the full contents addressed by `uri`.
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>, Error>;
}

/// Uniform lookup/write contract for enrichment data sources.
///
/// Implementations that are backed by immutable data (a file loaded once at
/// startup) return [`Error::SetNotSupported`] from every write method.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Loads the store's backing data. Idempotent; a second call after
    /// successful setup is a no-op.
    async fn setup(&self) -> Result<(), Error>;

    /// `true` once [`KvStore::setup`] has completed successfully.
    async fn is_enabled(&self) -> bool;

    /// Looks up `key`, returning `None` if it isn't present.
    async fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    /// Writes `value` at `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), Error>;

    /// Writes `value` at `key` with an expiry, in seconds, from now.
    async fn set_with_ttl(&self, key: &str, value: Value, ttl_seconds: i64) -> Result<(), Error>;

    /// Releases the store's in-memory data.
    async fn close(&self) -> Result<(), Error>;
}
