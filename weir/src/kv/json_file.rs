//! Read-only key-value store backed by a JSON (or JSON Lines) file loaded
//! into memory, ported from `original_source/internal/kv/json_file.go`.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{BlobSource, KvStore};
use crate::accessor;
use crate::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonFileKvStoreConfig {
    /// Location of the backing file: a local path, or an `http(s)://`/`s3://`
    /// URI resolved through an injected [`BlobSource`].
    pub file: String,
    /// When `true`, the file holds one JSON object per line and a query
    /// returns the first non-null value found across lines — the semantic
    /// equivalent of the source's `gjson` `..#.k` rewrite.
    #[serde(default)]
    pub is_lines: bool,
}

impl JsonFileKvStoreConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.file.is_empty() {
            return Err(Error::ConfigFailedValidation("kv: json_file: file is required".into()));
        }
        Ok(())
    }
}

pub struct JsonFileKvStore {
    conf: JsonFileKvStoreConfig,
    blob_source: Option<Arc<dyn BlobSource>>,
    object: Mutex<Option<Vec<u8>>>,
}

impl JsonFileKvStore {
    pub fn new(conf: JsonFileKvStoreConfig, blob_source: Option<Arc<dyn BlobSource>>) -> Self {
        JsonFileKvStore {
            conf,
            blob_source,
            object: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<Vec<u8>, Error> {
        if let Some(rest) = self.conf.file.strip_prefix("http://").or_else(|| self.conf.file.strip_prefix("https://")) {
            let _ = rest;
            return self.fetch_via_blob_source().await;
        }
        if self.conf.file.starts_with("s3://") {
            return self.fetch_via_blob_source().await;
        }

        tokio::fs::read(&self.conf.file)
            .await
            .map_err(|e| Error::KvError(format!("kv: json_file: {e}")))
    }

    async fn fetch_via_blob_source(&self) -> Result<Vec<u8>, Error> {
        let source = self
            .blob_source
            .as_ref()
            .ok_or_else(|| Error::KvError(format!("kv: json_file: no blob source configured for {}", self.conf.file)))?;
        source.fetch(&self.conf.file).await
    }

    /// Returns the first non-null value for `key` across every line of a
    /// JSON Lines document.
    fn query_lines(buf: &[u8], key: &str) -> Option<Value> {
        for line in buf.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let parsed: Value = match serde_json::from_slice(line) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let accessor::Accessed::Present(v) = accessor::get_in_value(&parsed, key) {
                if !v.is_null() {
                    return Some(v);
                }
            }
        }
        None
    }
}

#[async_trait]
impl KvStore for JsonFileKvStore {
    async fn setup(&self) -> Result<(), Error> {
        let mut guard = self.object.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let buf = self.fetch().await?;

        if self.conf.is_lines {
            for line in buf.split(|b| *b == b'\n') {
                if line.is_empty() {
                    continue;
                }
                serde_json::from_slice::<Value>(line)
                    .map_err(|_| Error::KvError("kv: json_file: invalid JSON".into()))?;
            }
        } else {
            serde_json::from_slice::<Value>(&buf)
                .map_err(|_| Error::KvError("kv: json_file: invalid JSON".into()))?;
        }

        *guard = Some(buf);
        Ok(())
    }

    async fn is_enabled(&self) -> bool {
        self.object.lock().await.is_some()
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let guard = self.object.lock().await;
        let buf = match guard.as_ref() {
            Some(b) => b,
            None => return Ok(None),
        };

        if self.conf.is_lines {
            return Ok(Self::query_lines(buf, key));
        }

        match accessor::get(buf, key) {
            accessor::Accessed::Present(v) if !v.is_null() => Ok(Some(v)),
            _ => Ok(None),
        }
    }

    async fn set(&self, _key: &str, _value: Value) -> Result<(), Error> {
        Err(Error::SetNotSupported)
    }

    async fn set_with_ttl(&self, _key: &str, _value: Value, _ttl_seconds: i64) -> Result<(), Error> {
        Err(Error::SetNotSupported)
    }

    async fn close(&self) -> Result<(), Error> {
        let mut guard = self.object.lock().await;
        *guard = None;
        Ok(())
    }
}
