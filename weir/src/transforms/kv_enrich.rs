//! `kv_enrich`: looks `object.key` up in a configured key-value store and
//! writes the result to `object.set_key`, grounded in spec §4.8's
//! "Enrichment via key-value store" leaf transform.
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use weir_macros::transform_registration_func;

use super::Transform;
use crate::config::{ConfigSpec, ItemType, ObjectSelector};
use crate::kv::{json_file::JsonFileKvStoreConfig, JsonFileKvStore, KvStore};
use crate::{Error, ExecutionType, Message, MessageBatch};

#[derive(Debug, Clone, Deserialize)]
struct KvConfig {
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    settings: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
struct KvEnrichConfig {
    #[serde(default)]
    object: ObjectSelector,
    kv: KvConfig,
}

impl KvEnrichConfig {
    fn validate(&self) -> Result<(), Error> {
        self.object.validate()?;
        if !self.object.is_object_mode() {
            return Err(Error::ConfigFailedValidation(
                "kv_enrich: object.key and object.set_key are required".into(),
            ));
        }
        if self.kv.type_tag.is_empty() {
            return Err(Error::ConfigFailedValidation("kv_enrich: kv.type is required".into()));
        }
        Ok(())
    }
}

/// Picks the [`crate::kv::BlobSource`] a `json_file` store's `file` URI
/// needs, if any. `file://`/bare paths are read directly by
/// `JsonFileKvStore::setup` and need no blob source.
async fn blob_source_for(file: &str) -> Result<Option<Arc<dyn crate::kv::BlobSource>>, Error> {
    if file.starts_with("http://") || file.starts_with("https://") {
        #[cfg(feature = "http_kv")]
        return Ok(Some(Arc::new(crate::kv::HttpBlobSource::new())));
        #[cfg(not(feature = "http_kv"))]
        return Err(Error::ConfigFailedValidation(
            "kv_enrich: json_file: http(s):// sources require the `http_kv` feature".into(),
        ));
    }
    if file.starts_with("s3://") {
        #[cfg(feature = "s3_kv")]
        return Ok(Some(Arc::new(crate::kv::S3BlobSource::new().await)));
        #[cfg(not(feature = "s3_kv"))]
        return Err(Error::ConfigFailedValidation(
            "kv_enrich: json_file: s3:// sources require the `s3_kv` feature".into(),
        ));
    }
    Ok(None)
}

async fn build_store(conf: &KvConfig) -> Result<Arc<dyn KvStore>, Error> {
    match conf.type_tag.as_str() {
        "json_file" => {
            let store_conf: JsonFileKvStoreConfig = serde_json::from_value(conf.settings.clone())?;
            store_conf.validate()?;
            let blob_source = blob_source_for(&store_conf.file).await?;
            Ok(Arc::new(JsonFileKvStore::new(store_conf, blob_source)))
        }
        other => Err(Error::ConfigFailedValidation(format!("kv_enrich: unknown kv store type {other}"))),
    }
}

struct KvEnrich {
    conf: KvEnrichConfig,
    store: Arc<dyn KvStore>,
}

#[async_trait]
impl Transform for KvEnrich {
    async fn transform(&self, mut message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        let value = message.get_value(&self.conf.object.key);
        if !value.exists() {
            return Ok(vec![message]);
        }

        let key = value.render_string();
        if let Some(found) = self.store.get(&key).await? {
            message.set_value(&self.conf.object.set_key, found)?;
        }

        Ok(vec![message])
    }

    async fn close(&self) -> Result<(), Error> {
        self.store.close().await
    }

    fn describe(&self) -> String {
        format!(
            "{{\"kv\":\"{}\",\"object\":{}}}",
            self.conf.kv.type_tag,
            serde_json::to_string(&self.conf.object).unwrap_or_default()
        )
    }
}

#[transform_registration_func]
fn create_kv_enrich(conf: Value) -> Result<ExecutionType, Error> {
    let c: KvEnrichConfig = serde_yaml::from_value(conf)?;
    c.validate()?;

    let store = build_store(&c.kv).await?;
    store.setup().await?;

    Ok(ExecutionType::Transform(Box::new(KvEnrich { conf: c, store })))
}

pub(crate) fn register_plugin() -> Result<(), Error> {
    let schema = "type: object
properties:
  object:
    type: object
  kv:
    type: object
required:
  - object
  - kv";
    let spec = ConfigSpec::from_schema(schema)?;
    crate::config::register_plugin("kv_enrich".into(), ItemType::Transform, spec, create_kv_enrich)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticStore(JsonValue);

    #[async_trait]
    impl KvStore for StaticStore {
        async fn setup(&self) -> Result<(), Error> {
            Ok(())
        }
        async fn is_enabled(&self) -> bool {
            true
        }
        async fn get(&self, key: &str) -> Result<Option<JsonValue>, Error> {
            Ok(self.0.get(key).cloned())
        }
        async fn set(&self, _key: &str, _value: JsonValue) -> Result<(), Error> {
            Err(Error::SetNotSupported)
        }
        async fn set_with_ttl(&self, _key: &str, _value: JsonValue, _ttl_seconds: i64) -> Result<(), Error> {
            Err(Error::SetNotSupported)
        }
        async fn close(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    fn transform() -> KvEnrich {
        KvEnrich {
            conf: KvEnrichConfig {
                object: ObjectSelector {
                    key: "a".into(),
                    set_key: "b".into(),
                    batch_key: "".into(),
                },
                kv: KvConfig {
                    type_tag: "json_file".into(),
                    settings: json!({}),
                },
            },
            store: Arc::new(StaticStore(json!({"c": "enriched"}))),
        }
    }

    #[tokio::test]
    async fn found_value_is_written_to_set_key() {
        let mut msg = Message::new();
        msg.set_value("a", json!("c")).unwrap();
        let out = transform().transform(msg).await.unwrap();
        assert_eq!(out[0].get_value("b").render_string(), "enriched");
    }

    #[tokio::test]
    async fn missing_value_leaves_message_unchanged() {
        let mut msg = Message::new();
        msg.set_value("a", json!("missing")).unwrap();
        let out = transform().transform(msg.clone()).await.unwrap();
        assert_eq!(out, vec![msg]);
    }

    #[tokio::test]
    async fn control_message_passes_through() {
        let out = transform().transform(Message::control()).await.unwrap();
        assert_eq!(out, vec![Message::control()]);
    }
}
