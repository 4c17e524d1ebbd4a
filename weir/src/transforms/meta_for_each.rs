//! `meta_for_each`: applies a child transform to every element of an array
//! and appends each result to the parent's `set_key`, grounded in
//! `original_source/transform/meta_for_each.go`.
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use weir_macros::transform_registration_func;

use super::Transform;
use crate::config::{ConfigSpec, ItemType};
use crate::{Error, ExecutionType, Message, MessageBatch};

#[derive(Debug, Clone, Deserialize)]
struct MetaForEachConfig {
    #[serde(default)]
    key: String,
    #[serde(default)]
    set_key: String,
    #[serde(rename = "transform")]
    child: ChildConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct ChildConfig {
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(default)]
    settings: JsonValue,
}

impl MetaForEachConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.key.is_empty() || self.set_key.is_empty() {
            return Err(Error::ConfigFailedValidation(format!(
                "meta_for_each: key {} set_key {} must both be set",
                self.key, self.set_key
            )));
        }
        if self.child.type_tag.is_empty() {
            return Err(Error::ConfigFailedValidation(
                "meta_for_each: transform.type is required".into(),
            ));
        }
        Ok(())
    }

    /// Rewrites the child's `settings.object.key`/`settings.object.set_key`
    /// into the synthetic `child.type_tag[.inner_key]` namespace so nested
    /// paths can't collide with the parent message's own schema. Every
    /// object-mode leaf transform (`object_to_string`, `kv_enrich`,
    /// `str_capture_named_group`, ...) takes its selector nested under an
    /// `object: {}` field, so that's the shape rewritten here rather than
    /// flat top-level `key`/`set_key`. Returns the type tag, the rewritten
    /// settings, and the child's own (un-namespaced) `set_key`, which the
    /// iteration loop uses to pick the single field the child wrote back out
    /// of the scratch document rather than returning the whole scratch root
    /// (which would also carry the input field).
    fn namespaced_child_settings(&self) -> (String, JsonValue, Option<String>) {
        let type_tag = self.child.type_tag.clone();
        let mut settings = self.child.settings.clone();
        if !settings.is_object() {
            settings = JsonValue::Object(serde_json::Map::new());
        }

        let object = settings.get("object").cloned().unwrap_or(JsonValue::Null);

        let inner_key = object
            .get("key")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let input_key = match &inner_key {
            Some(k) => format!("{type_tag}.{k}"),
            None => type_tag.clone(),
        };

        let inner_set_key = object
            .get("set_key")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let output_key = match &inner_set_key {
            Some(k) => format!("{type_tag}.{k}"),
            None => type_tag.clone(),
        };

        if let JsonValue::Object(map) = &mut settings {
            let mut object_map = match map.remove("object") {
                Some(JsonValue::Object(m)) => m,
                _ => serde_json::Map::new(),
            };
            object_map.insert("key".into(), JsonValue::String(input_key));
            object_map.insert("set_key".into(), JsonValue::String(output_key));
            map.insert("object".into(), JsonValue::Object(object_map));
        }

        (type_tag, settings, inner_set_key)
    }
}

struct MetaForEach {
    conf: MetaForEachConfig,
    type_tag: String,
    /// The child's own `set_key`, pre-namespacing. `None` when the child
    /// operates in raw-payload mode.
    inner_set_key: Option<String>,
    child: Box<dyn Transform>,
}

#[async_trait]
impl Transform for MetaForEach {
    async fn transform(&self, mut message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        let result = message.get_value(&self.conf.key);
        let items = match result.as_value() {
            Some(JsonValue::Array(items)) => items.clone(),
            _ => return Ok(vec![message]),
        };

        for item in items {
            let mut scratch = Message::new();
            scratch.set_value(&self.type_tag, item.clone())?;

            let outputs = self.child.transform(scratch).await?;
            for out in outputs {
                let element = match &self.inner_set_key {
                    Some(inner) => {
                        let v = out.get_value(&format!("{}.{inner}", self.type_tag)).into_value();
                        let mut obj = serde_json::Map::new();
                        obj.insert(inner.clone(), v);
                        JsonValue::Object(obj)
                    }
                    None => out.get_value(&self.type_tag).into_value(),
                };
                message.set_value(&format!("{}.-1", self.conf.set_key), element)?;
            }
        }

        Ok(vec![message])
    }

    async fn close(&self) -> Result<(), Error> {
        self.child.close().await
    }

    fn describe(&self) -> String {
        format!(
            "{{\"key\":\"{}\",\"set_key\":\"{}\",\"transform\":\"{}\"}}",
            self.conf.key, self.conf.set_key, self.conf.child.type_tag
        )
    }
}

#[transform_registration_func]
fn create_meta_for_each(conf: Value) -> Result<ExecutionType, Error> {
    let c: MetaForEachConfig = serde_yaml::from_value(conf)?;
    c.validate()?;

    let (type_tag, child_settings, inner_set_key) = c.namespaced_child_settings();
    let child_settings_yaml: Value = serde_yaml::to_value(&child_settings)?;
    let parsed = crate::config::parse_configuration_item(
        ItemType::Transform,
        &c.child.type_tag,
        &child_settings_yaml,
    )
    .await?;
    let ExecutionType::Transform(child) = (parsed.creator)(parsed.config).await?;

    Ok(ExecutionType::Transform(Box::new(MetaForEach {
        conf: c,
        type_tag,
        inner_set_key,
        child,
    })))
}

pub(crate) fn register_plugin() -> Result<(), Error> {
    let schema = "type: object
properties:
  key:
    type: string
  set_key:
    type: string
  transform:
    type: object
required:
  - key
  - set_key
  - transform";
    let spec = ConfigSpec::from_schema(schema)?;
    crate::config::register_plugin("meta_for_each".into(), ItemType::Transform, spec, create_meta_for_each)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::object_to_string;
    use serde_json::json;

    /// Builds the child transform the way `create_meta_for_each` does: keys
    /// namespaced under `object_to_string.<inner_key>` so the scratch
    /// message's own schema never collides with the parent's.
    async fn object_to_string_child(inner_key: &str, inner_set_key: &str) -> Box<dyn Transform> {
        object_to_string::register_plugin().ok();
        let key = format!("object_to_string.{inner_key}");
        let set_key = format!("object_to_string.{inner_set_key}");
        let settings = json!({"object": {"key": key, "set_key": set_key}});
        let settings_yaml: Value = serde_yaml::to_value(&settings).unwrap();
        let parsed = crate::config::parse_configuration_item(
            ItemType::Transform,
            "object_to_string",
            &settings_yaml,
        )
        .await
        .unwrap();
        let ExecutionType::Transform(t) = (parsed.creator)(parsed.config).await.unwrap();
        t
    }

    #[tokio::test]
    async fn scenario_4_applies_child_per_element_and_appends() {
        let child_type_tag = "object_to_string";
        let child = object_to_string_child("x", "y").await;
        let tf = MetaForEach {
            conf: MetaForEachConfig {
                key: "a".into(),
                set_key: "r".into(),
                child: ChildConfig {
                    type_tag: child_type_tag.into(),
                    settings: json!({}),
                },
            },
            type_tag: child_type_tag.into(),
            inner_set_key: Some("y".into()),
            child,
        };

        let mut msg = Message::new();
        msg.set_value("a", json!([{"x": 1}, {"x": 2}])).unwrap();

        let out = tf.transform(msg).await.unwrap();
        let v: JsonValue = serde_json::from_slice(out[0].data()).unwrap();
        assert_eq!(v["a"], json!([{"x": 1}, {"x": 2}]));
        assert_eq!(v["r"], json!([{"y": "1"}, {"y": "2"}]));
    }

    #[tokio::test]
    async fn non_array_key_passes_through_unchanged() {
        let child = object_to_string_child("x", "y").await;
        let tf = MetaForEach {
            conf: MetaForEachConfig {
                key: "a".into(),
                set_key: "r".into(),
                child: ChildConfig {
                    type_tag: "object_to_string".into(),
                    settings: json!({}),
                },
            },
            type_tag: "object_to_string".into(),
            inner_set_key: Some("y".into()),
            child,
        };

        let mut msg = Message::new();
        msg.set_value("a", json!("not an array")).unwrap();
        let out = tf.transform(msg.clone()).await.unwrap();
        assert_eq!(out, vec![msg]);
    }

    #[tokio::test]
    async fn control_message_passes_through() {
        let child = object_to_string_child("x", "y").await;
        let tf = MetaForEach {
            conf: MetaForEachConfig {
                key: "a".into(),
                set_key: "r".into(),
                child: ChildConfig {
                    type_tag: "object_to_string".into(),
                    settings: json!({}),
                },
            },
            type_tag: "object_to_string".into(),
            inner_set_key: Some("y".into()),
            child,
        };
        let out = tf.transform(Message::control()).await.unwrap();
        assert_eq!(out, vec![Message::control()]);
    }
}
