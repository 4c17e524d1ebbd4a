//! `object_to_string`: coerces the value at `object.key` to its string
//! rendering and writes it to `object.set_key`.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use weir_macros::transform_registration_func;

use super::Transform;
use crate::config::{ConfigSpec, ItemType, ObjectSelector};
use crate::{Error, ExecutionType, Message, MessageBatch};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct ObjectToStringConfig {
    object: ObjectSelector,
}

impl ObjectToStringConfig {
    fn validate(&self) -> Result<(), Error> {
        self.object.validate()
    }
}

struct ObjectToString {
    conf: ObjectToStringConfig,
}

#[async_trait]
impl Transform for ObjectToString {
    async fn transform(&self, mut message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        let value = message.get_value(&self.conf.object.key);
        if !value.exists() {
            return Ok(vec![message]);
        }

        message.set_value(
            &self.conf.object.set_key,
            serde_json::Value::String(value.render_string()),
        )?;
        Ok(vec![message])
    }

    fn describe(&self) -> String {
        serde_json::to_string(&self.conf).unwrap_or_default()
    }
}

#[transform_registration_func]
fn create_object_to_string(conf: Value) -> Result<ExecutionType, Error> {
    let c: ObjectToStringConfig = serde_yaml::from_value(conf)?;
    c.validate()?;
    Ok(ExecutionType::Transform(Box::new(ObjectToString { conf: c })))
}

pub(crate) fn register_plugin() -> Result<(), Error> {
    let schema = "type: object
properties:
  object:
    type: object
    properties:
      key:
        type: string
      set_key:
        type: string
required:
  - object";
    let spec = ConfigSpec::from_schema(schema)?;
    crate::config::register_plugin(
        "object_to_string".into(),
        ItemType::Transform,
        spec,
        create_object_to_string,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transform() -> ObjectToString {
        ObjectToString {
            conf: ObjectToStringConfig {
                object: ObjectSelector {
                    key: "a".into(),
                    set_key: "b".into(),
                    batch_key: "".into(),
                },
            },
        }
    }

    #[tokio::test]
    async fn coerces_number_to_string() {
        let mut msg = Message::new();
        msg.set_value("a", json!(42)).unwrap();
        let out = transform().transform(msg).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
        assert_eq!(v, json!({"a": 42, "b": "42"}));
    }

    #[tokio::test]
    async fn missing_key_passes_through_unchanged() {
        let msg = Message::new();
        let out = transform().transform(msg.clone()).await.unwrap();
        assert_eq!(out, vec![msg]);
    }

    #[tokio::test]
    async fn control_message_passes_through() {
        let out = transform().transform(Message::control()).await.unwrap();
        assert_eq!(out, vec![Message::control()]);
    }
}
