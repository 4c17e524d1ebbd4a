//! `format_base64_encode` / `format_base64_decode`.
//!
//! Both directions share one config shape (grounded in
//! `original_source/transform/format.go`'s single `formatBase64Config`) and
//! differ only in which `base64::Engine` method gets called.
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use weir_macros::transform_registration_func;

use super::Transform;
use crate::config::{register_plugin, ConfigSpec, ItemType, ObjectSelector};
use crate::{Error, ExecutionType, Message, MessageBatch};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct Base64Config {
    #[serde(default)]
    object: ObjectSelector,
}

impl Base64Config {
    fn validate(&self) -> Result<(), Error> {
        self.object.validate()
    }
}

enum Direction {
    Encode,
    Decode,
}

struct Base64Transform {
    conf: Base64Config,
    direction: Direction,
}

#[async_trait]
impl Transform for Base64Transform {
    async fn transform(&self, mut message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        let apply = |input: &[u8]| -> Result<Vec<u8>, Error> {
            match self.direction {
                Direction::Encode => Ok(STANDARD.encode(input).into_bytes()),
                Direction::Decode => STANDARD
                    .decode(input)
                    .map_err(|e| Error::ProcessingError(format!("format_base64_decode: {e}"))),
            }
        };

        if !self.conf.object.is_object_mode() {
            let result = apply(message.data())?;
            message.set_data(result);
            return Ok(vec![message]);
        }

        let value = message.get_value(&self.conf.object.key);
        if !value.exists() {
            return Ok(vec![message]);
        }

        let rendered = value.render_string();
        let result = apply(rendered.as_bytes())?;
        let result_str = String::from_utf8(result)
            .map_err(|e| Error::ProcessingError(format!("format_base64: {e}")))?;
        message.set_value(&self.conf.object.set_key, serde_json::Value::String(result_str))?;
        Ok(vec![message])
    }

    fn describe(&self) -> String {
        serde_json::to_string(&self.conf).unwrap_or_default()
    }
}

#[transform_registration_func]
fn create_encode(conf: Value) -> Result<ExecutionType, Error> {
    let c: Base64Config = serde_yaml::from_value(conf)?;
    c.validate()?;
    Ok(ExecutionType::Transform(Box::new(Base64Transform {
        conf: c,
        direction: Direction::Encode,
    })))
}

#[transform_registration_func]
fn create_decode(conf: Value) -> Result<ExecutionType, Error> {
    let c: Base64Config = serde_yaml::from_value(conf)?;
    c.validate()?;
    Ok(ExecutionType::Transform(Box::new(Base64Transform {
        conf: c,
        direction: Direction::Decode,
    })))
}

fn object_schema() -> &'static str {
    "type: object
properties:
  object:
    type: object
    properties:
      key:
        type: string
      set_key:
        type: string"
}

pub(crate) fn register_plugins() -> Result<(), Error> {
    let spec = ConfigSpec::from_schema(object_schema())?;
    register_plugin(
        "format_base64_encode".into(),
        ItemType::Transform,
        spec.clone(),
        create_encode,
    )?;
    register_plugin(
        "format_base64_decode".into(),
        ItemType::Transform,
        spec,
        create_decode,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encode_raw_payload() {
        let tf = Base64Transform {
            conf: Base64Config::default(),
            direction: Direction::Encode,
        };
        let out = tf.transform(Message::Data(b"hi".to_vec())).await.unwrap();
        assert_eq!(out[0].data(), b"aGk=");
    }

    #[tokio::test]
    async fn decode_raw_payload() {
        let tf = Base64Transform {
            conf: Base64Config::default(),
            direction: Direction::Decode,
        };
        let out = tf.transform(Message::Data(b"aGk=".to_vec())).await.unwrap();
        assert_eq!(out[0].data(), b"hi");
    }

    #[tokio::test]
    async fn decode_invalid_input_errors() {
        let tf = Base64Transform {
            conf: Base64Config::default(),
            direction: Direction::Decode,
        };
        let result = tf.transform(Message::Data(b"not base64!!".to_vec())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn control_message_passes_through() {
        let tf = Base64Transform {
            conf: Base64Config::default(),
            direction: Direction::Encode,
        };
        let out = tf.transform(Message::control()).await.unwrap();
        assert_eq!(out, vec![Message::control()]);
    }

    #[tokio::test]
    async fn object_mode_writes_set_key() {
        let tf = Base64Transform {
            conf: Base64Config {
                object: ObjectSelector {
                    key: "a".into(),
                    set_key: "b".into(),
                    batch_key: "".into(),
                },
            },
            direction: Direction::Encode,
        };
        let mut msg = Message::new();
        msg.set_value("a", serde_json::json!("hi")).unwrap();
        let out = tf.transform(msg).await.unwrap();
        assert_eq!(out[0].get_value("b").render_string(), "aGk=");
    }
}
