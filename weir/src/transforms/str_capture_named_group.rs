//! `str_capture_named_group`: runs a regex with named capture groups and
//! builds a JSON object out of the matched group names, grounded in
//! `original_source/transform/str_capture_named_group_test.go`.
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use weir_macros::transform_registration_func;

use super::Transform;
use crate::config::{ConfigSpec, ItemType, ObjectSelector};
use crate::{Error, ExecutionType, Message, MessageBatch};

#[derive(Debug, Clone, Deserialize)]
struct NamedGroupConfig {
    #[serde(default)]
    object: ObjectSelector,
    #[serde(default)]
    expression: String,
}

impl NamedGroupConfig {
    fn validate(&self) -> Result<(), Error> {
        self.object.validate()?;
        if self.expression.is_empty() {
            return Err(Error::ConfigFailedValidation("expression is required".into()));
        }
        Ok(())
    }
}

struct StrCaptureNamedGroup {
    conf: NamedGroupConfig,
    re: Regex,
}

impl StrCaptureNamedGroup {
    fn capture(&self, haystack: &str) -> JsonValue {
        let mut obj = serde_json::Map::new();
        if let Some(caps) = self.re.captures(haystack) {
            for name in self.re.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    obj.insert(name.to_string(), JsonValue::String(m.as_str().to_string()));
                }
            }
        }
        JsonValue::Object(obj)
    }
}

#[async_trait]
impl Transform for StrCaptureNamedGroup {
    async fn transform(&self, mut message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        if !self.conf.object.is_object_mode() {
            let haystack = String::from_utf8_lossy(message.data()).into_owned();
            let obj = self.capture(&haystack);
            message.set_data(serde_json::to_vec(&obj)?);
            return Ok(vec![message]);
        }

        let value = message.get_value(&self.conf.object.key);
        if !value.exists() {
            return Ok(vec![message]);
        }
        let haystack = value.render_string();
        let obj = self.capture(&haystack);
        message.set_value(&self.conf.object.set_key, obj)?;
        Ok(vec![message])
    }

    fn describe(&self) -> String {
        format!(
            "{{\"expression\":\"{}\",\"object\":{}}}",
            self.conf.expression,
            serde_json::to_string(&self.conf.object).unwrap_or_default()
        )
    }
}

#[transform_registration_func]
fn create_str_capture_named_group(conf: Value) -> Result<ExecutionType, Error> {
    let c: NamedGroupConfig = serde_yaml::from_value(conf)?;
    c.validate()?;
    let re = Regex::new(&c.expression).map_err(|e| Error::ConfigFailedValidation(format!("{e}")))?;
    Ok(ExecutionType::Transform(Box::new(StrCaptureNamedGroup {
        conf: c,
        re,
    })))
}

pub(crate) fn register_plugin() -> Result<(), Error> {
    let schema = "type: object
properties:
  object:
    type: object
  expression:
    type: string
required:
  - expression";
    let spec = ConfigSpec::from_schema(schema)?;
    crate::config::register_plugin(
        "str_capture_named_group".into(),
        ItemType::Transform,
        spec,
        create_str_capture_named_group,
    )
}
