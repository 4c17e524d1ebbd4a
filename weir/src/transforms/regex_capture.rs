//! `str_capture_find_all` and `string_match_find_all`.
//!
//! The upstream source (`original_source/transform/str_capture_find_all.go`,
//! `string_match_find_all.go`) ships these as two near-identical
//! implementations distinguished only by their config field name
//! (`expression` vs. `pattern`) and type tag. This module shares the
//! matching core and exposes both registrations, matching the source's
//! observable behavior exactly while avoiding duplicating the regex logic.
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use weir_macros::transform_registration_func;

use super::Transform;
use crate::config::{register_plugin, ConfigSpec, ItemType, ObjectSelector};
use crate::{Error, ExecutionType, Message, MessageBatch};

/// Extracts the match text the source's `strCaptureGetBytesMatch`/
/// `strCaptureGetStringMatch` helpers compute: when the pattern has exactly
/// one capturing subgroup, that subgroup is returned; otherwise the full
/// match text is returned.
fn extract_match(caps: &regex::Captures) -> String {
    if caps.len() == 2 {
        caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default()
    } else {
        caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default()
    }
}

/// Runs `re` against `haystack`, returning up to `limit` matches (`None` ==
/// unbounded, the normalized form of the source's `count == 0` → `-1`
/// convention).
fn find_all(re: &Regex, haystack: &str, limit: Option<usize>) -> Vec<String> {
    let iter = re.captures_iter(haystack).map(|c| extract_match(&c));
    match limit {
        Some(n) => iter.take(n).collect(),
        None => iter.collect(),
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CaptureConfig {
    #[serde(default)]
    object: ObjectSelector,
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    expression: String,
    #[serde(default)]
    count: usize,
}

impl CaptureConfig {
    fn pattern_str(&self) -> &str {
        if !self.pattern.is_empty() {
            &self.pattern
        } else {
            &self.expression
        }
    }

    fn limit(&self) -> Option<usize> {
        if self.count == 0 {
            None
        } else {
            Some(self.count)
        }
    }

    fn validate(&self) -> Result<(), Error> {
        self.object.validate()?;
        if self.pattern_str().is_empty() {
            return Err(Error::ConfigFailedValidation(
                "pattern (or expression) is required".into(),
            ));
        }
        Regex::new(self.pattern_str())
            .map(|_| ())
            .map_err(|e| Error::ConfigFailedValidation(format!("invalid regex: {e}")))
    }
}

struct CaptureFindAll {
    conf: CaptureConfig,
    re: Regex,
    field_name: &'static str,
}

#[async_trait]
impl Transform for CaptureFindAll {
    async fn transform(&self, mut message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            return Ok(vec![message]);
        }

        if !self.conf.object.is_object_mode() {
            let haystack = String::from_utf8_lossy(message.data()).into_owned();
            let matches = find_all(&self.re, &haystack, self.conf.limit());

            let mut scratch = JsonValue::Array(Vec::new());
            for m in &matches {
                crate::accessor::set_in_value(&mut scratch, "-1", JsonValue::String(m.clone()));
            }
            message.set_data(serde_json::to_vec(&scratch)?);
            return Ok(vec![message]);
        }

        let value = message.get_value(&self.conf.object.key);
        if !value.exists() {
            return Ok(vec![message]);
        }
        let haystack = value.render_string();
        let matches = find_all(&self.re, &haystack, self.conf.limit());
        message.set_value(
            &self.conf.object.set_key,
            JsonValue::Array(matches.into_iter().map(JsonValue::String).collect()),
        )?;
        Ok(vec![message])
    }

    fn describe(&self) -> String {
        format!(
            "{{\"{}\":\"{}\",\"object\":{}}}",
            self.field_name,
            self.conf.pattern_str(),
            serde_json::to_string(&self.conf.object).unwrap_or_default()
        )
    }
}

#[transform_registration_func]
fn create_str_capture_find_all(conf: Value) -> Result<ExecutionType, Error> {
    let c: CaptureConfig = serde_yaml::from_value(conf)?;
    c.validate()?;
    let re = Regex::new(c.pattern_str()).map_err(|e| Error::ConfigFailedValidation(format!("{e}")))?;
    Ok(ExecutionType::Transform(Box::new(CaptureFindAll {
        conf: c,
        re,
        field_name: "expression",
    })))
}

#[transform_registration_func]
fn create_string_match_find_all(conf: Value) -> Result<ExecutionType, Error> {
    let c: CaptureConfig = serde_yaml::from_value(conf)?;
    c.validate()?;
    let re = Regex::new(c.pattern_str()).map_err(|e| Error::ConfigFailedValidation(format!("{e}")))?;
    Ok(ExecutionType::Transform(Box::new(CaptureFindAll {
        conf: c,
        re,
        field_name: "pattern",
    })))
}

fn schema() -> &'static str {
    "type: object
properties:
  object:
    type: object
  pattern:
    type: string
  expression:
    type: string
  count:
    type: integer"
}

pub(crate) fn register_plugins() -> Result<(), Error> {
    let spec = ConfigSpec::from_schema(schema())?;
    register_plugin(
        "str_capture_find_all".into(),
        ItemType::Transform,
        spec.clone(),
        create_str_capture_find_all,
    )?;
    register_plugin(
        "string_match_find_all".into(),
        ItemType::Transform,
        spec,
        create_string_match_find_all,
    )
}
