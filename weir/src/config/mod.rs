//! Configuration schema, registration, and validation primitives for
//! transform development.
//!
//! A pipeline configuration is a list of `{ type, settings }` records (see
//! spec §6). `type` selects a registered factory via [`register_plugin`];
//! `settings` is an unvalidated key-value map that the factory decodes into
//! its own typed config and validates.
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, trace};

mod registration;
mod validate;

pub use registration::register_plugin;
pub(crate) use validate::parse_configuration_item;

use crate::{Callback, Error, ExecutionType};

/// Plugin category used for registration. A single variant today because
/// this runtime unifies inputs/processors/outputs behind one `Transform`
/// trait; kept as an enum (rather than collapsed entirely) so a future
/// category (e.g. a distinct metrics backend) has somewhere to go without
/// reshaping the registry.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum ItemType {
    /// [`crate::transforms::Transform`] trait enum variant.
    Transform,
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transform")
    }
}

/// Parsed and validated configuration item, stored in the registry.
#[derive(Clone)]
pub(crate) struct RegisteredItem {
    pub creator: Callback,
    pub format: ConfigSpec,
}

/// Execution placeholder of a transform, produced once its configuration has
/// passed validation and retained until pipeline assembly time.
#[derive(Clone)]
pub(crate) struct ParsedRegisteredItem {
    pub creator: Callback,
    pub config: Value,
    pub type_tag: String,
}

static ENV: Lazy<Mutex<HashMap<ItemType, HashMap<String, RegisteredItem>>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(ItemType::Transform, HashMap::new());
    Mutex::new(m)
});

/// Deserializes an optional duration from a string like `"10s"`, `"5m"`.
pub(crate) fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => parse_duration::parse(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// The `object: { key?, set_key?, batch_key? }` fragment shared by every
/// leaf and sink transform (spec §3, "Object selector").
///
/// Semantics: both empty → operate on the raw payload; both populated → read
/// from `key`, write to `set_key`; exactly one populated → configuration
/// error. `batch_key` is meaningful only to sink transforms.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ObjectSelector {
    /// Path to read from. Empty means "operate on the raw payload".
    #[serde(default)]
    pub key: String,
    /// Path to write to. Empty means "operate on the raw payload".
    #[serde(default)]
    pub set_key: String,
    /// Path whose rendered string value partitions a sink's aggregator.
    /// Sinks only; empty means "single bucket".
    #[serde(default)]
    pub batch_key: String,
}

impl ObjectSelector {
    /// Enforces the both-empty-or-both-populated rule. Returns the
    /// human-readable field names the source configuration used
    /// (`object_key`/`object_set_key`) on violation, matching the error
    /// messages every leaf transform's `Validate()` produces in the source.
    pub fn validate(&self) -> Result<(), Error> {
        if self.key.is_empty() && !self.set_key.is_empty() {
            return Err(Error::ConfigFailedValidation(
                "object.key is required when object.set_key is set".into(),
            ));
        }
        if !self.key.is_empty() && self.set_key.is_empty() {
            return Err(Error::ConfigFailedValidation(
                "object.set_key is required when object.key is set".into(),
            ));
        }
        Ok(())
    }

    /// `true` when both `key` and `set_key` are populated.
    pub fn is_object_mode(&self) -> bool {
        !self.key.is_empty() && !self.set_key.is_empty()
    }
}

/// The `batch: { count?, size?, duration? }` fragment. Sink transforms hold
/// hardcoded `max_count`/`max_bytes` ceilings per the cloud API they target
/// (spec §4.6's table); this fragment only ever lowers the *duration*
/// threshold the operator is willing to let a batch sit open for, mirroring
/// the source's `iconfig.Batch` (only `Duration` is consulted; `Count`/`Size`
/// exist in the schema for forward compatibility with future sinks that
/// don't have a fixed cloud-imposed ceiling).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchSettings {
    /// Maximum duration a batch may remain open before a flush is forced by
    /// the next control message or probe.
    #[serde(default, deserialize_with = "deserialize_optional_duration")]
    pub duration: Option<Duration>,
    /// Reserved for forward compatibility; unused by the sinks in this spec,
    /// whose count ceiling is fixed by the target API.
    #[serde(default)]
    pub count: Option<usize>,
    /// Reserved for forward compatibility; see `count`.
    #[serde(default)]
    pub size: Option<usize>,
}

impl BatchSettings {
    /// Effective flush duration, defaulting to 10 seconds if unset (matches
    /// the teacher's `BatchingPolicy::effective_duration`).
    pub fn effective_duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| Duration::from_secs(10))
    }
}

/// The `aws: { arn, assume_role_arn? }` fragment used by every AWS sink.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwsSettings {
    /// Resource ARN (`arn:aws:svc:region:account:name`); region and account
    /// are parsed out of it rather than configured separately.
    pub arn: String,
    /// Optional role to assume before constructing the cloud client.
    #[serde(default)]
    pub assume_role_arn: Option<String>,
    /// Overrides the client endpoint; used in tests against LocalStack.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// The `retry: { count? }` fragment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetrySettings {
    /// Maximum number of partial-failure resubmission rounds. `None` means
    /// retry until the failed list is empty (the source's default).
    #[serde(default)]
    pub count: Option<u32>,
}

/// One entry of a pipeline configuration: `{ type, settings }`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TransformConfig {
    /// Selects a registered factory.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Unvalidated settings, decoded by the selected factory.
    #[serde(default)]
    pub settings: Value,
}

/// An unparsed pipeline: an ordered list of transform configurations.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Optional label for the pipeline, surfaced in logs only.
    pub label: Option<String>,
    /// The ordered list of transforms to run each message through.
    pub transforms: Vec<TransformConfig>,
}

impl FromStr for Config {
    type Err = Error;

    /// Parses a pipeline from YAML text, first expanding `{{ENV_VAR}}`
    /// handlebars templates against the process environment — the same
    /// templating step the teacher's `Config::from_str` performs, so
    /// secrets/ARNs/queue URLs can be injected at deploy time without
    /// editing the checked-in pipeline file.
    fn from_str(conf: &str) -> Result<Self, Self::Err> {
        let environment_variables: HashMap<String, String> = env::vars().collect();

        let mut handle_bars = handlebars::Handlebars::new();
        handle_bars.set_strict_mode(false);

        let populated = handle_bars
            .render_template(conf, &environment_variables)
            .map_err(|e| Error::ConfigFailedValidation(format!("{e}")))?;

        let config: Config = serde_yaml::from_str(&populated)?;
        Ok(config)
    }
}

impl Config {
    /// Resolves every transform's `type_tag` against the registry and runs
    /// its schema + semantic validation, producing a [`ParsedConfig`] ready
    /// for [`crate::runtime::Pipeline::build`].
    pub async fn validate(self) -> Result<ParsedConfig, Error> {
        let mut transforms = Vec::with_capacity(self.transforms.len());
        for t in &self.transforms {
            trace!(type_tag = %t.type_tag, "validating transform configuration");
            let parsed = parse_configuration_item(ItemType::Transform, &t.type_tag, &t.settings).await?;
            transforms.push(parsed);
        }

        debug!(count = transforms.len(), "pipeline configuration is valid");

        Ok(ParsedConfig {
            label: self.label,
            transforms,
        })
    }
}

/// A pipeline configuration whose transforms have all been resolved and
/// validated against their registered factories.
#[derive(Clone)]
pub struct ParsedConfig {
    /// Optional label for the pipeline.
    pub label: Option<String>,
    pub(crate) transforms: Vec<ParsedRegisteredItem>,
}

/// JSON-schema validation snippet attached to a registered transform.
///
/// Uses `Arc` internally (via [`jsonschema::JSONSchema`]'s own sharing) to
/// make cloning cheap without recompiling the schema document.
pub struct ConfigSpec {
    raw_schema: String,
    schema: std::sync::Arc<jsonschema::JSONSchema>,
}

impl std::fmt::Debug for ConfigSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSpec")
            .field("raw_schema", &self.raw_schema)
            .finish()
    }
}

impl Clone for ConfigSpec {
    fn clone(&self) -> Self {
        ConfigSpec {
            raw_schema: self.raw_schema.clone(),
            schema: std::sync::Arc::clone(&self.schema),
        }
    }
}

impl ConfigSpec {
    /// Compiles a JSON-schema document (expressed as YAML for readability)
    /// into a reusable validator.
    pub fn from_schema(conf: &str) -> Result<Self, Error> {
        let v: Value = serde_yaml::from_str(conf)?;
        let intermediate = serde_json::to_string(&v)?;
        let f: serde_json::Value = serde_json::from_str(&intermediate)?;

        let schema = jsonschema::JSONSchema::options()
            .with_draft(jsonschema::Draft::Draft7)
            .compile(&f)
            .map_err(|e| Error::InvalidValidationSchema(format!("{e}")))?;

        Ok(ConfigSpec {
            raw_schema: conf.into(),
            schema: std::sync::Arc::new(schema),
        })
    }

    /// Validates YAML `content` (a transform's `settings`) against this
    /// schema.
    pub fn validate(&self, content: &Value) -> Result<(), Error> {
        let intermediate = serde_json::to_string(content)?;
        let f: serde_json::Value = serde_json::from_str(&intermediate)?;

        if let Err(errors) = self.schema.validate(&f) {
            let errs: Vec<String> = errors.map(|e| format!("{e}")).collect();
            error!(errors = errs.join("; "), "schema validation failed");
            return Err(Error::ConfigFailedValidation(errs.join("; ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_selector_rejects_lopsided_config() {
        let sel = ObjectSelector {
            key: "a".into(),
            set_key: "".into(),
            batch_key: "".into(),
        };
        assert!(sel.validate().is_err());
    }

    #[test]
    fn object_selector_allows_both_empty() {
        let sel = ObjectSelector::default();
        assert!(sel.validate().is_ok());
        assert!(!sel.is_object_mode());
    }

    #[test]
    fn object_selector_allows_both_populated() {
        let sel = ObjectSelector {
            key: "a".into(),
            set_key: "b".into(),
            batch_key: "".into(),
        };
        assert!(sel.validate().is_ok());
        assert!(sel.is_object_mode());
    }

    #[test]
    fn parses_pipeline_from_yaml() {
        let yaml = "
label: test
transforms:
  - type: object_to_string
    settings:
      object:
        key: a
        set_key: b
";
        let cfg: Config = yaml.parse().unwrap();
        assert_eq!(cfg.label.as_deref(), Some("test"));
        assert_eq!(cfg.transforms.len(), 1);
        assert_eq!(cfg.transforms[0].type_tag, "object_to_string");
    }
}
