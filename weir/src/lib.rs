//! Weir is a configurable, streaming message-transformation pipeline.
//!
//! Operators describe a directed pipeline of named transforms in a declarative
//! YAML configuration; the runtime instantiates transforms, routes messages
//! through them, batches output when appropriate, and emits results to
//! external sinks (cloud queues, streams, files).
use std::pin::Pin;
use thiserror::Error;

pub mod accessor;
pub mod aggregate;
pub mod aws;
pub mod config;
pub mod kv;
pub mod message;
pub mod runtime;
pub mod transforms;

pub use aggregate::{Aggregator, AggregatorConfig, Bucket};
pub use message::{Message, MessageBatch};
pub use runtime::{Context, Pipeline};

/// Errors produced throughout the transform runtime.
///
/// Uses `thiserror` for ergonomic error handling with proper `std::error::Error`
/// implementation. Errors that wrap other errors use `#[from]`/`#[source]` for
/// proper error chaining.
#[derive(Debug, Error)]
pub enum Error {
    /// Yaml parsing errors found within the declarative pipeline configuration.
    #[error("unable to parse YAML configuration")]
    UnableToParseYaml(
        #[from]
        #[source]
        serde_yaml::Error,
    ),

    /// JSON serialization is used to run jsonschema validation against the
    /// YAML configuration after it has been converted to JSON.
    #[error("unable to serialize JSON object")]
    UnableToSerializeJsonObject(
        #[from]
        #[source]
        serde_json::Error,
    ),

    /// Schema or semantic validation errors discovered while decoding a
    /// transform's configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The provided jsonschema document for a transform is itself invalid.
    #[error("invalid validation schema: {0}")]
    InvalidValidationSchema(String),

    /// Configuration provided to a transform failed schema or semantic
    /// validation.
    #[error("configuration validation failed: {0}")]
    ConfigFailedValidation(String),

    /// A `type_tag` was referenced in a pipeline configuration that has no
    /// registered factory.
    #[error("transform not registered: {0}")]
    TransformNotFound(String),

    /// A transform of the same type tag has already been registered.
    #[error("duplicate registered transform: {0}")]
    DuplicateRegisteredName(String),

    /// Unable to secure the internal registry lock.
    #[error("internal error: unable to secure lock")]
    UnableToSecureLock,

    /// Raised by `Transform::transform` when processing a message fails.
    #[error("transform failure: {0}")]
    ProcessingError(String),

    /// Raised when a nested/auxiliary transform fails; wraps the parent's
    /// identifier per §7.5 of the design (downstream transform errors are
    /// wrapped with the parent's identifier before being returned).
    #[error("transform {parent} failed: {source}")]
    NestedProcessingError {
        /// Identifier (type tag or label) of the parent transform.
        parent: String,
        /// Underlying error from the nested transform.
        #[source]
        source: Box<Error>,
    },

    /// A single record exceeded the sink's per-record size limit.
    #[error("record size exceeded sink limit")]
    RecordSizeExceeded,

    /// A batch could not be reduced below its configured thresholds even
    /// after a flush; the aggregator configuration is inconsistent with the
    /// data being sent through it.
    #[error("batch misconfigured: single record does not fit within thresholds after flush")]
    BatchMisconfigured,

    /// Raised by read-only key-value stores when `Set` is called.
    #[error("set not supported by this key-value store")]
    SetNotSupported,

    /// Failure while submitting a batch to an external sink.
    #[error("output error: {0}")]
    OutputError(String),

    /// Failure while fetching or validating a key-value store's backing blob.
    #[error("key-value store error: {0}")]
    KvError(String),
}

/// Callback stored by the registry: accepts a transform's raw YAML settings
/// and constructs the boxed transform. Mirrors the teacher's
/// `config::Callback` shape so that `#[transform_registration_func]` can
/// rewrite ordinary-looking factory functions into this pinned-future form.
pub type Callback =
    fn(serde_yaml::Value) -> Pin<Box<dyn std::future::Future<Output = Result<ExecutionType, Error>> + Send>>;

/// A constructed transform, ready to be wired into a [`Pipeline`].
pub enum ExecutionType {
    /// A constructed [`transforms::Transform`].
    Transform(Box<dyn transforms::Transform>),
}
