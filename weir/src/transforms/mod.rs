//! Transform contract, registry wiring, and the concrete transforms that
//! implement the pipeline's message-processing vocabulary.
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::{Error, Message, MessageBatch};

pub mod format;
pub mod kv_enrich;
pub mod meta_for_each;
pub mod object_to_string;
pub mod regex_capture;
pub mod send_aws_kinesis_data_firehose;
pub mod send_aws_kinesis_data_streams;
pub mod send_aws_sqs;
pub(crate) mod sink;
pub mod str_capture_named_group;

/// Every transform exposes the same three operations: process a message,
/// release held resources on shutdown, and describe its own configuration
/// for diagnostics.
///
/// `transform` takes `&self` rather than `&mut self`: transforms that hold
/// mutable state (an aggregator, a cached client handle) guard it with their
/// own internal [`tokio::sync::Mutex`], matching the upstream Go source's
/// `sync.Mutex` field + lock/unlock pattern. This lets the same transform
/// instance be shared across pipeline workers (§5).
#[async_trait]
pub trait Transform: Send + Sync {
    /// Processes `message` and returns zero or more output messages, in the
    /// order they should be forwarded. A single input may fan out to several
    /// outputs or be filtered to zero. An `Err` aborts processing of the
    /// current message.
    async fn transform(&self, message: Message) -> Result<MessageBatch, Error>;

    /// Releases any held resources. Called once, after the driver has pushed
    /// a final control message through the pipeline.
    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Human-readable dump of this transform's configuration, used for
    /// diagnostics and logging.
    fn describe(&self) -> String;
}

/// Applies a chain of transforms to a single message, feeding each stage's
/// output into the next (fan-out is threaded through: if a stage emits N
/// messages, the next stage runs once per message and all of its outputs
/// continue on). Used by sink transforms to run a flushed batch through its
/// configured auxiliary transforms before handing it to the external client
/// (§4.6), and is the general "meta_pipeline" composition primitive the
/// design notes call out as not needing its own registered type tag.
pub async fn run_chain(chain: &[Box<dyn Transform>], message: Message) -> Result<MessageBatch, Error> {
    let mut stage = vec![message];
    for t in chain {
        let mut next = Vec::with_capacity(stage.len());
        for m in stage {
            let out = t.transform(m).await?;
            next.extend(out);
        }
        stage = next;
    }
    Ok(stage)
}

/// Registers every built-in transform's factory with the global registry.
/// Idempotent only in the sense that the process calls it once at startup;
/// calling it twice returns [`Error::DuplicateRegisteredName`] from whichever
/// transform is registered second.
pub(crate) fn register_plugins() -> Result<(), Error> {
    format::register_plugins()?;
    object_to_string::register_plugin()?;
    regex_capture::register_plugins()?;
    str_capture_named_group::register_plugin()?;
    meta_for_each::register_plugin()?;
    kv_enrich::register_plugin()?;
    send_aws_sqs::register_plugin()?;
    send_aws_kinesis_data_firehose::register_plugin()?;
    send_aws_kinesis_data_streams::register_plugin()?;
    Ok(())
}

static REGISTER: Once = Once::new();
static REGISTER_ERROR: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

/// Runs [`register_plugins`] exactly once per process, matching the
/// teacher's `Runtime::from_config` guard. Safe to call from every
/// [`crate::runtime::Pipeline`] assembly; a registration failure on the
/// first call is cached and replayed on every later call.
pub(crate) fn register_plugins_once() -> Result<(), Error> {
    REGISTER.call_once(|| {
        if let Err(e) = register_plugins() {
            if let Ok(mut slot) = REGISTER_ERROR.lock() {
                *slot = Some(format!("{e}"));
            }
        }
    });

    if let Ok(slot) = REGISTER_ERROR.lock() {
        if let Some(msg) = slot.as_ref() {
            return Err(Error::ConfigFailedValidation(format!("plugin registration failed: {msg}")));
        }
    }
    Ok(())
}
