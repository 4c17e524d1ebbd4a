//! Pipeline assembly and the message-driving loop, grounded in
//! `fiddler::Runtime` (`examples/rc1405-fiddler/fiddler/src/runtime/mod.rs`):
//! resolve configuration into constructed transforms once, then drive
//! messages through them one at a time per worker.
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::{Config, ParsedConfig};
use crate::transforms::{run_chain, Transform};
use crate::{Error, ExecutionType, Message, MessageBatch};

/// Cancellation handle threaded through a running pipeline.
///
/// Mirrors the teacher's kill-switch channel in spirit: an external signal
/// aborts subsequent [`Pipeline::process`] calls promptly, but a flush
/// already in flight inside a sink transform never observes it, because
/// sinks run their submissions against a [`Context::detached`] value
/// (`context.WithoutCancel(ctx)` in the source this was ported from).
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
}

impl Context {
    /// A fresh, uncancelled context.
    pub fn new() -> Self {
        Context {
            token: CancellationToken::new(),
        }
    }

    /// Signals cancellation to every clone of this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// `true` once [`Context::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A context that is never cancelled by this one's signal, for use
    /// around a flush that must run to completion regardless of what
    /// happens to the caller's own context.
    pub fn detached() -> Self {
        Context::new()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

/// A pipeline whose transforms have been constructed from validated
/// configuration and are ready to process messages.
///
/// Stateless transforms may be cloned across workers in the teacher's model;
/// this runtime instead shares one `Arc`-free `Vec<Box<dyn Transform>>` and
/// relies on every transform guarding its own mutable state internally (§5),
/// so a single `Pipeline` can be driven concurrently by multiple callers
/// without any locking at this layer.
pub struct Pipeline {
    label: Option<String>,
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    /// Parses, validates, and instantiates every transform named in `conf`.
    pub async fn from_config(conf: &str) -> Result<Self, Error> {
        crate::transforms::register_plugins_once()?;

        let parsed: ParsedConfig = conf.parse::<Config>()?.validate().await?;
        Pipeline::build(parsed).await
    }

    /// Instantiates a pipeline from an already-validated configuration.
    pub async fn build(conf: ParsedConfig) -> Result<Self, Error> {
        let mut transforms = Vec::with_capacity(conf.transforms.len());
        for item in conf.transforms {
            let type_tag = item.type_tag.clone();
            let ExecutionType::Transform(t) = (item.creator)(item.config).await?;
            trace!(type_tag, "transform constructed");
            transforms.push(t);
        }

        debug!(label = conf.label, count = transforms.len(), "pipeline assembled");

        Ok(Pipeline {
            label: conf.label,
            transforms,
        })
    }

    /// The pipeline's optional diagnostic label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Runs `message` through every transform in order, honoring `ctx`'s
    /// cancellation before starting (not mid-flight — a transform already
    /// invoked always runs to completion).
    pub async fn process(&self, ctx: &Context, message: Message) -> Result<MessageBatch, Error> {
        if ctx.is_cancelled() {
            return Ok(vec![]);
        }
        run_chain(&self.transforms, message).await
    }

    /// Pushes a final control message through every transform, then releases
    /// each transform's held resources in order. Called once, after the
    /// driver has stopped accepting new messages (§3, Transform lifecycle).
    pub async fn close(&self) -> Result<(), Error> {
        let detached = Context::detached();
        self.process(&detached, Message::control()).await?;
        for t in &self.transforms {
            t.close().await?;
        }
        Ok(())
    }
}

/// Drives an in-memory sequence of messages through `pipeline`, one at a
/// time, returning every output in arrival order. A thin stand-in for the
/// teacher's channel-fed `input`/`message_handler`/`output` task trio (§1
/// scopes CLI entry points and concrete input/output connectors out — see
/// DESIGN.md): this runtime's "input" and "output" are whatever the caller
/// supplies and collects.
pub async fn run_all(
    pipeline: &Pipeline,
    ctx: &Context,
    messages: impl IntoIterator<Item = Message>,
) -> Result<MessageBatch, Error> {
    let mut out = Vec::new();
    for message in messages {
        if ctx.is_cancelled() {
            break;
        }
        out.extend(pipeline.process(ctx, message).await?);
    }
    Ok(out)
}

/// Spawns `fut` on the current runtime, folding a task panic into the
/// shared `Result<(), Error>` shape the way the teacher's `spawn_task`
/// helper folds a `JoinSet` join error.
pub(crate) async fn spawn_detached<F>(fut: F) -> Result<(), Error>
where
    F: std::future::Future<Output = Result<(), Error>> + Send + 'static,
{
    tokio::spawn(fut).await.map_err(|e| Error::ProcessingError(format!("{e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipeline_from_config_runs_a_single_transform() {
        let yaml = "
label: test
transforms:
  - type: object_to_string
    settings:
      object:
        key: a
        set_key: b
";
        let pipeline = Pipeline::from_config(yaml).await.unwrap();
        assert_eq!(pipeline.label(), Some("test"));

        let mut msg = Message::new();
        msg.set_value("a", serde_json::json!(42)).unwrap();

        let ctx = Context::new();
        let out = pipeline.process(&ctx, msg).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(out[0].data()).unwrap();
        assert_eq!(v["b"], serde_json::json!("42"));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_processing() {
        let yaml = "
transforms:
  - type: object_to_string
    settings:
      object:
        key: a
        set_key: b
";
        let pipeline = Pipeline::from_config(yaml).await.unwrap();
        let ctx = Context::new();
        ctx.cancel();

        let mut msg = Message::new();
        msg.set_value("a", serde_json::json!(1)).unwrap();
        let out = pipeline.process(&ctx, msg).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn run_all_collects_every_output_in_order() {
        let yaml = "
transforms:
  - type: object_to_string
    settings:
      object:
        key: a
        set_key: b
";
        let pipeline = Pipeline::from_config(yaml).await.unwrap();
        let ctx = Context::new();

        let mut m1 = Message::new();
        m1.set_value("a", serde_json::json!(1)).unwrap();
        let mut m2 = Message::new();
        m2.set_value("a", serde_json::json!(2)).unwrap();

        let out = run_all(&pipeline, &ctx, vec![m1, m2]).await.unwrap();
        assert_eq!(out.len(), 2);
    }
}
