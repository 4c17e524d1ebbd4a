//! `send_aws_sqs`: batches messages per §4.6's uniform sink algorithm and
//! submits them to an SQS queue, ported from
//! `original_source/transform/send_aws_sqs.go`.
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use uuid::Uuid;
use weir_macros::transform_registration_func;

use super::sink::{BatchClient, BatchEntry, SinkCore, SinkLimits};
use super::Transform;
use crate::aws::{sqs_queue_url, Arn};
use crate::config::{AwsSettings, BatchSettings, ConfigSpec, ItemType, ObjectSelector};
use crate::runtime::Context;
use crate::{Error, ExecutionType, Message, MessageBatch};

/// Records greater than 256 KiB cannot be put into an SQS queue (spec
/// §4.6's table; the source's own `sendSQSMessageSizeLimit` constant is an
/// apparent unit-mismatch bug — see DESIGN.md).
const SQS_MESSAGE_SIZE_LIMIT: usize = 256 * 1024;
/// SQS limits a single `SendMessageBatch` call to 10 entries.
const SQS_BATCH_COUNT_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
struct SendAwsSqsConfig {
    #[serde(default)]
    object: ObjectSelector,
    #[serde(default)]
    batch: BatchSettings,
    aws: AwsSettings,
}

impl SendAwsSqsConfig {
    /// `object.key`/`object.set_key` don't apply to sinks (§4.6 buffers
    /// `msg.Data()` only) so their XOR symmetry isn't enforced here; only
    /// `object.batch_key` is meaningful.
    fn validate(&self) -> Result<(), Error> {
        if self.aws.arn.is_empty() {
            return Err(Error::ConfigFailedValidation("send_aws_sqs: aws.arn is required".into()));
        }
        Ok(())
    }
}

/// Submits an already-bounded batch via `SendMessageBatch`, resolving FIFO
/// queues' `.fifo` suffix into a single `message_group_id` generated once
/// per submission call, matching the source's `sendMessages`.
#[async_trait]
trait SqsApi: Send + Sync {
    async fn send_message_batch(&self, queue_url: &str, message_group_id: Option<&str>, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error>;
}

struct SendAwsSqs {
    conf: SendAwsSqsConfig,
    queue_url: String,
    api: Box<dyn SqsApi>,
    core: SinkCore,
}

#[async_trait]
impl BatchClient for SendAwsSqs {
    async fn submit(&self, _ctx: &Context, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error> {
        let mgid = if self.queue_url.ends_with(".fifo") {
            Some(Uuid::new_v4().to_string())
        } else {
            None
        };

        let mut failed = Vec::new();
        for chunk in entries.chunks(SQS_BATCH_COUNT_LIMIT) {
            let chunk_failed = self
                .api
                .send_message_batch(&self.queue_url, mgid.as_deref(), chunk)
                .await?;
            failed.extend(chunk_failed);
        }
        Ok(failed)
    }
}

#[async_trait]
impl Transform for SendAwsSqs {
    async fn transform(&self, message: Message) -> Result<MessageBatch, Error> {
        self.core.handle(self, message).await
    }

    fn describe(&self) -> String {
        format!("{{\"aws\":{{\"arn\":\"{}\"}}}}", self.conf.aws.arn)
    }
}

#[cfg(feature = "aws")]
mod live {
    use super::*;
    use aws_sdk_sqs::types::SendMessageBatchRequestEntry;
    use aws_sdk_sqs::Client;

    pub struct LiveSqsApi {
        pub client: Client,
    }

    #[async_trait]
    impl SqsApi for LiveSqsApi {
        async fn send_message_batch(&self, queue_url: &str, message_group_id: Option<&str>, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error> {
            let mut request_entries = Vec::with_capacity(entries.len());
            for e in entries {
                let body = String::from_utf8_lossy(&e.payload).into_owned();
                let mut builder = SendMessageBatchRequestEntry::builder()
                    .id(e.index.to_string())
                    .message_body(body);
                if let Some(mgid) = message_group_id {
                    builder = builder.message_group_id(mgid);
                }
                let built = builder
                    .build()
                    .map_err(|e| Error::OutputError(format!("send_aws_sqs: {e}")))?;
                request_entries.push(built);
            }

            let resp = self
                .client
                .send_message_batch()
                .queue_url(queue_url)
                .set_entries(Some(request_entries))
                .send()
                .await
                .map_err(|e| Error::OutputError(format!("send_aws_sqs: {e}")))?;

            let mut failed = Vec::new();
            for f in resp.failed() {
                let idx: usize = f
                    .id()
                    .parse()
                    .map_err(|_| Error::OutputError("send_aws_sqs: malformed failed entry id".into()))?;
                if let Some(entry) = entries.iter().find(|e| e.index == idx) {
                    failed.push(entry.clone());
                }
            }
            Ok(failed)
        }
    }

    pub async fn build_client(arn: &crate::aws::Arn, settings: &crate::config::AwsSettings) -> Result<Client, Error> {
        let sdk_config = crate::aws::client::load_sdk_config(arn, settings, None).await?;
        Ok(Client::new(&sdk_config))
    }
}

#[transform_registration_func]
fn create_send_aws_sqs(conf: Value) -> Result<ExecutionType, Error> {
    let c: SendAwsSqsConfig = serde_yaml::from_value(conf)?;
    c.validate()?;

    let arn = Arn::parse(&c.aws.arn)?;
    let queue_url = sqs_queue_url(&arn);

    #[cfg(feature = "aws")]
    let api: Box<dyn SqsApi> = Box::new(live::LiveSqsApi {
        client: live::build_client(&arn, &c.aws).await?,
    });
    #[cfg(not(feature = "aws"))]
    let api: Box<dyn SqsApi> = return Err(Error::ConfigFailedValidation(
        "send_aws_sqs: requires the `aws` feature".into(),
    ));

    let core = SinkCore::new(
        SinkLimits {
            max_count: SQS_BATCH_COUNT_LIMIT,
            max_bytes: SQS_MESSAGE_SIZE_LIMIT,
            per_record: SQS_MESSAGE_SIZE_LIMIT,
        },
        c.object.clone(),
        vec![],
        c.batch.effective_duration(),
    );

    Ok(ExecutionType::Transform(Box::new(SendAwsSqs {
        conf: c,
        queue_url,
        api,
        core,
    })))
}

pub(crate) fn register_plugin() -> Result<(), Error> {
    let schema = "type: object
properties:
  object:
    type: object
  batch:
    type: object
  aws:
    type: object
required:
  - aws";
    let spec = ConfigSpec::from_schema(schema)?;
    crate::config::register_plugin("send_aws_sqs".into(), ItemType::Transform, spec, create_send_aws_sqs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct FakeSqsApi {
        calls: Arc<StdMutex<Vec<Vec<String>>>>,
    }

    #[async_trait]
    impl SqsApi for FakeSqsApi {
        async fn send_message_batch(&self, _queue_url: &str, _mgid: Option<&str>, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error> {
            self.calls
                .lock()
                .unwrap()
                .push(entries.iter().map(|e| String::from_utf8_lossy(&e.payload).into_owned()).collect());
            Ok(vec![])
        }
    }

    fn transform(max_count: usize) -> (SendAwsSqs, Arc<StdMutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let tf = SendAwsSqs {
            conf: SendAwsSqsConfig {
                object: ObjectSelector::default(),
                batch: BatchSettings::default(),
                aws: AwsSettings {
                    arn: "arn:aws:sqs:us-east-1:123456789012:q".into(),
                    assume_role_arn: None,
                    endpoint_url: None,
                },
            },
            queue_url: "https://sqs.us-east-1.amazonaws.com/123456789012/q".into(),
            api: Box::new(FakeSqsApi { calls: calls.clone() }),
            core: SinkCore::new(
                SinkLimits {
                    max_count,
                    max_bytes: usize::MAX,
                    per_record: usize::MAX,
                },
                ObjectSelector::default(),
                vec![],
                Duration::from_secs(600),
            ),
        };
        (tf, calls)
    }

    #[tokio::test]
    async fn scenario_5_batches_at_max_count_and_flushes_remainder_on_control() {
        let (tf, calls) = transform(2);

        tf.transform(Message::Data(b"m1".to_vec())).await.unwrap();
        tf.transform(Message::Data(b"m2".to_vec())).await.unwrap();
        tf.transform(Message::Data(b"m3".to_vec())).await.unwrap();
        tf.transform(Message::control()).await.unwrap();

        let recorded = calls.lock().unwrap();
        assert_eq!(*recorded, vec![vec!["m1".to_string(), "m2".to_string()], vec!["m3".to_string()]]);
    }

    #[tokio::test]
    async fn control_message_passes_through() {
        let (tf, _calls) = transform(2);
        let out = tf.transform(Message::control()).await.unwrap();
        assert_eq!(out, vec![Message::control()]);
    }

    #[test]
    fn rejects_missing_arn() {
        let conf = SendAwsSqsConfig {
            object: ObjectSelector::default(),
            batch: BatchSettings::default(),
            aws: AwsSettings::default(),
        };
        assert!(conf.validate().is_err());
    }
}
