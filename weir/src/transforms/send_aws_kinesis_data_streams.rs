//! `send_aws_kinesis_data_streams`: batches messages per §4.6's uniform
//! sink algorithm and submits them to a Kinesis data stream with
//! `PutRecords`.
//!
//! No Go source for this sink exists in the retrieval pack; the algorithm
//! is shared with `send_aws_sqs`/`send_aws_kinesis_data_firehose` via
//! `SinkCore`, and the client is grounded on
//! `fiddler::modules::aws::aws_kinesis`'s `KinesisOutput::write_batch`
//! (random per-record partition key, per-record failure reporting via
//! `PutRecords`' ordered result list).
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;
use uuid::Uuid;
use weir_macros::transform_registration_func;

use super::sink::{BatchClient, BatchEntry, SinkCore, SinkLimits};
use super::Transform;
use crate::aws::Arn;
use crate::config::{AwsSettings, BatchSettings, ConfigSpec, ItemType, ObjectSelector};
use crate::runtime::Context;
use crate::{Error, ExecutionType, Message, MessageBatch};

/// Records greater than 1 MiB cannot be put into a Kinesis data stream
/// (spec §4.6's table).
const KINESIS_RECORD_SIZE_LIMIT: usize = 1024 * 1024;
/// A single `PutRecords` call is limited to 5 MiB total.
const KINESIS_BATCH_BYTE_LIMIT: usize = 5 * 1024 * 1024;
/// A single `PutRecords` call is limited to 500 records.
const KINESIS_BATCH_COUNT_LIMIT: usize = 500;

#[derive(Debug, Clone, Deserialize)]
struct SendAwsKinesisConfig {
    #[serde(default)]
    object: ObjectSelector,
    #[serde(default)]
    batch: BatchSettings,
    aws: AwsSettings,
    /// Fixed partition key for every record. When unset, each record gets
    /// its own random partition key, matching the teacher's
    /// `KinesisOutputConfig::partition_key` default.
    #[serde(default)]
    partition_key: Option<String>,
}

impl SendAwsKinesisConfig {
    /// `object.key`/`object.set_key` don't apply to sinks (§4.6 buffers
    /// `msg.Data()` only) so their XOR symmetry isn't enforced here; only
    /// `object.batch_key` is meaningful.
    fn validate(&self) -> Result<(), Error> {
        if self.aws.arn.is_empty() {
            return Err(Error::ConfigFailedValidation(
                "send_aws_kinesis_data_streams: aws.arn is required".into(),
            ));
        }
        Ok(())
    }
}

/// Submits an already-bounded batch via `PutRecords`, reporting the subset
/// of entries whose result carries an error code.
#[async_trait]
trait KinesisApi: Send + Sync {
    async fn put_records(&self, stream_name: &str, partition_key: Option<&str>, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error>;
}

struct SendAwsKinesis {
    conf: SendAwsKinesisConfig,
    stream_name: String,
    api: Box<dyn KinesisApi>,
    core: SinkCore,
}

#[async_trait]
impl BatchClient for SendAwsKinesis {
    async fn submit(&self, _ctx: &Context, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error> {
        let mut failed = Vec::new();
        for chunk in entries.chunks(KINESIS_BATCH_COUNT_LIMIT) {
            let chunk_failed = self
                .api
                .put_records(&self.stream_name, self.conf.partition_key.as_deref(), chunk)
                .await?;
            failed.extend(chunk_failed);
        }
        Ok(failed)
    }
}

#[async_trait]
impl Transform for SendAwsKinesis {
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
    use aws_sdk_kinesis::primitives::Blob;
    use aws_sdk_kinesis::types::PutRecordsRequestEntry;
    use aws_sdk_kinesis::Client;

    pub struct LiveKinesisApi {
        pub client: Client,
    }

    #[async_trait]
    impl KinesisApi for LiveKinesisApi {
        async fn put_records(&self, stream_name: &str, partition_key: Option<&str>, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error> {
            let records: Vec<PutRecordsRequestEntry> = entries
                .iter()
                .map(|e| {
                    let pk = partition_key.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string());
                    PutRecordsRequestEntry::builder()
                        .data(Blob::new(e.payload.clone()))
                        .partition_key(pk)
                        .build()
                        .map_err(|e| Error::OutputError(format!("send_aws_kinesis_data_streams: {e}")))
                })
                .collect::<Result<_, _>>()?;

            let resp = self
                .client
                .put_records()
                .stream_name(stream_name)
                .set_records(Some(records))
                .send()
                .await
                .map_err(|e| Error::OutputError(format!("send_aws_kinesis_data_streams: {e}")))?;

            let mut failed = Vec::new();
            for (entry, result) in entries.iter().zip(resp.records()) {
                if result.error_code().is_some() {
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
fn create_send_aws_kinesis_data_streams(conf: Value) -> Result<ExecutionType, Error> {
    let c: SendAwsKinesisConfig = serde_yaml::from_value(conf)?;
    c.validate()?;

    let arn = Arn::parse(&c.aws.arn)?;
    let stream_name = arn.resource.clone();

    #[cfg(feature = "aws")]
    let api: Box<dyn KinesisApi> = Box::new(live::LiveKinesisApi {
        client: live::build_client(&arn, &c.aws).await?,
    });
    #[cfg(not(feature = "aws"))]
    let api: Box<dyn KinesisApi> = return Err(Error::ConfigFailedValidation(
        "send_aws_kinesis_data_streams: requires the `aws` feature".into(),
    ));

    let core = SinkCore::new(
        SinkLimits {
            max_count: KINESIS_BATCH_COUNT_LIMIT,
            max_bytes: KINESIS_BATCH_BYTE_LIMIT,
            per_record: KINESIS_RECORD_SIZE_LIMIT,
        },
        c.object.clone(),
        vec![],
        c.batch.effective_duration(),
    );

    Ok(ExecutionType::Transform(Box::new(SendAwsKinesis {
        conf: c,
        stream_name,
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
  partition_key:
    type: string
required:
  - aws";
    let spec = ConfigSpec::from_schema(schema)?;
    crate::config::register_plugin(
        "send_aws_kinesis_data_streams".into(),
        ItemType::Transform,
        spec,
        create_send_aws_kinesis_data_streams,
    )
}
