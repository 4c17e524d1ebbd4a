//! Shared control-flow core for every stateful sink transform, grounded in
//! `original_source/transform/send_aws_sqs.go`'s `Transform`/`send`/
//! `sendMessages` trio (and mirrored by `send_aws_kinesis_data_firehose.go`'s
//! simpler single-shot submission). Not itself a registered transform type —
//! `send_aws_sqs`, `send_aws_kinesis_data_firehose`, and
//! `send_aws_kinesis_data_streams` each wrap a [`SinkCore`] with their own
//! [`BatchClient`] implementation and per-API size limits.
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{run_chain, Transform};
use crate::aggregate::{Aggregator, AggregatorConfig};
use crate::config::ObjectSelector;
use crate::runtime::Context;
use crate::{Error, Message, MessageBatch};

/// One item queued for submission: its position in the batch handed to
/// [`BatchClient::submit`] (so partial failures can be resubmitted by
/// index) and its payload.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub index: usize,
    pub payload: Vec<u8>,
}

/// Abstracts a cloud batch-put endpoint down to the shape §6 describes:
/// "abstract clients exposing `PutRecordBatch`/`SendMessageBatch`". A
/// submission reports which entries (by their original `index`) failed and
/// should be resubmitted; an empty result means every entry succeeded.
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Submits `entries` (already known to respect the per-record and
    /// per-batch limits) and returns the subset that failed. `ctx` is
    /// always a [`Context::detached`] value supplied by [`SinkCore::flush`].
    async fn submit(&self, ctx: &Context, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error>;
}

/// Per-sink cloud API limits (spec §4.6's table).
#[derive(Debug, Clone, Copy)]
pub struct SinkLimits {
    pub max_count: usize,
    pub max_bytes: usize,
    pub per_record: usize,
}

/// Shared buffering, flush, and partial-failure-retry machinery for a
/// stateful sink transform.
///
/// The aggregator is guarded by an internal mutex (§5: "Sink transforms
/// therefore MUST serialize `Transform` with an internal mutex"); the
/// mutex is held only across the synchronous buffer mutation, never across
/// the network submission itself, so concurrent callers are serialized at
/// the buffer but not needlessly blocked during a slow flush of someone
/// else's key.
pub struct SinkCore {
    aggregator: Mutex<Aggregator>,
    limits: SinkLimits,
    object: ObjectSelector,
    aux: Vec<Box<dyn Transform>>,
}

impl SinkCore {
    pub fn new(limits: SinkLimits, object: ObjectSelector, aux: Vec<Box<dyn Transform>>, max_duration: std::time::Duration) -> Self {
        SinkCore {
            aggregator: Mutex::new(Aggregator::new(AggregatorConfig {
                max_count: limits.max_count,
                max_bytes: limits.max_bytes,
                max_duration,
            })),
            limits,
            object,
            aux,
        }
    }

    fn batch_key(&self, message: &Message) -> String {
        if self.object.batch_key.is_empty() {
            return String::new();
        }
        message.get_value(&self.object.batch_key).render_string()
    }

    /// Sinks only ever buffer and size-check the message's raw payload
    /// (§4.6); `object` is consulted solely for `batch_key` here, matching
    /// the Go source's `Transform`, which never reads `Object.Key`/`SetKey`.
    fn payload(&self, message: &Message) -> Vec<u8> {
        message.data().to_vec()
    }

    /// Implements §4.6's per-message algorithm: a control message flushes
    /// every bucket then resets the aggregator and is forwarded; a data
    /// message too large for a single record is rejected; otherwise it is
    /// added to its bucket, flushing and retrying once if the bucket
    /// reports full.
    pub async fn handle(&self, client: &dyn BatchClient, message: Message) -> Result<MessageBatch, Error> {
        if message.is_control() {
            self.flush_all(client).await?;
            let mut agg = self.aggregator.lock().await;
            agg.reset_all();
            return Ok(vec![message]);
        }

        let payload = self.payload(&message);
        if payload.len() > self.limits.per_record {
            return Err(Error::RecordSizeExceeded);
        }

        let key = self.batch_key(&message);
        let full = {
            let mut agg = self.aggregator.lock().await;
            agg.add(&key, payload.clone())
        };

        if full {
            self.flush(client, &key).await?;
            let mut agg = self.aggregator.lock().await;
            agg.reset(&key);
            if agg.add(&key, payload) {
                return Err(Error::BatchMisconfigured);
            }
        }

        Ok(vec![message])
    }

    async fn flush_all(&self, client: &dyn BatchClient) -> Result<(), Error> {
        let keys: Vec<String> = {
            let agg = self.aggregator.lock().await;
            agg.get_all().keys().cloned().collect()
        };
        for key in keys {
            self.flush(client, &key).await?;
        }
        Ok(())
    }

    /// Runs the buffered items for `key` through the configured auxiliary
    /// transforms, then submits the result, resubmitting any entries the
    /// client reports as failed until none remain (or a full error is
    /// returned). Runs against a [`Context::detached`] value — flush never
    /// observes the caller's own cancellation (§5).
    async fn flush(&self, client: &dyn BatchClient, key: &str) -> Result<(), Error> {
        let detached = Context::detached();

        let items = {
            let agg = self.aggregator.lock().await;
            agg.get(key)
        };
        if items.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let outputs = run_chain(&self.aux, Message::Data(item)).await?;
            for out in outputs {
                entries.push(BatchEntry {
                    index,
                    payload: out.data().to_vec(),
                });
            }
        }

        self.submit_with_retry(client, &detached, entries).await
    }

    async fn submit_with_retry(&self, client: &dyn BatchClient, ctx: &Context, mut entries: Vec<BatchEntry>) -> Result<(), Error> {
        while !entries.is_empty() {
            let failed = client.submit(ctx, &entries).await?;
            if failed.len() == entries.len() {
                return Err(Error::OutputError(format!(
                    "sink: {} of {} entries failed and made no progress",
                    failed.len(),
                    entries.len()
                )));
            }
            entries = failed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingClient {
        calls: std::sync::Mutex<Vec<Vec<Vec<u8>>>>,
        fail_first_n: AtomicUsize,
    }

    impl RecordingClient {
        fn new(fail_first_n: usize) -> Self {
            RecordingClient {
                calls: std::sync::Mutex::new(Vec::new()),
                fail_first_n: AtomicUsize::new(fail_first_n),
            }
        }
    }

    #[async_trait]
    impl BatchClient for RecordingClient {
        async fn submit(&self, _ctx: &Context, entries: &[BatchEntry]) -> Result<Vec<BatchEntry>, Error> {
            self.calls
                .lock()
                .unwrap()
                .push(entries.iter().map(|e| e.payload.clone()).collect());

            let remaining = self.fail_first_n.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Ok(entries.iter().take(1).cloned().collect());
            }
            Ok(vec![])
        }
    }

    fn core(max_count: usize) -> SinkCore {
        SinkCore::new(
            SinkLimits {
                max_count,
                max_bytes: usize::MAX,
                per_record: usize::MAX,
            },
            ObjectSelector::default(),
            vec![],
            Duration::from_secs(600),
        )
    }

    #[tokio::test]
    async fn scenario_5_flushes_when_full_then_flushes_remainder_on_control() {
        let core = core(2);
        let client = RecordingClient::new(0);

        core.handle(&client, Message::Data(b"m1".to_vec())).await.unwrap();
        core.handle(&client, Message::Data(b"m2".to_vec())).await.unwrap();
        core.handle(&client, Message::Data(b"m3".to_vec())).await.unwrap();
        core.handle(&client, Message::control()).await.unwrap();

        let calls = client.calls.lock().unwrap();
        assert_eq!(*calls, vec![vec![b"m1".to_vec(), b"m2".to_vec()], vec![b"m3".to_vec()]]);

        let agg = core.aggregator.lock().await;
        assert_eq!(agg.count(""), 0);
    }

    #[tokio::test]
    async fn oversize_record_is_rejected_before_buffering() {
        let core = SinkCore::new(
            SinkLimits {
                max_count: 10,
                max_bytes: usize::MAX,
                per_record: 2,
            },
            ObjectSelector::default(),
            vec![],
            Duration::from_secs(600),
        );
        let client = RecordingClient::new(0);
        let err = core.handle(&client, Message::Data(b"too long".to_vec())).await.unwrap_err();
        assert!(matches!(err, Error::RecordSizeExceeded));
    }

    #[tokio::test]
    async fn partial_failure_is_resubmitted_until_empty() {
        let core = core(10);
        let client = RecordingClient::new(1);

        core.handle(&client, Message::Data(b"a".to_vec())).await.unwrap();
        core.handle(&client, Message::Data(b"b".to_vec())).await.unwrap();
        core.handle(&client, Message::control()).await.unwrap();

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(calls[1], vec![b"a".to_vec()]);
    }
}
