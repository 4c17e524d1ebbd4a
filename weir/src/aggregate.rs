//! The batching engine shared by every sink-like transform.
//!
//! An [`Aggregator`] owns a map from batch key to [`Bucket`]; buckets are
//! bounded by count, total byte size, and wall-clock duration since the first
//! item was added. The aggregator is never shared across transforms and
//! performs no locking of its own — whichever transform owns it serializes
//! access with its own mutex (see `transforms::send_aws_sqs` for the
//! canonical example).
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-key buffer state.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    items: Vec<Vec<u8>>,
    total_bytes: usize,
    count: usize,
    first_added_at: Option<Instant>,
}

impl Bucket {
    /// Buffered byte-slices, in insertion order.
    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }

    /// Sum of the lengths of all buffered items.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Number of buffered items.
    pub fn count(&self) -> usize {
        self.count
    }

    /// When the first item was added to this (now non-empty) bucket.
    pub fn first_added_at(&self) -> Option<Instant> {
        self.first_added_at
    }
}

/// Thresholds a bucket must stay within.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Maximum number of items per bucket.
    pub max_count: usize,
    /// Maximum total bytes per bucket.
    pub max_bytes: usize,
    /// Maximum wall-clock duration a bucket may remain open.
    pub max_duration: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            max_count: usize::MAX,
            max_bytes: usize::MAX,
            max_duration: Duration::MAX,
        }
    }
}

/// A mapping from batch-key to buffered byte slices, bounded by
/// [`AggregatorConfig`].
#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    buckets: HashMap<String, Bucket>,
}

impl Aggregator {
    /// Creates a new, empty aggregator with the given thresholds.
    pub fn new(config: AggregatorConfig) -> Self {
        Aggregator {
            config,
            buckets: HashMap::new(),
        }
    }

    /// Adds `datum` to the bucket named `key`.
    ///
    /// If adding `datum` would exceed any of `max_count`, `max_bytes`, or
    /// `max_duration` *after* insertion, the datum is rejected and `true`
    /// ("full") is returned with the bucket left unchanged — the caller must
    /// flush and retry. Otherwise the datum is appended and `false` is
    /// returned.
    ///
    /// An empty bucket's first item always satisfies the count (1) and
    /// duration (0) checks, so in practice only `max_bytes` can reject a
    /// bucket's very first item; the caller is expected to have already
    /// rejected any single item larger than the sink's per-record limit
    /// before calling `add` (see §4.6's oversize-rejection step).
    pub fn add(&mut self, key: &str, datum: Vec<u8>) -> bool {
        let now = Instant::now();
        let bucket = self.buckets.entry(key.to_string()).or_default();

        let prospective_count = bucket.count + 1;
        let prospective_bytes = bucket.total_bytes + datum.len();
        let started_at = bucket.first_added_at.unwrap_or(now);
        let prospective_duration = now.saturating_duration_since(started_at);

        if prospective_count > self.config.max_count
            || prospective_bytes > self.config.max_bytes
            || prospective_duration > self.config.max_duration
        {
            return true;
        }

        bucket.first_added_at.get_or_insert(now);
        bucket.items.push(datum);
        bucket.total_bytes = prospective_bytes;
        bucket.count = prospective_count;
        false
    }

    /// Snapshot of the buffered items for `key`.
    pub fn get(&self, key: &str) -> Vec<Vec<u8>> {
        self.buckets
            .get(key)
            .map(|b| b.items.clone())
            .unwrap_or_default()
    }

    /// Number of items currently buffered for `key`.
    pub fn count(&self, key: &str) -> usize {
        self.buckets.get(key).map(|b| b.count).unwrap_or(0)
    }

    /// All buckets, keyed by batch key.
    pub fn get_all(&self) -> &HashMap<String, Bucket> {
        &self.buckets
    }

    /// Empties the named bucket.
    pub fn reset(&mut self, key: &str) {
        self.buckets.remove(key);
    }

    /// Empties every bucket.
    pub fn reset_all(&mut self) {
        self.buckets.clear();
    }
}
