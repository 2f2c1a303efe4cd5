use crate::{plan::PartitionLayout, retry::Backoff, store::DEFAULT_MAX_BATCH_SIZE, store::Throughput};

/// Tunables for a [`BulkLoader`].
///
/// [`BulkLoader`]: crate::BulkLoader
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Layout of the plan written into empty tables.
    pub layout: PartitionLayout,
    /// Records per batched write; bounded by the store's per-call limit.
    pub batch_limit: usize,
    /// Retry schedule for unprocessed records.
    pub backoff: Backoff,
    /// Profile requested before writing.
    pub boost: Throughput,
    /// Profile restored after writing.
    pub baseline: Throughput,
    /// Keep going when a batch still has unprocessed records after the last
    /// retry, instead of failing the load.
    pub tolerate_unprocessed: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            layout: PartitionLayout::REFERENCE,
            batch_limit: DEFAULT_MAX_BATCH_SIZE,
            backoff: Backoff::default(),
            boost: Throughput::BOOST,
            baseline: Throughput::BASELINE,
            tolerate_unprocessed: false,
        }
    }
}
