use crate::{error::Error, store::StoreError};

/// Result of a successful [`BulkLoader::ensure_populated`] call.
///
/// [`BulkLoader::ensure_populated`]: crate::BulkLoader::ensure_populated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The table already held records; nothing was written.
    Skipped,
    /// The plan was written.
    Loaded(LoadSummary),
}

/// Counters gathered while writing a plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Batches submitted.
    pub batches: usize,
    /// Records the store acknowledged.
    pub records: usize,
    /// Re-submissions of unprocessed records, across all batches.
    pub retries: usize,
    /// Records still unprocessed when their batch ran out of retries. Only
    /// non-zero when unprocessed records are tolerated.
    pub unprocessed: usize,
}

/// Why a load did not complete.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The idempotency scan failed; nothing was written.
    #[error("scan of table `{table}` failed: {source}")]
    Scan {
        table: String,
        #[source]
        source: StoreError,
    },

    /// A batched write failed. Later batches were not attempted.
    #[error("batch {batch} of {batches} failed: {source}")]
    Batch {
        batch: usize,
        batches: usize,
        #[source]
        source: StoreError,
    },

    /// A batch still had unprocessed records after the last retry.
    #[error("batch {batch} left {unprocessed} records unprocessed after {retries} retries")]
    RetriesExhausted {
        batch: usize,
        unprocessed: usize,
        retries: u32,
    },

    /// The loader configuration was rejected.
    #[error(transparent)]
    Config(#[from] Error),

    /// The load was cancelled before it finished.
    #[error("load cancelled")]
    Cancelled,
}
