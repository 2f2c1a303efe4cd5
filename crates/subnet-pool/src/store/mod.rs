//! The table-store seam the loader writes through.
//!
//! A store owns one or more allocation tables and exposes the four operations
//! a bulk load needs: a bounded scan for the idempotency check, the
//! throughput control plane (request + wait for ready), and a batched put
//! that may hand back part of the batch as unprocessed.
//!
//! [`MemoryTableStore`] is the in-process implementation. It models the
//! per-call item limit and the write-unit throttling of a managed store, which
//! makes it usable both for local runs and for exercising the retry path.

mod memory;

pub use memory::*;

use crate::record::AllocationRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Per-call item limit of a batched write.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;

/// Provisioned read/write capacity of a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Throughput {
    pub read_units: u64,
    pub write_units: u64,
}

impl Throughput {
    /// Elevated profile requested for the duration of a bulk load.
    pub const BOOST: Self = Self::new(10, 2000);

    /// Profile a table is provisioned with, and restored to after a load.
    pub const BASELINE: Self = Self::new(10, 5);

    pub const fn new(read_units: u64, write_units: u64) -> Self {
        Self {
            read_units,
            write_units,
        }
    }
}

/// Errors reported by a [`TableStore`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("table `{table}` does not exist")]
    TableNotFound { table: String },

    /// The batch exceeded the store's per-call item limit.
    #[error("batch of {size} records exceeds the per-call limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// Any other failure reported by the backing service.
    #[error("{message}")]
    Service { message: String },
}

/// The operations the bulk loader consumes from a key-value store.
///
/// Implementations must be safe to share across tasks; the loader never
/// issues two calls for the same table concurrently.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Counts the records in `table`, reading at most `limit` of them.
    async fn scan(&self, table: &str, limit: usize) -> Result<usize, StoreError>;

    /// Requests a new throughput profile. The change may not be in effect
    /// until [`TableStore::wait_until_ready`] returns.
    async fn update_throughput(&self, table: &str, throughput: Throughput)
    -> Result<(), StoreError>;

    /// Blocks until the table accepts writes under its current profile.
    async fn wait_until_ready(&self, table: &str) -> Result<(), StoreError>;

    /// Writes `records` and returns the subset the store did not process.
    ///
    /// An empty return means the whole batch was written. `records` must not
    /// exceed [`TableStore::max_batch_size`].
    async fn batch_write(
        &self,
        table: &str,
        records: &[AllocationRecord],
    ) -> Result<Vec<AllocationRecord>, StoreError>;

    /// Hard per-call item limit of [`TableStore::batch_write`].
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

#[async_trait]
impl<T> TableStore for Arc<T>
where
    T: TableStore + ?Sized,
{
    async fn scan(&self, table: &str, limit: usize) -> Result<usize, StoreError> {
        (**self).scan(table, limit).await
    }

    async fn update_throughput(
        &self,
        table: &str,
        throughput: Throughput,
    ) -> Result<(), StoreError> {
        (**self).update_throughput(table, throughput).await
    }

    async fn wait_until_ready(&self, table: &str) -> Result<(), StoreError> {
        (**self).wait_until_ready(table).await
    }

    async fn batch_write(
        &self,
        table: &str,
        records: &[AllocationRecord],
    ) -> Result<Vec<AllocationRecord>, StoreError> {
        (**self).batch_write(table, records).await
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }
}
