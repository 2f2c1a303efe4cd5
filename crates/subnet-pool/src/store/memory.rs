use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    record::{AllocationRecord, RoutingDomain},
    store::{DEFAULT_MAX_BATCH_SIZE, StoreError, TableStore, Throughput},
};

/// Lifecycle state of a table's provisioned throughput.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableStatus {
    Active,
    /// A throughput change was requested and has not settled yet.
    Updating,
}

#[derive(Debug)]
struct MemoryTable {
    items: BTreeMap<Ipv4Addr, RoutingDomain>,
    throughput: Throughput,
    status: TableStatus,
}

/// An in-process [`TableStore`].
///
/// Tables must be created with [`MemoryTableStore::create_table`] before use,
/// mirroring a store whose tables are provisioned by infrastructure rather
/// than by the loader.
///
/// Write throttling is modeled per call: a batch write accepts at most
/// `write_units` records of the table's current profile and returns the rest
/// as unprocessed. A table at the baseline of 5 write units therefore needs
/// several retries per 25-record batch, while a boosted table takes each batch
/// in one call.
#[derive(Debug)]
pub struct MemoryTableStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
    max_batch_size: usize,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            max_batch_size,
        }
    }

    /// Creates an empty, active table. Creating an existing table is a no-op.
    pub fn create_table(&self, table: impl Into<String>, throughput: Throughput) {
        self.tables
            .lock()
            .entry(table.into())
            .or_insert_with(|| MemoryTable {
                items: BTreeMap::new(),
                throughput,
                status: TableStatus::Active,
            });
    }

    /// All records of `table` in address order.
    pub fn records(&self, table: &str) -> Result<Vec<AllocationRecord>, StoreError> {
        self.with_table(table, |t| {
            t.items
                .iter()
                .map(|(cidr, domain)| AllocationRecord::new(*cidr, *domain))
                .collect()
        })
    }

    pub fn throughput(&self, table: &str) -> Result<Throughput, StoreError> {
        self.with_table(table, |t| t.throughput)
    }

    pub fn status(&self, table: &str) -> Result<TableStatus, StoreError> {
        self.with_table(table, |t| t.status)
    }

    fn with_table<R>(
        &self,
        table: &str,
        f: impl FnOnce(&mut MemoryTable) -> R,
    ) -> Result<R, StoreError> {
        let mut tables = self.tables.lock();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;
        Ok(f(entry))
    }
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn scan(&self, table: &str, limit: usize) -> Result<usize, StoreError> {
        self.with_table(table, |t| t.items.len().min(limit))
    }

    async fn update_throughput(
        &self,
        table: &str,
        throughput: Throughput,
    ) -> Result<(), StoreError> {
        self.with_table(table, |t| {
            if t.throughput != throughput {
                t.throughput = throughput;
                t.status = TableStatus::Updating;
            }
        })
    }

    async fn wait_until_ready(&self, table: &str) -> Result<(), StoreError> {
        // The change settles as soon as someone waits for it.
        tokio::task::yield_now().await;
        self.with_table(table, |t| t.status = TableStatus::Active)
    }

    async fn batch_write(
        &self,
        table: &str,
        records: &[AllocationRecord],
    ) -> Result<Vec<AllocationRecord>, StoreError> {
        if records.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: records.len(),
                limit: self.max_batch_size,
            });
        }

        self.with_table(table, |t| {
            let accepted = usize::try_from(t.throughput.write_units)
                .unwrap_or(usize::MAX)
                .min(records.len());
            let (written, unprocessed) = records.split_at(accepted);
            for record in written {
                t.items.insert(record.cidr_block, record.routing_domain);
            }
            unprocessed.to_vec()
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
