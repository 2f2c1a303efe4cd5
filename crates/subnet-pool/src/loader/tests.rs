use crate::{
    AllocationRecord, BulkLoader, Error, LoadError, LoadOutcome, LoadSummary, LoaderConfig,
    MemoryTableStore, PartitionLayout, SleepProvider, StoreError, TableStore, Throughput,
    generate_plan,
};
use async_trait::async_trait;
use core::time::Duration;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TABLE: &str = "cidr-allocations";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Scan,
    UpdateThroughput(Throughput),
    WaitUntilReady,
    BatchWrite(usize),
}

/// A store whose responses are scripted per call.
#[derive(Default)]
struct ScriptedStore {
    existing: usize,
    reject_boost: bool,
    /// Number of records to hand back as unprocessed, one entry per batch
    /// write call. Calls past the end process everything.
    unprocessed: Mutex<VecDeque<usize>>,
    /// Zero-based batch write call that fails.
    fail_write_at: Option<usize>,
    calls: Mutex<Vec<Call>>,
    written: Mutex<Vec<AllocationRecord>>,
}

impl ScriptedStore {
    fn with_unprocessed(script: impl IntoIterator<Item = usize>) -> Self {
        Self {
            unprocessed: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn batch_writes(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::BatchWrite(_)))
            .count()
    }
}

#[async_trait]
impl TableStore for ScriptedStore {
    async fn scan(&self, _table: &str, limit: usize) -> Result<usize, StoreError> {
        self.calls.lock().push(Call::Scan);
        Ok(self.existing.min(limit))
    }

    async fn update_throughput(
        &self,
        _table: &str,
        throughput: Throughput,
    ) -> Result<(), StoreError> {
        self.calls.lock().push(Call::UpdateThroughput(throughput));
        if self.reject_boost && throughput == Throughput::BOOST {
            return Err(StoreError::Service {
                message: "LimitExceededException".to_string(),
            });
        }
        Ok(())
    }

    async fn wait_until_ready(&self, _table: &str) -> Result<(), StoreError> {
        self.calls.lock().push(Call::WaitUntilReady);
        Ok(())
    }

    async fn batch_write(
        &self,
        _table: &str,
        records: &[AllocationRecord],
    ) -> Result<Vec<AllocationRecord>, StoreError> {
        let index = self.batch_writes();
        self.calls.lock().push(Call::BatchWrite(records.len()));
        if self.fail_write_at == Some(index) {
            return Err(StoreError::Service {
                message: "InternalServerError".to_string(),
            });
        }

        let rejected = self
            .unprocessed
            .lock()
            .pop_front()
            .unwrap_or(0)
            .min(records.len());
        let (accepted, unprocessed) = records.split_at(records.len() - rejected);
        self.written.lock().extend_from_slice(accepted);
        Ok(unprocessed.to_vec())
    }
}

/// Records requested delays and returns immediately.
#[derive(Clone, Default)]
struct RecordingSleep {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleep {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl SleepProvider for RecordingSleep {
    type Sleep = core::future::Ready<()>;

    fn sleep_for(&self, dur: Duration) -> Self::Sleep {
        self.delays.lock().push(dur);
        core::future::ready(())
    }
}

/// Cancels the load the first time it is asked to back off.
struct CancellingSleep {
    token: CancellationToken,
}

impl SleepProvider for CancellingSleep {
    type Sleep = core::future::Pending<()>;

    fn sleep_for(&self, _dur: Duration) -> Self::Sleep {
        self.token.cancel();
        core::future::pending()
    }
}

fn ten_block_config() -> LoaderConfig {
    LoaderConfig {
        layout: PartitionLayout::new(10, 5, 16, 8).unwrap(),
        batch_limit: 4,
        ..LoaderConfig::default()
    }
}

fn loader(
    store: Arc<ScriptedStore>,
    config: LoaderConfig,
) -> (BulkLoader<Arc<ScriptedStore>, RecordingSleep>, RecordingSleep) {
    let sleep = RecordingSleep::default();
    let loader = BulkLoader::with_sleeper(store, sleep.clone(), config).unwrap();
    (loader, sleep)
}

#[tokio::test]
async fn populated_table_is_skipped_every_time() {
    let store = Arc::new(ScriptedStore {
        existing: 3,
        ..ScriptedStore::default()
    });
    let (loader, _) = loader(Arc::clone(&store), LoaderConfig::default());
    let cancel = CancellationToken::new();

    assert_eq!(
        loader.ensure_populated(TABLE, &cancel).await,
        Ok(LoadOutcome::Skipped)
    );
    assert_eq!(
        loader.ensure_populated(TABLE, &cancel).await,
        Ok(LoadOutcome::Skipped)
    );
    assert_eq!(store.calls(), [Call::Scan, Call::Scan]);
}

#[tokio::test]
async fn loads_reference_plan_into_memory_store() {
    let store = Arc::new(MemoryTableStore::new());
    store.create_table(TABLE, Throughput::BASELINE);
    let sleep = RecordingSleep::default();
    let loader =
        BulkLoader::with_sleeper(Arc::clone(&store), sleep.clone(), LoaderConfig::default())
            .unwrap();
    let cancel = CancellationToken::new();

    let outcome = loader.ensure_populated(TABLE, &cancel).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded(LoadSummary {
            batches: 328,
            records: 8192,
            retries: 0,
            unprocessed: 0,
        })
    );
    assert_eq!(
        store.records(TABLE).unwrap(),
        generate_plan(&PartitionLayout::REFERENCE)
    );
    assert_eq!(store.throughput(TABLE).unwrap(), Throughput::BASELINE);
    assert!(sleep.delays().is_empty());

    // A retried create finds the table populated.
    assert_eq!(
        loader.ensure_populated(TABLE, &cancel).await,
        Ok(LoadOutcome::Skipped)
    );
}

#[tokio::test]
async fn baseline_throughput_is_drained_through_retries() {
    let store = Arc::new(MemoryTableStore::new());
    store.create_table(TABLE, Throughput::BASELINE);
    let sleep = RecordingSleep::default();
    let config = LoaderConfig {
        // 5 * (160 / 8) = 100 records, four full batches
        layout: PartitionLayout::new(10, 5, 160, 8).unwrap(),
        boost: Throughput::BASELINE,
        ..LoaderConfig::default()
    };
    let loader = BulkLoader::with_sleeper(Arc::clone(&store), sleep.clone(), config).unwrap();

    let outcome = loader
        .ensure_populated(TABLE, &CancellationToken::new())
        .await
        .unwrap();

    // 5 write units per call: each 25-record batch takes 1 write + 4 retries.
    assert_eq!(
        outcome,
        LoadOutcome::Loaded(LoadSummary {
            batches: 4,
            records: 100,
            retries: 16,
            unprocessed: 0,
        })
    );
    let per_batch: Vec<u64> = sleep.delays()[..4]
        .iter()
        .map(|d| d.as_millis() as u64)
        .collect();
    assert_eq!(per_batch, [20, 40, 80, 160]);
    assert_eq!(store.records(TABLE).unwrap().len(), 100);
}

#[tokio::test]
async fn unprocessed_records_are_retried_with_growing_backoff() {
    // Attempts 1..=3 hand back 3 records, attempt 4 takes them all.
    let store = Arc::new(ScriptedStore::with_unprocessed([3, 3, 3]));
    let (loader, sleep) = loader(Arc::clone(&store), ten_block_config());

    let outcome = loader
        .ensure_populated(TABLE, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LoadOutcome::Loaded(LoadSummary {
            batches: 3,
            records: 10,
            retries: 3,
            unprocessed: 0,
        })
    );

    let delays = sleep.delays();
    assert_eq!(
        delays,
        [
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(80)
        ]
    );
    assert!(delays.windows(2).all(|w| w[0] < w[1]));

    // Exactly the unprocessed records were re-submitted.
    assert_eq!(
        store.calls(),
        [
            Call::Scan,
            Call::UpdateThroughput(Throughput::BOOST),
            Call::WaitUntilReady,
            Call::BatchWrite(4),
            Call::BatchWrite(3),
            Call::BatchWrite(3),
            Call::BatchWrite(3),
            Call::BatchWrite(4),
            Call::BatchWrite(2),
            Call::UpdateThroughput(Throughput::BASELINE),
        ]
    );

    let mut written = store.written.lock().clone();
    written.sort();
    assert_eq!(written, generate_plan(&ten_block_config().layout));
}

#[tokio::test]
async fn exhausted_retries_fail_the_load_and_restore_capacity() {
    let store = Arc::new(ScriptedStore::with_unprocessed([2; 11]));
    let (loader, sleep) = loader(Arc::clone(&store), ten_block_config());

    let err = loader
        .ensure_populated(TABLE, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LoadError::RetriesExhausted {
            batch: 1,
            unprocessed: 2,
            retries: 10,
        }
    );
    assert_eq!(sleep.delays().len(), 10);
    assert_eq!(store.batch_writes(), 11);
    assert_eq!(
        store.calls().last(),
        Some(&Call::UpdateThroughput(Throughput::BASELINE))
    );
}

#[tokio::test]
async fn tolerated_exhaustion_continues_with_next_batch() {
    let store = Arc::new(ScriptedStore::with_unprocessed([2; 11]));
    let config = LoaderConfig {
        tolerate_unprocessed: true,
        ..ten_block_config()
    };
    let (loader, _) = loader(Arc::clone(&store), config);

    let outcome = loader
        .ensure_populated(TABLE, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LoadOutcome::Loaded(LoadSummary {
            batches: 3,
            records: 8,
            retries: 10,
            unprocessed: 2,
        })
    );
    assert_eq!(store.batch_writes(), 13);
}

#[tokio::test]
async fn store_error_aborts_remaining_batches() {
    let store = Arc::new(ScriptedStore {
        fail_write_at: Some(1),
        ..ScriptedStore::default()
    });
    let (loader, _) = loader(Arc::clone(&store), ten_block_config());

    let err = loader
        .ensure_populated(TABLE, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LoadError::Batch {
            batch: 2,
            batches: 3,
            source: StoreError::Service {
                message: "InternalServerError".to_string(),
            },
        }
    );
    assert_eq!(err.to_string(), "batch 2 of 3 failed: InternalServerError");
    assert_eq!(store.batch_writes(), 2);
    assert_eq!(
        store.calls().last(),
        Some(&Call::UpdateThroughput(Throughput::BASELINE))
    );
}

#[tokio::test]
async fn rejected_boost_does_not_stop_the_load() {
    let store = Arc::new(ScriptedStore {
        reject_boost: true,
        ..ScriptedStore::default()
    });
    let (loader, _) = loader(Arc::clone(&store), ten_block_config());

    let outcome = loader
        .ensure_populated(TABLE, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded(s) if s.records == 10));

    let calls = store.calls();
    assert!(!calls.contains(&Call::WaitUntilReady));
    assert!(!calls.contains(&Call::UpdateThroughput(Throughput::BASELINE)));
}

#[tokio::test]
async fn cancelled_token_prevents_any_store_call() {
    let store = Arc::new(ScriptedStore::default());
    let (loader, _) = loader(Arc::clone(&store), ten_block_config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(
        loader.ensure_populated(TABLE, &cancel).await,
        Err(LoadError::Cancelled)
    );
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn cancellation_during_backoff_stops_writes() {
    let store = Arc::new(ScriptedStore::with_unprocessed([1; 20]));
    let cancel = CancellationToken::new();
    let sleeper = CancellingSleep {
        token: cancel.clone(),
    };
    let loader = BulkLoader::with_sleeper(Arc::clone(&store), sleeper, ten_block_config()).unwrap();

    assert_eq!(
        loader.ensure_populated(TABLE, &cancel).await,
        Err(LoadError::Cancelled)
    );
    assert_eq!(store.batch_writes(), 1);
    assert_eq!(
        store.calls().last(),
        Some(&Call::UpdateThroughput(Throughput::BASELINE))
    );
}

#[tokio::test]
async fn missing_table_fails_the_scan() {
    let store = MemoryTableStore::new();
    let loader = BulkLoader::new(store, LoaderConfig::default()).unwrap();

    let err = loader
        .ensure_populated("absent", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Scan { ref table, source: StoreError::TableNotFound { .. } } if table == "absent"
    ));
}

#[test]
fn rejects_batch_limits_the_store_cannot_take() {
    let zero = LoaderConfig {
        batch_limit: 0,
        ..LoaderConfig::default()
    };
    assert_eq!(
        BulkLoader::new(MemoryTableStore::new(), zero).err(),
        Some(Error::InvalidBatchLimit)
    );

    let oversized = LoaderConfig {
        batch_limit: 26,
        ..LoaderConfig::default()
    };
    assert!(matches!(
        BulkLoader::new(MemoryTableStore::new(), oversized),
        Err(Error::InvalidConfig { .. })
    ));
}
