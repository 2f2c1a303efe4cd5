//! Resilient bulk load of an allocation plan into a [`TableStore`].
//!
//! A load runs in four phases:
//!
//! 1. **Idempotency gate**: a scan bounded to one record. A non-empty table is
//!    left alone and the load reports [`LoadOutcome::Skipped`].
//! 2. **Capacity boost**: the boost profile is requested and the loader waits
//!    for the table to become ready. This only affects speed, so a rejected
//!    request is logged and the load continues at the current profile.
//! 3. **Chunked write**: batches are written strictly in plan order. Records a
//!    write hands back as unprocessed are re-submitted with exponential
//!    backoff until the retry budget runs out. A store error on any
//!    submission aborts the remaining batches.
//! 4. **Capacity rollback**: whenever the boost was accepted, the baseline
//!    profile is restored, whether or not phase 3 succeeded.
//!
//! The gate is a read-then-write check: two concurrent loads against the same
//! empty table can both pass it. Callers must run at most one populate per
//! table at a time.
//!
//! Every load takes a [`CancellationToken`]. It is checked before each batch
//! and raced against the ready-wait and every backoff sleep, so a cancelled
//! load stops issuing writes at the next boundary.

mod config;
mod outcome;
#[cfg(test)]
mod tests;

pub use config::*;
pub use outcome::*;

use tokio_util::sync::CancellationToken;

use crate::{
    batch::{batch_count, chunk},
    error::{Error, Result},
    plan::generate_plan,
    record::AllocationRecord,
    sleep::{SleepProvider, TokioSleep},
    store::TableStore,
};

/// Writes the allocation plan into empty tables exactly once.
///
/// The loader is stateless between calls and can be shared across tasks
/// behind an `Arc`.
pub struct BulkLoader<S, P = TokioSleep> {
    store: S,
    sleeper: P,
    config: LoaderConfig,
}

impl<S> BulkLoader<S, TokioSleep>
where
    S: TableStore,
{
    /// Creates a loader that sleeps on Tokio's timer between retries.
    ///
    /// # Errors
    ///
    /// See [`BulkLoader::with_sleeper`].
    pub fn new(store: S, config: LoaderConfig) -> Result<Self> {
        Self::with_sleeper(store, TokioSleep, config)
    }
}

impl<S, P> BulkLoader<S, P>
where
    S: TableStore,
    P: SleepProvider,
{
    /// Creates a loader with a custom [`SleepProvider`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBatchLimit`] for a zero batch limit and
    /// [`Error::InvalidConfig`] when the batch limit exceeds the store's
    /// per-call limit.
    pub fn with_sleeper(store: S, sleeper: P, config: LoaderConfig) -> Result<Self> {
        if config.batch_limit == 0 {
            return Err(Error::InvalidBatchLimit);
        }
        let max = store.max_batch_size();
        if config.batch_limit > max {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "batch limit {} exceeds the store's per-call limit of {max}",
                    config.batch_limit
                ),
            });
        }

        Ok(Self {
            store,
            sleeper,
            config,
        })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Populates `table` with the plan unless it already holds a record.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Scan`] if the idempotency scan fails.
    /// - [`LoadError::Batch`] if a batched write fails.
    /// - [`LoadError::RetriesExhausted`] if a batch keeps unprocessed records
    ///   past the retry budget and they are not tolerated.
    /// - [`LoadError::Cancelled`] if `cancel` fires first.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, cancel)))]
    pub async fn ensure_populated(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<LoadOutcome, LoadError> {
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let existing = self
            .store
            .scan(table, 1)
            .await
            .map_err(|source| LoadError::Scan {
                table: table.to_string(),
                source,
            })?;
        if existing > 0 {
            #[cfg(feature = "tracing")]
            tracing::info!("Table is already populated, skipping");
            return Ok(LoadOutcome::Skipped);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            blocks = self.config.layout.total_blocks(),
            prefix_len = ?self.config.layout.prefix_len(),
            "Populating table"
        );

        let boosted = self.boost_capacity(table, cancel).await;
        let result = self.write_plan(table, cancel).await;
        if boosted {
            self.restore_capacity(table).await;
        }

        result.map(LoadOutcome::Loaded)
    }

    async fn boost_capacity(&self, table: &str, cancel: &CancellationToken) -> bool {
        if let Err(_e) = self.store.update_throughput(table, self.config.boost).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "Capacity boost rejected, loading at current throughput");
            return false;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Cancelled while waiting for boosted capacity");
            }
            ready = self.store.wait_until_ready(table) => match ready {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(boost = ?self.config.boost, "Boosted capacity is ready");
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_e, "Table did not report ready, continuing");
                }
            },
        }

        // The request was accepted, so the table needs restoring either way.
        true
    }

    async fn write_plan(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<LoadSummary, LoadError> {
        let plan = generate_plan(&self.config.layout);
        let batches = batch_count(plan.len(), self.config.batch_limit);
        let mut summary = LoadSummary::default();

        for (index, batch) in chunk(&plan, self.config.batch_limit)?.enumerate() {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }

            let number = index + 1;
            let unprocessed = self
                .store
                .batch_write(table, batch)
                .await
                .map_err(|source| LoadError::Batch {
                    batch: number,
                    batches,
                    source,
                })?;
            summary.batches += 1;

            let (retries, left) = self
                .retry_unprocessed(table, unprocessed, number, batches, cancel)
                .await?;
            summary.retries += retries as usize;
            summary.records += batch.len() - left;

            if left > 0 {
                if !self.config.tolerate_unprocessed {
                    return Err(LoadError::RetriesExhausted {
                        batch: number,
                        unprocessed: left,
                        retries,
                    });
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    batch = number,
                    unprocessed = left,
                    "Records remain unprocessed after the final retry"
                );
                summary.unprocessed += left;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            batches = summary.batches,
            records = summary.records,
            retries = summary.retries,
            unprocessed = summary.unprocessed,
            "Plan written"
        );

        Ok(summary)
    }

    /// Re-submits `unprocessed` until the store takes all of it or the retry
    /// budget is spent. Returns the retries used and the records left over.
    async fn retry_unprocessed(
        &self,
        table: &str,
        mut unprocessed: Vec<AllocationRecord>,
        batch: usize,
        batches: usize,
        cancel: &CancellationToken,
    ) -> Result<(u32, usize), LoadError> {
        let mut attempt = 0;

        while !unprocessed.is_empty() && attempt < self.config.backoff.max_retries() {
            attempt += 1;
            let delay = self.config.backoff.delay(attempt);

            #[cfg(feature = "tracing")]
            tracing::warn!(
                batch,
                unprocessed = unprocessed.len(),
                attempt,
                ?delay,
                "Unprocessed records in batch"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LoadError::Cancelled),
                () = self.sleeper.sleep_for(delay) => {}
            }

            unprocessed = self
                .store
                .batch_write(table, &unprocessed)
                .await
                .map_err(|source| LoadError::Batch {
                    batch,
                    batches,
                    source,
                })?;
        }

        Ok((attempt, unprocessed.len()))
    }

    async fn restore_capacity(&self, table: &str) {
        match self.store.update_throughput(table, self.config.baseline).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(baseline = ?self.config.baseline, "Restored baseline capacity");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "Failed to restore baseline capacity");
            }
        }
    }
}
