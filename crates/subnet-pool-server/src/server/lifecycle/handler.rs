use super::{
    callback::Callback,
    request::{LifecycleRequest, RequestType},
    response::{CallbackResponse, Outcome, ResponseData},
};
use crate::server::{config::Loader, telemetry};
use core::time::Duration;
use std::{any::Any, sync::Arc};
use subnet_pool::{LoadOutcome, LoadSummary};
use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

/// Runs lifecycle requests under a deadline and reports each outcome once.
///
/// The work for a request runs on its own task. The handler waits for it until
/// the caller's remaining time minus the safety margin, then gives up, cancels
/// the task's token and reports `timeout`. Whatever path ends the request, the
/// outcome is handed to the [`Callback`] exactly once.
pub struct LifecycleHandler {
    loader: Arc<Loader>,
    callback: Arc<dyn Callback>,
    safety_margin: Duration,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl LifecycleHandler {
    /// `shutdown` is the parent of every request's token; cancelling it stops
    /// all in-flight loads at their next batch boundary. Work is spawned on
    /// `tracker`, so waiting on it also waits for cancelled loads to roll
    /// back.
    pub fn new(
        loader: Arc<Loader>,
        callback: Arc<dyn Callback>,
        safety_margin: Duration,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            loader,
            callback,
            safety_margin,
            shutdown,
            tracker,
        }
    }

    /// Handles `request` given `remaining` time on the caller's clock and
    /// delivers the outcome. The outcome is also returned for logging.
    #[tracing::instrument(
        skip_all,
        fields(
            request_type = %request.request_type,
            request_id = %request.request_id,
            table = %request.table(),
        )
    )]
    pub async fn handle(&self, request: LifecycleRequest, remaining: Duration) -> Outcome {
        let started = Instant::now();
        telemetry::increment_requests(request.request_type.as_str());

        let outcome = self.run(&request, remaining).await;
        telemetry::record_duration(started.elapsed().as_secs_f64() * 1000.0);
        self.report(&request, outcome).await
    }

    /// Reports a request whose body could not be fully parsed, without
    /// running anything.
    #[tracing::instrument(skip_all, fields(request_id = %request.request_id))]
    pub async fn reject(&self, request: LifecycleRequest, reason: String) -> Outcome {
        telemetry::increment_requests(request.request_type.as_str());
        telemetry::increment_failures("invalid_request");
        self.report(&request, Outcome::Failed(reason)).await
    }

    async fn report(&self, request: &LifecycleRequest, outcome: Outcome) -> Outcome {
        match &outcome {
            Outcome::Success(data) => {
                tracing::info!(outcome = ?data.outcome, "Request succeeded");
            }
            Outcome::Failed(reason) => {
                tracing::error!(%reason, "Request failed");
            }
        }

        let response = CallbackResponse::new(request, outcome.clone());
        if let Err(e) = self.callback.deliver(&request.response_url, &response).await {
            tracing::error!(error = %e, "Failed to deliver outcome");
        }

        outcome
    }

    async fn run(&self, request: &LifecycleRequest, remaining: Duration) -> Outcome {
        let budget = remaining.saturating_sub(self.safety_margin);
        if budget.is_zero() {
            tracing::warn!(
                ?remaining,
                margin = ?self.safety_margin,
                "No time left before the deadline, not starting"
            );
            telemetry::increment_failures("timeout");
            return Outcome::timeout();
        }

        let cancel = self.shutdown.child_token();
        let mut task = self.tracker.spawn(
            execute(
                Arc::clone(&self.loader),
                request.request_type.clone(),
                request.table().to_string(),
                cancel.clone(),
            )
            .in_current_span(),
        );

        match tokio::time::timeout(budget, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_panic() => {
                telemetry::increment_failures("panic");
                Outcome::failed(format!("panicked: {}", panic_message(&*e.into_panic())))
            }
            Ok(Err(e)) => {
                telemetry::increment_failures("aborted");
                Outcome::failed(e.to_string())
            }
            Err(_elapsed) => {
                tracing::warn!(?budget, "Deadline reached, cancelling work");
                cancel.cancel();
                telemetry::increment_failures("timeout");
                Outcome::timeout()
            }
        }
    }
}

async fn execute(
    loader: Arc<Loader>,
    request_type: RequestType,
    table: String,
    cancel: CancellationToken,
) -> Outcome {
    match request_type {
        RequestType::Create | RequestType::Update => {
            if table.is_empty() {
                telemetry::increment_failures("invalid_request");
                return Outcome::failed("ResourceProperties.Table is required");
            }

            match loader.ensure_populated(&table, &cancel).await {
                Ok(outcome) => {
                    if let LoadOutcome::Loaded(LoadSummary {
                        records, retries, ..
                    }) = outcome
                    {
                        telemetry::increment_records_written(records as u64);
                        telemetry::increment_unprocessed_retries(retries as u64);
                    }
                    Outcome::Success(outcome.into())
                }
                Err(e) => {
                    telemetry::increment_failures("load");
                    Outcome::failed(e.to_string())
                }
            }
        }
        // The table outlives the resource; nothing to tear down.
        RequestType::Delete => Outcome::Success(ResponseData::deleted()),
        RequestType::Unknown(raw) => {
            telemetry::increment_failures("unknown_request_type");
            Outcome::failed(format!("Unknown RequestType {raw}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
