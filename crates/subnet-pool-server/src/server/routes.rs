use crate::server::lifecycle::{LifecycleHandler, LifecycleRequest};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use core::time::Duration;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Caller's remaining time in milliseconds.
pub const REMAINING_TIME_HEADER: &str = "x-remaining-time-ms";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<LifecycleHandler>,
    /// In-flight requests; closed on shutdown so new ones are refused.
    pub tracker: TaskTracker,
    /// Remaining time assumed when the caller sends none.
    pub invocation_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lifecycle", post(lifecycle))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn lifecycle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.tracker.is_closed() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting down".to_string(),
        ));
    }

    let remaining = match headers.get(REMAINING_TIME_HEADER) {
        None => state.invocation_timeout,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("{REMAINING_TIME_HEADER} must be a whole number of milliseconds"),
                )
            })?,
    };

    // A body that names a ResponseURL is still owed exactly one outcome, even
    // when the rest of it does not parse.
    let request = match LifecycleRequest::deserialize(&body) {
        Ok(request) => request,
        Err(e) => {
            let Some(request) = LifecycleRequest::salvage(&body) else {
                return Err((StatusCode::BAD_REQUEST, format!("invalid request: {e}")));
            };
            tracing::warn!(error = %e, "Rejecting malformed lifecycle request");
            let handler = Arc::clone(&state.handler);
            state.tracker.spawn(
                async move {
                    handler.reject(request, format!("invalid request: {e}")).await;
                }
                .in_current_span(),
            );
            return Ok(StatusCode::ACCEPTED);
        }
    };

    tracing::info!(
        request_type = %request.request_type,
        request_id = %request.request_id,
        ?remaining,
        "Accepted lifecycle request"
    );

    let handler = Arc::clone(&state.handler);
    state.tracker.spawn(
        async move {
            handler.handle(request, remaining).await;
        }
        .in_current_span(),
    );

    Ok(StatusCode::ACCEPTED)
}

async fn healthz() -> &'static str {
    "ok"
}
