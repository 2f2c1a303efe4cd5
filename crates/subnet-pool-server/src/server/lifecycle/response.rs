use super::request::LifecycleRequest;
use serde::Serialize;
use subnet_pool::{LoadOutcome, LoadSummary};

/// Reason reported when a request outlives its local deadline.
pub const TIMEOUT_REASON: &str = "timeout";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Action {
    Loaded,
    Skipped,
    Deleted,
}

/// Attributes attached to a successful outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseData {
    pub outcome: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unprocessed: Option<usize>,
}

impl ResponseData {
    const fn action(outcome: Action) -> Self {
        Self {
            outcome,
            records: None,
            batches: None,
            retries: None,
            unprocessed: None,
        }
    }

    pub const fn deleted() -> Self {
        Self::action(Action::Deleted)
    }
}

impl From<LoadOutcome> for ResponseData {
    fn from(outcome: LoadOutcome) -> Self {
        match outcome {
            LoadOutcome::Skipped => Self::action(Action::Skipped),
            LoadOutcome::Loaded(LoadSummary {
                batches,
                records,
                retries,
                unprocessed,
            }) => Self {
                outcome: Action::Loaded,
                records: Some(records),
                batches: Some(batches),
                retries: Some(retries),
                unprocessed: Some(unprocessed),
            },
        }
    }
}

/// The single result of a lifecycle request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success(ResponseData),
    Failed(String),
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn timeout() -> Self {
        Self::failed(TIMEOUT_REASON)
    }

    pub const fn status(&self) -> Status {
        match self {
            Self::Success(_) => Status::Success,
            Self::Failed(_) => Status::Failed,
        }
    }
}

/// Document `PUT` to the request's `ResponseURL`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl CallbackResponse {
    pub fn new(request: &LifecycleRequest, outcome: Outcome) -> Self {
        let status = outcome.status();
        let (reason, data) = match outcome {
            Outcome::Success(data) => (None, Some(data)),
            Outcome::Failed(reason) => (Some(reason), None),
        };

        Self {
            status,
            reason,
            physical_resource_id: request.physical_resource_id().to_string(),
            stack_id: request.stack_id.clone(),
            request_id: request.request_id.clone(),
            logical_resource_id: request.logical_resource_id.clone(),
            data,
        }
    }
}
