use super::response::CallbackResponse;
use async_trait::async_trait;
use core::time::Duration;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("request has no ResponseURL")]
    MissingResponseUrl,

    #[error("callback transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("callback endpoint answered {status}")]
    Rejected { status: u16 },
}

/// Receiver of the single outcome of a lifecycle request.
#[async_trait]
pub trait Callback: Send + Sync {
    async fn deliver(&self, url: &str, response: &CallbackResponse) -> Result<(), CallbackError>;
}

/// Delivers outcomes with an HTTP `PUT` of the JSON document.
#[derive(Clone, Debug)]
pub struct HttpCallback {
    client: reqwest::Client,
}

impl HttpCallback {
    pub fn new() -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Callback for HttpCallback {
    async fn deliver(&self, url: &str, response: &CallbackResponse) -> Result<(), CallbackError> {
        if url.is_empty() {
            return Err(CallbackError::MissingResponseUrl);
        }

        let reply = self.client.put(url).json(response).send().await?;
        let status = reply.status();
        if !status.is_success() {
            return Err(CallbackError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(%status, "Callback delivered");
        Ok(())
    }
}
