//! JSON webhook notifier with exponential backoff.
//!
//! Retries on network errors, 429 and 5xx. Other 4xx responses fail at once.

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::{Client, StatusCode};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::NotifyConfig;
use crate::domain::ports::{NotificationEvent, Notifier};

pub struct WebhookNotifier {
    client: Client,
    url: String,
    initial_interval: Duration,
    max_elapsed: Duration,
}

impl WebhookNotifier {
    pub fn new(url: &str, config: &NotifyConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::NotificationFailed(format!("cannot build client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
            initial_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        })
    }

    /// Shorten the retry schedule; mostly useful in tests.
    pub fn with_retry_window(mut self, initial_interval: Duration, max_elapsed: Duration) -> Self {
        self.initial_interval = initial_interval;
        self.max_elapsed = max_elapsed;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_elapsed.max(self.initial_interval))
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    async fn post_once(
        &self,
        event: &NotificationEvent,
    ) -> Result<(), backoff::Error<DomainError>> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(DomainError::NotificationFailed(e.to_string()))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let err = DomainError::NotificationFailed(format!("webhook returned {status}"));
        if is_retryable(status) {
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &NotificationEvent) -> DomainResult<()> {
        let mut backoff = self.backoff();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.post_once(event).await {
                Ok(()) => {
                    tracing::debug!(event = event.name(), attempts, "Webhook notification sent");
                    return Ok(());
                }
                Err(backoff::Error::Permanent(e)) => return Err(e),
                Err(backoff::Error::Transient { err, retry_after }) => {
                    match retry_after.or_else(|| backoff.next_backoff()) {
                        Some(wait) => {
                            tracing::warn!(
                                event = event.name(),
                                attempts,
                                error = %err,
                                wait_ms = wait.as_millis() as u64,
                                "Webhook delivery failed, retrying"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        None => return Err(err),
                    }
                }
            }
        }
    }
}
