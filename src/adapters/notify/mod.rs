//! Notification sinks.

pub mod log;
pub mod webhook;

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::NotifyConfig;
use crate::domain::ports::Notifier;

pub use log::LogNotifier;
pub use webhook::WebhookNotifier;

/// Webhook notifier when a URL is configured, log sink otherwise.
pub fn from_config(config: &NotifyConfig) -> DomainResult<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url, config)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
