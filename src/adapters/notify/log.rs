use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{NotificationEvent, Notifier};

/// Writes events to the structured log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> DomainResult<()> {
        let payload = serde_json::to_string(event)?;
        match event {
            NotificationEvent::CycleRolledBack { .. }
            | NotificationEvent::RegressionsDetected { .. } => {
                tracing::warn!(event = event.name(), %payload, "notification");
            }
            _ => tracing::info!(event = event.name(), %payload, "notification"),
        }
        Ok(())
    }
}
