//! Fallback sender used when no robot token is configured.

use async_trait::async_trait;
use events::{DeliveryError, NotificationSender, Recipient};
use tracing::info;

/// Logs each digest instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, body: &str, recipients: &[Recipient]) -> Result<(), DeliveryError> {
        let recipients: Vec<&str> = recipients.iter().map(Recipient::as_str).collect();
        info!(?recipients, body, "digest (no transport configured)");
        Ok(())
    }
}
