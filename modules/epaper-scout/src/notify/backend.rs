use async_trait::async_trait;

use super::message::Notification;

/// Pluggable notification backend for the pipeline.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    /// Deliver one notification. Callers log failures and move on.
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}
