use async_trait::async_trait;

use super::backend::NotifyBackend;
use super::message::Notification;

/// Used when no webhook is configured or notifications are switched off.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send(&self, _notification: &Notification) -> anyhow::Result<()> {
        Ok(())
    }
}
