use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::backend::NotifyBackend;
use super::message::Notification;

const USERNAME: &str = "E-Paper Bot";
const TIMEOUT: Duration = Duration::from_secs(10);

/// Discord-compatible incoming webhook backend. One embed per notification.
pub struct DiscordWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn payload(notification: &Notification) -> serde_json::Value {
        json!({
            "username": USERNAME,
            "embeds": [{
                "title": notification.title,
                "description": notification.description,
                "color": notification.color,
                "fields": notification.fields,
                "timestamp": notification.timestamp.to_rfc3339(),
                "footer": { "text": notification.footer },
            }],
        })
    }
}

#[async_trait]
impl NotifyBackend for DiscordWebhook {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .timeout(TIMEOUT)
            .json(&Self::payload(notification))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Discord webhook returned non-success");
            anyhow::bail!("Discord webhook returned {status}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epaper_common::EditionDate;

    #[test]
    fn payload_is_a_single_embed() {
        let date = EditionDate::from_ymd(2024, 3, 14).unwrap();
        let n = Notification::fallback("Alpha", date, "https://site.test/x");
        let payload = DiscordWebhook::payload(&n);

        assert_eq!(payload["username"], USERNAME);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Alpha");
        assert_eq!(embed["fields"][0]["name"], "Date");
        assert_eq!(embed["fields"][0]["value"], "14/03");
        assert_eq!(embed["fields"][0]["inline"], true);
        assert_eq!(embed["footer"]["text"], n.footer);
        assert_eq!(payload["embeds"].as_array().map(Vec::len), Some(1));
    }
}
