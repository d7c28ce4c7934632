use chrono::{DateTime, Utc};
use serde::Serialize;

use epaper_common::EditionDate;

pub const COMPLETED_COLOR: u32 = 5_814_783;
pub const FALLBACK_COLOR: u32 = 15_105_570;
const FOOTER: &str = "E-Paper Automation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Backend-neutral message describing one publication outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<NotificationField>,
    pub footer: String,
}

impl Notification {
    /// The edition was archived. `download` is the public download reference,
    /// when one exists.
    pub fn completed(
        publication: &str,
        date: EditionDate,
        size_bytes: u64,
        download: Option<&str>,
    ) -> Self {
        let mut fields = vec![
            field("Date", date.display_token(), true),
            field("Size", format!("{:.2} MB", size_bytes as f64 / 1024.0 / 1024.0), true),
        ];
        if let Some(url) = download {
            fields.push(field("Download", format!("[Click here to download PDF]({url})"), false));
        }

        Self {
            title: publication.to_string(),
            description: format!("**{}**\n\nToday's edition is ready!", long_date(date)),
            color: COMPLETED_COLOR,
            timestamp: Utc::now(),
            fields,
            footer: FOOTER.to_string(),
        }
    }

    /// Automatic download failed; point the reader at the best page we found.
    pub fn fallback(publication: &str, date: EditionDate, fallback_url: &str) -> Self {
        Self {
            title: publication.to_string(),
            description: format!(
                "**{}**\n\nAutomatic download failed, open the edition manually.",
                long_date(date)
            ),
            color: FALLBACK_COLOR,
            timestamp: Utc::now(),
            fields: vec![
                field("Date", date.display_token(), true),
                field("Fallback link", fallback_url.to_string(), false),
            ],
            footer: FOOTER.to_string(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

fn field(name: &str, value: String, inline: bool) -> NotificationField {
    NotificationField {
        name: name.to_string(),
        value,
        inline,
    }
}

fn long_date(date: EditionDate) -> String {
    date.date().format("%A, %B %d, %Y").to_string()
}
