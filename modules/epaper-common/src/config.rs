use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{EpaperError, Result};
use crate::types::Publication;

const MAX_ATTEMPTS: u32 = 10;
const MAX_BACKOFF_SECS: u64 = 600;
const MAX_RETENTION_MONTHS: u32 = 120;

pub const DEFAULT_SITE_URL: &str = "https://www.indiags.com";
pub const DEFAULT_PUBLICATIONS: &str = "The Hindu=TH-+Delhi;Indian Express=IE-+Delhi";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source site
    pub site_url: String,
    pub publications: Vec<Publication>,
    pub user_agent: String,

    // Local state
    pub archive_dir: PathBuf,
    pub history_file: PathBuf,

    // Notifications
    pub webhook_url: Option<String>,
    pub public_base_url: Option<String>,

    pub retention: RetentionPolicy,
    pub fetch: FetchSettings,
    pub compress: bool,
}

/// When and how far back archive month folders are purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Retention is inactive while the day of month is at or below this value.
    pub grace_day: u32,
    /// Number of most recent months kept, including the current one.
    pub keep_months: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            grace_day: 7,
            keep_months: 1,
        }
    }
}

/// Network budget: attempts, backoff, timeouts and politeness pauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub max_attempts: u32,
    /// Linear backoff unit; the delay after attempt `n` is `backoff_base * n`.
    pub backoff_base: Duration,
    pub download_timeout: Duration,
    pub page_timeout: Duration,
    pub candidate_pause: Duration,
    pub publication_pause: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            download_timeout: Duration::from_secs(60),
            page_timeout: Duration::from_secs(30),
            candidate_pause: Duration::from_secs(2),
            publication_pause: Duration::from_secs(3),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let site_url = get("EPAPER_SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
        let site_url = validate_http_url("EPAPER_SITE_URL", &site_url)?;

        let publications = parse_publications(
            &get("EPAPER_PUBLICATIONS").unwrap_or_else(|| DEFAULT_PUBLICATIONS.to_string()),
        )?;

        let webhook_url = get("DISCORD_WEBHOOK_URL")
            .map(|url| validate_http_url("DISCORD_WEBHOOK_URL", &url))
            .transpose()?;

        let public_base_url = match get("EPAPER_PUBLIC_BASE_URL") {
            Some(url) => Some(validate_http_url("EPAPER_PUBLIC_BASE_URL", &url)?),
            None => get("GITHUB_REPOSITORY")
                .map(|repo| pages_url_for_repository(&repo))
                .transpose()?,
        };

        let defaults = FetchSettings::default();
        let fetch = FetchSettings {
            max_attempts: parse_or(&get, "EPAPER_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: secs_or(&get, "EPAPER_BACKOFF_SECS", defaults.backoff_base)?,
            download_timeout: secs_or(&get, "EPAPER_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout)?,
            page_timeout: secs_or(&get, "EPAPER_PAGE_TIMEOUT_SECS", defaults.page_timeout)?,
            candidate_pause: secs_or(&get, "EPAPER_CANDIDATE_PAUSE_SECS", defaults.candidate_pause)?,
            publication_pause: secs_or(&get, "EPAPER_PUBLICATION_PAUSE_SECS", defaults.publication_pause)?,
        };
        check_range("EPAPER_MAX_ATTEMPTS", fetch.max_attempts.into(), 1, MAX_ATTEMPTS.into())?;
        check_range("EPAPER_BACKOFF_SECS", fetch.backoff_base.as_secs(), 0, MAX_BACKOFF_SECS)?;

        let retention_defaults = RetentionPolicy::default();
        let retention = RetentionPolicy {
            grace_day: parse_or(&get, "EPAPER_RETENTION_GRACE_DAYS", retention_defaults.grace_day)?,
            keep_months: parse_or(&get, "EPAPER_RETENTION_MONTHS", retention_defaults.keep_months)?,
        };
        check_range("EPAPER_RETENTION_MONTHS", retention.keep_months.into(), 1, MAX_RETENTION_MONTHS.into())?;
        check_range("EPAPER_RETENTION_GRACE_DAYS", retention.grace_day.into(), 0, 31)?;

        Ok(Self {
            site_url,
            publications,
            user_agent: get("EPAPER_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            archive_dir: PathBuf::from(get("EPAPER_ARCHIVE_DIR").unwrap_or_else(|| "e-paper".to_string())),
            history_file: PathBuf::from(
                get("EPAPER_HISTORY_FILE").unwrap_or_else(|| "download_history.json".to_string()),
            ),
            webhook_url,
            public_base_url,
            retention,
            fetch,
            compress: parse_or(&get, "EPAPER_COMPRESS", true)?,
        })
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        let names: Vec<&str> = self.publications.iter().map(|p| p.name.as_str()).collect();
        info!(
            site_url = self.site_url.as_str(),
            publications = ?names,
            archive_dir = %self.archive_dir.display(),
            history_file = %self.history_file.display(),
            webhook = if self.webhook_url.is_some() { "[set]" } else { "[unset]" },
            public_base_url = self.public_base_url.as_deref().unwrap_or("[unset]"),
            grace_day = self.retention.grace_day,
            keep_months = self.retention.keep_months,
            max_attempts = self.fetch.max_attempts,
            compress = self.compress,
            "Configuration loaded"
        );
    }
}

/// Parse `name=code` pairs separated by `;`.
pub fn parse_publications(raw: &str) -> Result<Vec<Publication>> {
    let mut publications = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, code) = entry.split_once('=').ok_or_else(|| {
            EpaperError::Config(format!("publication entry '{entry}' must look like name=code"))
        })?;
        let (name, code) = (name.trim(), code.trim());
        if name.is_empty() || code.is_empty() {
            return Err(EpaperError::Config(format!(
                "publication entry '{entry}' has an empty name or code"
            )));
        }
        publications.push(Publication::new(name, code));
    }
    if publications.is_empty() {
        return Err(EpaperError::Config("no publications configured".into()));
    }
    Ok(publications)
}

/// `owner/repo` → `https://owner.github.io/repo`.
fn pages_url_for_repository(repository: &str) -> Result<String> {
    match repository.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok(format!("https://{owner}.github.io/{repo}"))
        }
        _ => Err(EpaperError::Config(format!(
            "GITHUB_REPOSITORY must look like owner/repo, got '{repository}'"
        ))),
    }
}

fn validate_http_url(key: &str, raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| EpaperError::Config(format!("{key} is not a valid URL ({raw}): {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(EpaperError::Config(format!(
            "{key} must be http or https, got {}",
            parsed.scheme()
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(EpaperError::Config(format!(
            "{key} must be between {min} and {max}, got {value}"
        )))
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| EpaperError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_secs()).map(Duration::from_secs)
}
