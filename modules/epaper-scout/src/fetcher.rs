//! Artifact download with bounded retries and format validation.
//!
//! An attempt only counts as a success once the body is on disk and starts
//! with the PDF magic bytes. Sites love to answer `200 OK` with an HTML error
//! page; such a file is deleted on the spot and the attempt is retried like
//! any transport failure.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use epaper_common::FetchSettings;

use crate::transport::{Transport, TransportError};

/// Leading bytes of every PDF document.
pub const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): linear in the attempt number.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff_base: settings.backoff_base,
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("response is not a PDF (starts with {0:?})")]
    NotPdf(String),

    #[error("could not store artifact: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempt(s): {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Download `url` into `destination`. Returns the stored size in bytes.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_error: Option<AttemptError> = None;

        for attempt in 1..=max_attempts {
            info!(url, attempt, max_attempts, "Downloading");
            match self.attempt(url, destination).await {
                Ok(size) => {
                    info!(url, bytes = size, "Downloaded valid PDF");
                    return Ok(size);
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Download attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.delay_after(attempt);
                info!(url, delay_secs = delay.as_secs_f64(), "Waiting before retry");
                tokio::time::sleep(delay).await;
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: max_attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts allowed".to_string()),
        })
    }

    async fn attempt(&self, url: &str, destination: &Path) -> Result<u64, AttemptError> {
        let body = self.transport.get(url, self.timeout).await?;

        if let Err(e) = tokio::fs::write(destination, &body).await {
            discard(destination).await;
            return Err(e.into());
        }

        match starts_with_magic(destination).await {
            Ok(true) => Ok(body.len() as u64),
            Ok(false) => {
                discard(destination).await;
                let preview = String::from_utf8_lossy(&body[..body.len().min(16)]).into_owned();
                Err(AttemptError::NotPdf(preview))
            }
            Err(e) => {
                discard(destination).await;
                Err(e.into())
            }
        }
    }
}

async fn starts_with_magic(path: &Path) -> std::io::Result<bool> {
    let mut header = Vec::with_capacity(PDF_MAGIC.len());
    tokio::fs::File::open(path)
        .await?
        .take(PDF_MAGIC.len() as u64)
        .read_to_end(&mut header)
        .await?;
    Ok(header == PDF_MAGIC)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove rejected download");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pdf_bytes, MockResponse, MockTransport};

    const URL: &str = "https://site.test/newspaper/pdf.php?file=uploads%2FA1%2B14-03.pdf";

    fn fetcher(transport: Arc<MockTransport>, max_attempts: u32) -> Fetcher {
        Fetcher::new(
            transport,
            RetryPolicy {
                max_attempts,
                backoff_base: Duration::from_secs(5),
            },
            Duration::from_secs(60),
        )
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after(2), Duration::from_secs(10));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            backoff_base: Duration::MAX,
        };
        assert_eq!(policy.delay_after(u32::MAX), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_transport_gets_exactly_max_attempts() {
        let transport = Arc::new(MockTransport::new().on(URL, MockResponse::NetworkError));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pdf.part");

        let err = fetcher(transport.clone(), 3).fetch(URL, &dest).await.unwrap_err();

        let FetchError::Exhausted { attempts, .. } = err;
        assert_eq!(attempts, 3);
        let times = transport.request_times();
        assert_eq!(times.len(), 3);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![Duration::from_secs(5), Duration::from_secs(10)]);
        assert!(gaps[0] < gaps[1], "backoff must strictly increase");
        assert!(!dest.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_status_is_retried_then_succeeds() {
        let transport = Arc::new(MockTransport::new().on_sequence(
            URL,
            vec![MockResponse::Status(503), MockResponse::Body(pdf_bytes())],
        ));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pdf.part");

        let size = fetcher(transport.clone(), 3).fetch(URL, &dest).await.unwrap();

        assert_eq!(size, pdf_bytes().len() as u64);
        assert_eq!(transport.hits(URL), 2);
        assert_eq!(std::fs::read(&dest).unwrap(), pdf_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn html_error_page_is_rejected_and_removed() {
        let html = b"<html><body>Service temporarily unavailable</body></html>".to_vec();
        let transport = Arc::new(MockTransport::new().on(URL, MockResponse::Body(html)));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pdf.part");

        let err = fetcher(transport.clone(), 2).fetch(URL, &dest).await.unwrap_err();

        assert!(err.to_string().contains("not a PDF"), "{err}");
        assert_eq!(transport.hits(URL), 2);
        assert!(!dest.exists(), "rejected payload must not stay on disk");
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_does_not_sleep() {
        let transport = Arc::new(MockTransport::new().on(URL, MockResponse::Status(404)));
        let dir = tempfile::tempdir().unwrap();
        let start = tokio::time::Instant::now();

        let result = fetcher(transport.clone(), 1)
            .fetch(URL, &dir.path().join("a.pdf.part"))
            .await;

        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn empty_body_is_not_a_pdf() {
        let transport = Arc::new(MockTransport::new().on(URL, MockResponse::Body(Vec::new())));
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.pdf.part");

        assert!(fetcher(transport, 1).fetch(URL, &dest).await.is_err());
        assert!(!dest.exists());
    }
}
