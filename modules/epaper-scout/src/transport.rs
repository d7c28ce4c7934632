// HTTP seam. Every byte the pipeline pulls from the source site goes through
// `Transport`, so tests can script the site with `testing::MockTransport`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the body of a successful (2xx) response.
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// `reqwest`-backed transport with a fixed user agent.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = resp.bytes().await?;
        debug!(url, bytes = body.len(), "GET complete");
        Ok(body.to_vec())
    }
}
