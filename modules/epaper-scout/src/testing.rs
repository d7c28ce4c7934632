// Test doubles for the pipeline seams.
//
// - MockTransport (Transport): URL → scripted responses, with a request log
// - RecordingNotifier (NotifyBackend): keeps every notification it is handed
//
// Plus fixture builders for PDF payloads and the site's HTML pages.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::notify::{Notification, NotifyBackend};
use crate::transport::{Transport, TransportError};

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
    NetworkError,
}

impl MockResponse {
    pub fn html(body: &str) -> Self {
        MockResponse::Body(body.as_bytes().to_vec())
    }

    pub fn pdf() -> Self {
        MockResponse::Body(pdf_bytes())
    }
}

/// URL-keyed scripted transport. Each URL answers from its queue in order;
/// the last response sticks. Unregistered URLs answer 404.
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    log: Mutex<Vec<(String, Instant)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn on(self, url: &str, response: MockResponse) -> Self {
        self.on_sequence(url, vec![response])
    }

    pub fn on_sequence(self, url: &str, responses: Vec<MockResponse>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    /// When each request was made (tokio clock, so paused-time tests work).
    pub fn request_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn hits(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.log
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let response = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match response {
            Some(MockResponse::Body(body)) => Ok(body),
            Some(MockResponse::Status(status)) => Err(TransportError::Status {
                status,
                url: url.to_string(),
            }),
            Some(MockResponse::NetworkError) => {
                Err(TransportError::Network("connection reset".to_string()))
            }
            None => Err(TransportError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Cloneable handle: keep one clone in the test, hand the other to the pipeline.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A small, well-formed-looking PDF payload.
pub fn pdf_bytes() -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.extend_from_slice(&b"0 0 0 rg 10 10 100 100 re f\n".repeat(64));
    body.extend_from_slice(b"%%EOF\n");
    body
}

/// Listing page with one `.pdf-item` card per `(title, href)`.
pub fn listing_html(entries: &[(&str, &str)]) -> String {
    let cards: String = entries
        .iter()
        .map(|(title, href)| {
            format!(
                r#"<div class="pdf-item">
                  <div class="card-d-s-title">{title}</div>
                  <a class="btn btn-read" href="{href}">Read</a>
                </div>"#
            )
        })
        .collect();
    format!("<html><body><div class=\"grid\">{cards}</div></body></html>")
}

/// Detail page whose read button opens the newsletter page for `token`.
pub fn detail_html(token: &str) -> String {
    format!(
        r#"<html><body>
          <button class="read" onclick="window.open('/newspaper/newsletter.php?file={token}', '_blank')">Read Now</button>
        </body></html>"#
    )
}

/// Intermediate page with the download button and, optionally, a script
/// redirect to `target`.
pub fn newsletter_html(target: Option<&str>) -> String {
    let script = target
        .map(|t| {
            format!(
                r#"<script>
                  document.getElementById('downloadBtn').addEventListener('click', function () {{
                    window.location.href = "{t}";
                  }});
                </script>"#
            )
        })
        .unwrap_or_default();
    format!(r#"<html><body><button id="downloadBtn">Download</button>{script}</body></html>"#)
}
