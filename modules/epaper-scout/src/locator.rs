//! Artifact locator: turns (publication, date) into ordered candidate URLs.
//!
//! Resolution is staged. `Pattern` builds URLs from the site's known upload
//! templates without touching the network. `Discovery` walks the site: the
//! listing page yields a detail link, the detail page yields a file token, the
//! intermediate "newsletter" page yields (or implies) the final artifact URL.
//!
//! Every HTML document is parsed and dropped inside a synchronous helper so
//! that no `scraper::Html` lives across an await point.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use epaper_common::{EditionDate, Publication};

use crate::transport::Transport;

const LISTING_PATH: &str = "epaper-pdf-download";

static NEWSLETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"newsletter\.php\?file=([^'"\s)]+)"#).unwrap());
static REDIRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"window\.location\.href\s*=\s*["']([^"']+)["']"#).unwrap());

static ITEM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".pdf-item").unwrap());
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".card-d-s-title").unwrap());
static READ_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.btn-read").unwrap());
static ONCLICK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[onclick]").unwrap());
static HREF_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static DOWNLOAD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#downloadBtn").unwrap());
static SCRIPT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    Pattern,
    Discovery,
}

impl ResolutionStage {
    /// Stages in the order they are tried.
    pub const ALL: [ResolutionStage; 2] = [ResolutionStage::Pattern, ResolutionStage::Discovery];
}

impl fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionStage::Pattern => write!(f, "pattern"),
            ResolutionStage::Discovery => write!(f, "discovery"),
        }
    }
}

/// A URL that may serve the artifact, plus how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// Built from upload template `template` (0-based).
    Pattern { url: String, template: usize },
    /// The listing linked straight to an artifact endpoint.
    Discovered { url: String },
    /// Reached by walking listing → detail → newsletter page.
    Navigated {
        url: String,
        detail_url: String,
        newsletter_url: String,
    },
}

impl Candidate {
    pub fn url(&self) -> &str {
        match self {
            Candidate::Pattern { url, .. }
            | Candidate::Discovered { url }
            | Candidate::Navigated { url, .. } => url,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Candidate::Pattern { .. } => "pattern",
            Candidate::Discovered { .. } => "discovered",
            Candidate::Navigated { .. } => "navigated",
        }
    }
}

/// Output of one resolution stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    /// Furthest page reached, usable as a fallback link for humans.
    pub reference: Option<String>,
    /// Why the stage produced nothing, when it didn't.
    pub note: Option<String>,
}

impl Resolution {
    fn dead_end(reference: Option<String>, note: impl Into<String>) -> Self {
        Self {
            candidates: Vec::new(),
            reference,
            note: Some(note.into()),
        }
    }
}

pub struct Locator {
    transport: Arc<dyn Transport>,
    site_url: String,
    page_timeout: Duration,
}

impl Locator {
    pub fn new(transport: Arc<dyn Transport>, site_url: &str, page_timeout: Duration) -> Self {
        Self {
            transport,
            site_url: site_url.trim_end_matches('/').to_string(),
            page_timeout,
        }
    }

    pub fn listing_url(&self) -> String {
        format!("{}/{LISTING_PATH}", self.site_url)
    }

    pub async fn resolve(
        &self,
        stage: ResolutionStage,
        publication: &Publication,
        date: EditionDate,
    ) -> Resolution {
        match stage {
            ResolutionStage::Pattern => Resolution {
                candidates: self.patterns(publication, date),
                ..Resolution::default()
            },
            ResolutionStage::Discovery => self.discover(publication).await,
        }
    }

    /// Upload-template candidates, most reliable first.
    pub fn patterns(&self, publication: &Publication, date: EditionDate) -> Vec<Candidate> {
        let filename = format!("{}+{}.pdf", publication.code, date.token());
        let encoded = encode_component(&filename);
        let site = &self.site_url;

        [
            format!("{site}/newspaper/pdf.php?file=uploads%2F{encoded}"),
            format!("{site}/newspaper/uploads/{filename}"),
            format!("{site}/uploads/{filename}"),
        ]
        .into_iter()
        .enumerate()
        .map(|(template, url)| Candidate::Pattern { url, template })
        .collect()
    }

    async fn discover(&self, publication: &Publication) -> Resolution {
        let listing_url = self.listing_url();
        info!(publication = publication.name.as_str(), url = listing_url.as_str(), "Searching listing page");

        let listing = match self.page(&listing_url).await {
            Some(html) => html,
            None => return Resolution::dead_end(Some(listing_url), "listing page unavailable"),
        };

        let Some(detail_url) = find_listing_entry(&listing, &listing_url, &publication.name) else {
            warn!(publication = publication.name.as_str(), "No listing entry matched");
            return Resolution::dead_end(Some(listing_url), "no listing entry matched");
        };
        debug!(url = detail_url.as_str(), "Listing entry found");

        if looks_like_artifact(&detail_url) {
            return Resolution {
                candidates: vec![Candidate::Discovered {
                    url: detail_url.clone(),
                }],
                reference: Some(detail_url),
                note: None,
            };
        }

        self.navigate(detail_url).await
    }

    async fn navigate(&self, detail_url: String) -> Resolution {
        let Some(detail) = self.page(&detail_url).await else {
            return Resolution::dead_end(Some(detail_url), "detail page unavailable");
        };

        let Some(token) = extract_newsletter_token(&detail) else {
            warn!(url = detail_url.as_str(), "Detail page has no newsletter link");
            return Resolution::dead_end(Some(detail_url), "no newsletter link on detail page");
        };

        let newsletter_url = format!("{}/newspaper/newsletter.php?file={token}", self.site_url);
        let Some(newsletter) = self.page(&newsletter_url).await else {
            return Resolution::dead_end(Some(newsletter_url), "newsletter page unavailable");
        };

        let redirect = extract_redirect_target(&newsletter)
            .and_then(|target| resolve_href(&newsletter_url, &target))
            .filter(|target| looks_like_artifact(target));

        if redirect.is_none() && !has_download_control(&newsletter) {
            warn!(url = newsletter_url.as_str(), "Newsletter page has no download control");
            return Resolution::dead_end(Some(newsletter_url), "no download control on newsletter page");
        }

        let url = redirect
            .unwrap_or_else(|| format!("{}/newspaper/pdf.php?file={token}", self.site_url));
        info!(url = url.as_str(), "Resolved artifact through navigation");

        Resolution {
            candidates: vec![Candidate::Navigated {
                url,
                detail_url,
                newsletter_url: newsletter_url.clone(),
            }],
            reference: Some(newsletter_url),
            note: None,
        }
    }

    async fn page(&self, url: &str) -> Option<String> {
        match self.transport.get(url, self.page_timeout).await {
            Ok(body) => Some(String::from_utf8_lossy(&body).into_owned()),
            Err(e) => {
                warn!(url, error = %e, "Page fetch failed");
                None
            }
        }
    }
}

/// Percent-encode everything but unreserved characters, so `+` becomes `%2B`
/// and a space becomes `%20`.
fn encode_component(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn resolve_href(base_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Detail link of the first listing card whose title mentions `name`.
pub fn find_listing_entry(html: &str, base_url: &str, name: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let needle = name.to_lowercase();

    let href = document
        .select(&ITEM_SEL)
        .find(|item| {
            item.select(&TITLE_SEL).any(|title| {
                title
                    .text()
                    .collect::<String>()
                    .to_lowercase()
                    .contains(&needle)
            })
        })
        .and_then(|item| item.select(&READ_SEL).next())
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| resolve_href(base_url, href));
    href
}

/// File token from a `newsletter.php?file=<token>` navigation. `onclick`
/// handlers are checked first, plain links second.
pub fn extract_newsletter_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let onclicks = document
        .select(&ONCLICK_SEL)
        .filter_map(|el| el.value().attr("onclick"));
    let hrefs = document
        .select(&HREF_SEL)
        .filter_map(|el| el.value().attr("href"));

    let token = onclicks
        .chain(hrefs)
        .find_map(|attr| NEWSLETTER_RE.captures(attr))
        .map(|caps| caps[1].to_string());
    token
}

/// Target of a `window.location.href = "..."` assignment in an inline script.
pub fn extract_redirect_target(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let target = document
        .select(&SCRIPT_SEL)
        .map(|script| script.text().collect::<String>())
        .find_map(|text| REDIRECT_RE.captures(&text).map(|caps| caps[1].to_string()));
    target
}

pub fn has_download_control(html: &str) -> bool {
    Html::parse_document(html).select(&DOWNLOAD_SEL).next().is_some()
}

/// Whether `url` points at an artifact endpoint rather than an HTML page.
pub fn looks_like_artifact(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();
    path.ends_with(".pdf") || path.ends_with("/pdf.php")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detail_html, listing_html, newsletter_html, MockResponse, MockTransport};

    const SITE: &str = "https://site.test";

    fn locator(transport: MockTransport) -> (Locator, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let locator = Locator::new(transport.clone(), "https://site.test/", Duration::from_secs(30));
        (locator, transport)
    }

    fn hindu() -> Publication {
        Publication::new("The Hindu", "TH-+Delhi")
    }

    fn date() -> EditionDate {
        EditionDate::from_ymd(2024, 3, 14).unwrap()
    }

    #[test]
    fn pattern_candidates_follow_template_order() {
        let (locator, _) = locator(MockTransport::new());
        let urls: Vec<String> = locator
            .patterns(&hindu(), date())
            .iter()
            .map(|c| c.url().to_string())
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://site.test/newspaper/pdf.php?file=uploads%2FTH-%2BDelhi%2B14-03.pdf",
                "https://site.test/newspaper/uploads/TH-+Delhi+14-03.pdf",
                "https://site.test/uploads/TH-+Delhi+14-03.pdf",
            ]
        );
    }

    #[test]
    fn component_encoding_escapes_reserved_characters() {
        assert_eq!(encode_component("A B+C.pdf"), "A%20B%2BC.pdf");
        assert_eq!(encode_component("x/y"), "x%2Fy");
    }

    #[tokio::test]
    async fn pattern_stage_never_touches_the_network() {
        let (locator, transport) = locator(MockTransport::new());
        let resolution = locator
            .resolve(ResolutionStage::Pattern, &hindu(), date())
            .await;
        assert_eq!(resolution.candidates.len(), 3);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn listing_match_is_case_insensitive_and_resolved() {
        let html = listing_html(&[
            ("Indian Express Delhi", "/epaper/indian-express"),
            ("THE HINDU - Delhi", "/epaper/the-hindu"),
        ]);
        let url = find_listing_entry(&html, "https://site.test/epaper-pdf-download", "The Hindu");
        assert_eq!(url.as_deref(), Some("https://site.test/epaper/the-hindu"));
    }

    #[test]
    fn listing_without_match_yields_nothing() {
        let html = listing_html(&[("Indian Express", "/epaper/ie")]);
        assert!(find_listing_entry(&html, "https://site.test/x", "The Hindu").is_none());
        assert!(find_listing_entry("<html><p>maintenance</p></html>", "https://site.test/x", "The Hindu").is_none());
    }

    #[test]
    fn newsletter_token_from_location_or_window_open() {
        let direct = r#"<button onclick="location.href='newsletter.php?file=abc123'">Read</button>"#;
        let popup = r#"<button onclick="window.open('/newspaper/newsletter.php?file=xyz%2B1', '_blank')">Read</button>"#;
        let link = r#"<a href="https://site.test/newspaper/newsletter.php?file=lnk">Read</a>"#;

        assert_eq!(extract_newsletter_token(direct).as_deref(), Some("abc123"));
        assert_eq!(extract_newsletter_token(popup).as_deref(), Some("xyz%2B1"));
        assert_eq!(extract_newsletter_token(link).as_deref(), Some("lnk"));
        assert!(extract_newsletter_token("<button onclick=\"go()\">x</button>").is_none());
    }

    #[test]
    fn redirect_target_is_read_from_scripts() {
        let html = r#"<html><script>
            document.getElementById('downloadBtn').onclick = function() {
                window.location.href = "/newspaper/pdf.php?file=tok";
            };
        </script></html>"#;
        assert_eq!(
            extract_redirect_target(html).as_deref(),
            Some("/newspaper/pdf.php?file=tok")
        );
        assert!(extract_redirect_target("<script>var a = 1;</script>").is_none());
    }

    #[test]
    fn artifact_detection() {
        assert!(looks_like_artifact("https://s.test/uploads/A1+14-03.PDF"));
        assert!(looks_like_artifact("https://s.test/newspaper/pdf.php?file=t"));
        assert!(!looks_like_artifact("https://s.test/epaper/the-hindu"));
        assert!(!looks_like_artifact("not a url"));
    }

    #[tokio::test]
    async fn discovery_walks_listing_detail_and_newsletter() {
        let listing_url = format!("{SITE}/epaper-pdf-download");
        let detail_url = format!("{SITE}/epaper/the-hindu");
        let newsletter_url = format!("{SITE}/newspaper/newsletter.php?file=tok42");
        let (locator, _) = locator(
            MockTransport::new()
                .on(&listing_url, MockResponse::html(&listing_html(&[("The Hindu", "/epaper/the-hindu")])))
                .on(&detail_url, MockResponse::html(&detail_html("tok42")))
                .on(&newsletter_url, MockResponse::html(&newsletter_html(None))),
        );

        let resolution = locator
            .resolve(ResolutionStage::Discovery, &hindu(), date())
            .await;

        assert_eq!(
            resolution.candidates,
            vec![Candidate::Navigated {
                url: format!("{SITE}/newspaper/pdf.php?file=tok42"),
                detail_url,
                newsletter_url: newsletter_url.clone(),
            }]
        );
        assert_eq!(resolution.reference, Some(newsletter_url));
    }

    #[tokio::test]
    async fn discovery_prefers_script_redirect_target() {
        let listing_url = format!("{SITE}/epaper-pdf-download");
        let newsletter_url = format!("{SITE}/newspaper/newsletter.php?file=tok42");
        let (locator, _) = locator(
            MockTransport::new()
                .on(&listing_url, MockResponse::html(&listing_html(&[("The Hindu", "/epaper/the-hindu")])))
                .on(&format!("{SITE}/epaper/the-hindu"), MockResponse::html(&detail_html("tok42")))
                .on(&newsletter_url, MockResponse::html(&newsletter_html(Some("pdf.php?file=real%2Ffile.pdf")))),
        );

        let resolution = locator
            .resolve(ResolutionStage::Discovery, &hindu(), date())
            .await;

        assert_eq!(
            resolution.candidates[0].url(),
            "https://site.test/newspaper/pdf.php?file=real%2Ffile.pdf"
        );
    }

    #[tokio::test]
    async fn discovery_uses_direct_artifact_link_without_navigation() {
        let listing_url = format!("{SITE}/epaper-pdf-download");
        let (locator, transport) = locator(MockTransport::new().on(
            &listing_url,
            MockResponse::html(&listing_html(&[("The Hindu", "/uploads/TH-+Delhi+14-03.pdf")])),
        ));

        let resolution = locator
            .resolve(ResolutionStage::Discovery, &hindu(), date())
            .await;

        assert_eq!(resolution.candidates[0].kind(), "discovered");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_listing_keeps_listing_as_reference() {
        let (locator, _) = locator(MockTransport::new());
        let resolution = locator
            .resolve(ResolutionStage::Discovery, &hindu(), date())
            .await;

        assert!(resolution.candidates.is_empty());
        assert_eq!(resolution.reference.as_deref(), Some("https://site.test/epaper-pdf-download"));
        assert_eq!(resolution.note.as_deref(), Some("listing page unavailable"));
    }

    #[tokio::test]
    async fn newsletter_without_download_control_aborts_with_furthest_reference() {
        let listing_url = format!("{SITE}/epaper-pdf-download");
        let newsletter_url = format!("{SITE}/newspaper/newsletter.php?file=tok42");
        let (locator, _) = locator(
            MockTransport::new()
                .on(&listing_url, MockResponse::html(&listing_html(&[("The Hindu", "/epaper/the-hindu")])))
                .on(&format!("{SITE}/epaper/the-hindu"), MockResponse::html(&detail_html("tok42")))
                .on(&newsletter_url, MockResponse::html("<html><body>Please log in</body></html>")),
        );

        let resolution = locator
            .resolve(ResolutionStage::Discovery, &hindu(), date())
            .await;

        assert!(resolution.candidates.is_empty());
        assert_eq!(resolution.reference, Some(newsletter_url));
    }
}
