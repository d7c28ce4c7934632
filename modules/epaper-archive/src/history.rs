//! Download history: the ledger that makes runs idempotent.
//!
//! One JSON document maps `YYYY-MM-DD` → publication name → terminal outcome.
//! The document is read once when the store is opened and rewritten in full on
//! every append. There is exactly one writer: whoever owns the `HistoryStore`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use epaper_common::EditionDate;

use crate::error::{ArchiveError, Result};

/// Terminal state reached for one (publication, date) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed {
        file_path: String,
        source_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        download_url: Option<String>,
        size_bytes: u64,
    },
    Fallback {
        fallback_url: String,
        #[serde(default)]
        reason: String,
    },
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// One persisted entry. Unknown fields in the document are ignored on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// A record waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub publication: String,
    pub date: EditionDate,
    pub entry: HistoryEntry,
}

impl DownloadRecord {
    pub fn completed(
        publication: &str,
        date: EditionDate,
        file_path: &Path,
        source_url: &str,
        download_url: Option<String>,
        size_bytes: u64,
    ) -> Self {
        Self::new(
            publication,
            date,
            Outcome::Completed {
                file_path: file_path.to_string_lossy().replace('\\', "/"),
                source_url: source_url.to_string(),
                download_url,
                size_bytes,
            },
        )
    }

    pub fn fallback(publication: &str, date: EditionDate, fallback_url: &str, reason: &str) -> Self {
        Self::new(
            publication,
            date,
            Outcome::Fallback {
                fallback_url: fallback_url.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    fn new(publication: &str, date: EditionDate, outcome: Outcome) -> Self {
        Self {
            publication: publication.to_string(),
            date,
            entry: HistoryEntry {
                recorded_at: Utc::now(),
                outcome,
            },
        }
    }
}

type Document = BTreeMap<String, BTreeMap<String, HistoryEntry>>;

pub struct HistoryStore {
    path: PathBuf,
    document: Document,
}

impl HistoryStore {
    /// Open the history document at `path`.
    ///
    /// A missing file is an empty history. An unreadable or corrupt file is
    /// logged, moved aside to a timestamped `<path>.corrupt-*` sibling and replaced by an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Document>(&raw) {
                Ok(document) => document,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "History file is corrupt, starting with empty history");
                    quarantine(&path);
                    Document::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No history file yet, starting fresh");
                Document::new()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "History file is unreadable, starting with empty history");
                quarantine(&path);
                Document::new()
            }
        };

        Self { path, document }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_record(&self, publication: &str, date: EditionDate) -> bool {
        self.get(publication, date).is_some()
    }

    pub fn get(&self, publication: &str, date: EditionDate) -> Option<&HistoryEntry> {
        self.document
            .get(&date.history_key())
            .and_then(|by_publication| by_publication.get(publication))
    }

    /// Number of records across all dates.
    pub fn len(&self) -> usize {
        self.document.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record and rewrite the whole document.
    /// Records are immutable: appending an existing pair is an error.
    pub fn append(&mut self, record: DownloadRecord) -> Result<()> {
        let key = record.date.history_key();
        if self.has_record(&record.publication, record.date) {
            return Err(ArchiveError::DuplicateRecord {
                publication: record.publication,
                date: key,
            });
        }

        self.document
            .entry(key.clone())
            .or_default()
            .insert(record.publication.clone(), record.entry);

        if let Err(e) = self.save() {
            // Keep memory in line with what is on disk.
            if let Some(by_publication) = self.document.get_mut(&key) {
                by_publication.remove(&record.publication);
                if by_publication.is_empty() {
                    self.document.remove(&key);
                }
            }
            return Err(e);
        }

        info!(publication = record.publication.as_str(), date = key.as_str(), "History updated");
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = sibling_path(&self.path, "tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.document)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

/// Move an unreadable history to `<path>.corrupt-<UTC timestamp>`. Earlier
/// quarantined copies are never overwritten.
fn quarantine(path: &Path) {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let mut aside = sibling_path(path, &format!("corrupt-{stamp}"));
    let mut n = 1;
    while aside.exists() {
        aside = sibling_path(path, &format!("corrupt-{stamp}-{n}"));
        n += 1;
    }
    match fs::rename(path, &aside) {
        Ok(()) => warn!(from = %path.display(), to = %aside.display(), "Moved unreadable history aside"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not move unreadable history aside"),
    }
}
