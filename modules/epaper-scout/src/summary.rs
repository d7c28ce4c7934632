// Per-run summary: what happened to each publication, plus retention.

use std::fmt;
use std::path::PathBuf;

use epaper_archive::RetentionReport;
use epaper_common::EditionDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationOutcome {
    Completed {
        source_url: String,
        file_path: PathBuf,
        size_bytes: u64,
    },
    Fallback {
        reference: String,
        reason: String,
    },
    /// A terminal record already existed for this date.
    Skipped,
    /// Unexpected error; nothing was persisted.
    Failed { error: String },
}

impl PublicationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PublicationOutcome::Completed { .. } => "completed",
            PublicationOutcome::Fallback { .. } => "fallback",
            PublicationOutcome::Skipped => "skipped",
            PublicationOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationReport {
    pub publication: String,
    pub outcome: PublicationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub date: EditionDate,
    pub reports: Vec<PublicationReport>,
    pub retention: RetentionReport,
}

impl RunSummary {
    fn count(&self, label: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn completed(&self) -> usize {
        self.count("completed")
    }

    pub fn fallbacks(&self) -> usize {
        self.count("fallback")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    /// A run succeeds when at least one edition was archived by this run.
    pub fn is_success(&self) -> bool {
        self.completed() > 0
    }

    fn names(&self, label: &str) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| r.outcome.label() == label)
            .map(|r| r.publication.as_str())
            .collect()
    }

    /// Multi-line terminal report.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Summary for {}", self.date)];

        for (label, heading) in [
            ("completed", "Downloaded"),
            ("fallback", "Fallback links"),
            ("skipped", "Already done"),
            ("failed", "Failed"),
        ] {
            let names = self.names(label);
            if !names.is_empty() {
                lines.push(format!("  {heading} ({}): {}", names.len(), names.join(", ")));
            }
        }

        for report in &self.reports {
            match &report.outcome {
                PublicationOutcome::Fallback { reference, reason } => {
                    lines.push(format!("  {} -> {reference} ({reason})", report.publication));
                }
                PublicationOutcome::Failed { error } => {
                    lines.push(format!("  {} error: {error}", report.publication));
                }
                _ => {}
            }
        }

        let retention = &self.retention;
        if retention.active {
            lines.push(format!(
                "  Retention: deleted {} folder(s), {} failure(s)",
                retention.deleted.len(),
                retention.failed.len()
            ));
        } else {
            lines.push("  Retention: waiting for grace period".to_string());
        }

        lines.join("\n")
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} completed, {} fallback, {} skipped, {} failed",
            self.date,
            self.completed(),
            self.fallbacks(),
            self.skipped(),
            self.failed()
        )
    }
}
