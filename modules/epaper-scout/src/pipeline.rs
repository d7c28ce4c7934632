//! Orchestrator: one sequential pass over the configured publications.
//!
//! For each publication the pipeline either skips (a terminal record already
//! exists), archives the edition, or records a fallback link. Errors that
//! escape a publication are caught at the per-publication boundary and end up
//! as `Failed` in the run summary without stopping the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, info_span, warn, Instrument};

use epaper_archive::{
    ArchiveLayout, Compression, CompressionOutcome, Compressor, DownloadRecord, HistoryStore,
    NoCompression, PdfCompressor, RetentionManager,
};
use epaper_common::{Config, EditionDate, Publication};

use crate::fetcher::{Fetcher, RetryPolicy};
use crate::locator::{Candidate, Locator, ResolutionStage};
use crate::notify::{Notification, NotifyBackend};
use crate::summary::{PublicationOutcome, PublicationReport, RunSummary};
use crate::transport::Transport;

pub struct Pipeline {
    publications: Vec<Publication>,
    locator: Locator,
    fetcher: Fetcher,
    layout: ArchiveLayout,
    history: HistoryStore,
    retention: RetentionManager,
    compressor: Arc<dyn Compressor>,
    notifier: Box<dyn NotifyBackend>,
    public_base_url: Option<String>,
    candidate_pause: Duration,
    publication_pause: Duration,
}

impl Pipeline {
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn Transport>,
        notifier: Box<dyn NotifyBackend>,
    ) -> Self {
        let compressor: Arc<dyn Compressor> = if config.compress {
            Arc::new(PdfCompressor)
        } else {
            Arc::new(NoCompression)
        };

        Self {
            publications: config.publications.clone(),
            locator: Locator::new(transport.clone(), &config.site_url, config.fetch.page_timeout),
            fetcher: Fetcher::new(
                transport,
                RetryPolicy::from(&config.fetch),
                config.fetch.download_timeout,
            ),
            layout: ArchiveLayout::new(&config.archive_dir),
            history: HistoryStore::open(&config.history_file),
            retention: RetentionManager::new(&config.archive_dir, config.retention),
            compressor,
            notifier,
            public_base_url: config.public_base_url.clone(),
            candidate_pause: config.fetch.candidate_pause,
            publication_pause: config.fetch.publication_pause,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub async fn run(&mut self, date: EditionDate) -> RunSummary {
        let publications = self.publications.clone();
        let mut reports = Vec::with_capacity(publications.len());
        let mut previous_hit_network = false;

        for publication in &publications {
            if previous_hit_network {
                tokio::time::sleep(self.publication_pause).await;
            }

            let span = info_span!("publication", name = publication.name.as_str());
            let outcome = match self.process(publication, date).instrument(span).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(publication = publication.name.as_str(), error = %format!("{e:#}"), "Publication failed");
                    PublicationOutcome::Failed {
                        error: format!("{e:#}"),
                    }
                }
            };

            previous_hit_network = outcome != PublicationOutcome::Skipped;
            reports.push(PublicationReport {
                publication: publication.name.clone(),
                outcome,
            });
        }

        let retention = self.retention.enforce(date.date());
        let summary = RunSummary {
            date,
            reports,
            retention,
        };
        info!(%summary, "Run complete");
        summary
    }

    async fn process(
        &mut self,
        publication: &Publication,
        date: EditionDate,
    ) -> anyhow::Result<PublicationOutcome> {
        if self.history.has_record(&publication.name, date) {
            info!(date = %date, "Already recorded, skipping");
            return Ok(PublicationOutcome::Skipped);
        }

        self.layout
            .prepare_month_dir(date)
            .context("preparing month folder")?;
        let partial = self.layout.partial_path(publication, date);

        let mut reference: Option<String> = None;
        let mut last_tried: Option<String> = None;
        let mut reason = String::from("no candidates");

        for stage in ResolutionStage::ALL {
            let resolution = self.locator.resolve(stage, publication, date).await;
            if let Some(url) = resolution.reference {
                reference = Some(url);
            }
            if let Some(note) = resolution.note {
                reason = format!("{stage}: {note}");
            }

            for (i, candidate) in resolution.candidates.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(self.candidate_pause).await;
                }
                info!(stage = %stage, kind = candidate.kind(), url = candidate.url(), "Trying candidate");
                last_tried = Some(candidate.url().to_string());

                match self.fetcher.fetch(candidate.url(), &partial).await {
                    Ok(_) => return self.complete(publication, date, candidate, &partial).await,
                    Err(e) => {
                        warn!(url = candidate.url(), error = %e, "Candidate exhausted");
                        reason = e.to_string();
                    }
                }
            }
        }

        let fallback_url = reference
            .or(last_tried)
            .unwrap_or_else(|| self.locator.listing_url());
        self.fallback(publication, date, fallback_url, reason).await
    }

    async fn complete(
        &mut self,
        publication: &Publication,
        date: EditionDate,
        candidate: &Candidate,
        partial: &Path,
    ) -> anyhow::Result<PublicationOutcome> {
        let artifact = self.layout.artifact_path(publication, date);
        tokio::fs::rename(partial, &artifact)
            .await
            .with_context(|| format!("moving download into {}", artifact.display()))?;

        let compression = self.compress(artifact).await;

        let download_url = self
            .public_base_url
            .as_deref()
            .map(|base| self.layout.download_reference(base, &compression.path));

        self.history.append(DownloadRecord::completed(
            &publication.name,
            date,
            &compression.path,
            candidate.url(),
            download_url.clone(),
            compression.stored_bytes,
        ))?;
        info!(
            path = %compression.path.display(),
            bytes = compression.stored_bytes,
            "Edition archived"
        );

        self.notify(Notification::completed(
            &publication.name,
            date,
            compression.stored_bytes,
            download_url.as_deref(),
        ))
        .await;

        Ok(PublicationOutcome::Completed {
            source_url: candidate.url().to_string(),
            file_path: compression.path,
            size_bytes: compression.stored_bytes,
        })
    }

    /// Compress on the blocking pool. A compressor that panics leaves the
    /// artifact as downloaded.
    async fn compress(&self, artifact: PathBuf) -> Compression {
        let compressor = self.compressor.clone();
        let path = artifact.clone();
        match tokio::task::spawn_blocking(move || compressor.compress(&path)).await {
            Ok(compression) => compression,
            Err(e) => {
                warn!(path = %artifact.display(), error = %e, "Compression task died, keeping original");
                let stored_bytes = tokio::fs::metadata(&artifact)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                Compression {
                    path: artifact,
                    outcome: CompressionOutcome::Failed,
                    stored_bytes,
                }
            }
        }
    }

    async fn fallback(
        &mut self,
        publication: &Publication,
        date: EditionDate,
        fallback_url: String,
        reason: String,
    ) -> anyhow::Result<PublicationOutcome> {
        warn!(url = fallback_url.as_str(), reason = reason.as_str(), "Recording fallback link");
        self.history.append(DownloadRecord::fallback(
            &publication.name,
            date,
            &fallback_url,
            &reason,
        ))?;

        self.notify(Notification::fallback(&publication.name, date, &fallback_url))
            .await;

        Ok(PublicationOutcome::Fallback {
            reference: fallback_url,
            reason,
        })
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(&notification).await {
            warn!(title = notification.title.as_str(), error = %e, "Notification failed");
        }
    }
}
