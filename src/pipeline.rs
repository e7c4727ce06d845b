//! The write path: capture → fetch → categorize → save.
//!
//! [`Pipeline`] owns one instance of each stage for a run. Stages run in
//! strict sequence; only fetching fans out internally. Cancellation is
//! checked around every stage, and a cancelled run returns
//! [`PipelineOutcome::Cancelled`] without writing anything.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::capture::TabCapture;
use crate::categorize::{CategorizeStats, Categorizer, ProviderKind};
use crate::config::Config;
use crate::fetch::ContentFetcher;
use crate::models::CaptureSession;
use crate::progress::{PipelineProgressEvent, ProgressMode, ProgressReporter};
use crate::save::{Ledger, SaveOutcome, TabSaver};

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Provider to try before the configured preference order.
    pub provider: Option<String>,
    /// Run every stage except save.
    pub dry_run: bool,
    pub progress: ProgressMode,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            provider: None,
            dry_run: false,
            progress: ProgressMode::Off,
        }
    }
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Saved {
        session: CaptureSession,
        stats: CategorizeStats,
        saved: SaveOutcome,
    },
    DryRun {
        session: CaptureSession,
        stats: CategorizeStats,
    },
    Cancelled,
}

pub struct Pipeline {
    capture: TabCapture,
    fetcher: ContentFetcher,
    categorizer: Categorizer,
    saver: TabSaver,
    ledger: Ledger,
}

impl Pipeline {
    pub fn new(
        capture: TabCapture,
        fetcher: ContentFetcher,
        categorizer: Categorizer,
        saver: TabSaver,
        ledger: Ledger,
    ) -> Self {
        Self {
            capture,
            fetcher,
            categorizer,
            saver,
            ledger,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            TabCapture::from_config(&config.capture).context("Invalid [capture] config")?,
            ContentFetcher::new(&config.fetch).context("Failed to build HTTP client")?,
            Categorizer::from_config(&config.categorize)?,
            TabSaver::from_config(&config.storage),
            Ledger::from_config(&config.storage),
        ))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn run(
        &self,
        options: &CaptureOptions,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let preferred = match options.provider.as_deref() {
            Some(name) => Some(name.parse::<ProviderKind>()?.as_str()),
            None => None,
        };

        let started_at = Utc::now();
        progress.report(PipelineProgressEvent::Capturing {
            endpoint: self.capture.endpoint().to_string(),
        });
        let mut tabs = tokio::select! {
            _ = cancel.cancelled() => return Ok(PipelineOutcome::Cancelled),
            captured = self.capture.capture() => captured.context("Tab capture failed")?,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Ok(PipelineOutcome::Cancelled),
            _ = self.fetcher.fetch_session(&mut tabs, progress) => {}
        }

        let stats = tokio::select! {
            _ = cancel.cancelled() => return Ok(PipelineOutcome::Cancelled),
            stats = self.categorizer.categorize_session(&mut tabs, preferred, progress) => stats,
        };

        if cancel.is_cancelled() {
            return Ok(PipelineOutcome::Cancelled);
        }

        let session = CaptureSession::new(started_at, tabs);
        if options.dry_run {
            return Ok(PipelineOutcome::DryRun { session, stats });
        }

        progress.report(PipelineProgressEvent::Saving {
            tabs: session.len() as u64,
        });
        let saved = self
            .saver
            .save(&session, &self.ledger)
            .context("Failed to save session")?;

        Ok(PipelineOutcome::Saved {
            session,
            stats,
            saved,
        })
    }
}

/// Build every stage from `config` and run the pipeline once.
pub async fn run_capture(
    config: &Config,
    options: &CaptureOptions,
    cancel: &CancellationToken,
) -> Result<PipelineOutcome> {
    let pipeline = Pipeline::from_config(config)?;
    let reporter = options.progress.reporter();
    pipeline.run(options, reporter.as_ref(), cancel).await
}
