//! Bulk scan driver.
//!
//! Runs one criteria job: pages through every record of the section's source
//! collection, hands each record to the section's normalizer, and passes the
//! finished aggregate to a [`Loader`].
//!
//!   Init      resolve source, filter and normalizer (unknown names fail here)
//!   Scanning  fetch pages by cursor until an empty page or no next cursor
//!   Done      aggregate handed to the loader exactly once
//!   Failed    store/resolver fault while scanning; nothing is loaded
//!
//! Store calls are awaited one at a time and records are merged in fetch
//! order. A malformed record or a dangling reference costs only that
//! record's contribution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use locitag_common::{CriteriaConfig, LoadError, LocitagError, Result};
use locitag_store::{PageCursor, SearchStore};

use crate::evidence::GeneDiseaseAggregate;
use crate::loader::Loader;
use crate::normalise::JobContext;
use crate::registry::NormalizerRegistry;

// ── State & events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Init,
    Scanning,
    Done,
    Failed,
}

/// Progress event emitted after each page and on completion (cloneable for broadcast).
#[derive(Debug, Clone, Serialize)]
pub struct ScanProgress {
    pub job_id: Uuid,
    pub section: String,
    pub state: ScanState,
    pub pages: usize,
    pub records_seen: usize,
    pub evidence_added: usize,
    pub error: Option<String>,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub job_id: Uuid,
    pub section: String,
    pub feature: String,
    pub normalizer: String,
    pub source: String,
    pub state: ScanState,
    pub pages: usize,
    pub records_seen: usize,
    pub records_merged: usize,
    pub records_skipped: usize,
    pub references_missing: usize,
    pub evidence_added: usize,
    /// One line per skipped record.
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ScanReport {
    fn progress(&self, error: Option<String>) -> ScanProgress {
        ScanProgress {
            job_id: self.job_id,
            section: self.section.clone(),
            state: self.state,
            pages: self.pages,
            records_seen: self.records_seen,
            evidence_added: self.evidence_added,
            error,
        }
    }
}

/// A completed scan. `load` carries the loader's verdict; the aggregate is
/// kept either way.
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub aggregate: GeneDiseaseAggregate,
    pub load: std::result::Result<(), LoadError>,
}

impl ScanOutcome {
    pub fn is_loaded(&self) -> bool {
        self.load.is_ok()
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

pub struct ScanDriver<'a> {
    store: &'a dyn SearchStore,
    registry: &'a NormalizerRegistry,
    config: &'a CriteriaConfig,
    progress_tx: Option<broadcast::Sender<ScanProgress>>,
}

impl<'a> ScanDriver<'a> {
    pub fn new(store: &'a dyn SearchStore, registry: &'a NormalizerRegistry, config: &'a CriteriaConfig) -> Self {
        Self { store, registry, config, progress_tx: None }
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<ScanProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn emit(&self, report: &ScanReport, error: Option<String>) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(report.progress(error));
        }
    }

    /// Run the criteria job for `section` and load its aggregate.
    ///
    /// Returns `Err` for configuration problems (before any fetch) and for
    /// store faults while scanning. Load failures are reported in
    /// [`ScanOutcome::load`].
    #[instrument(skip(self, loader))]
    pub async fn run(&self, section: &str, loader: &dyn Loader) -> Result<ScanOutcome> {
        // ── Init ──────────────────────────────────────────────────────────────
        let section_cfg = self.config.section(section)?;
        let normalizer = self.registry.resolve(self.config, section)?;
        if normalizer.feature() != section_cfg.feature {
            return Err(LocitagError::Config(format!(
                "section '{}' tags feature '{}' but normalizer '{}' produces '{}'",
                section,
                section_cfg.feature,
                normalizer.name(),
                normalizer.feature()
            )));
        }

        let t0 = std::time::Instant::now();
        let mut report = ScanReport {
            job_id: Uuid::new_v4(),
            section: section.to_string(),
            feature: section_cfg.feature.clone(),
            normalizer: normalizer.name().to_string(),
            source: section_cfg.source.to_string(),
            state: ScanState::Init,
            pages: 0,
            records_seen: 0,
            records_merged: 0,
            records_skipped: 0,
            references_missing: 0,
            evidence_added: 0,
            warnings: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        };
        info!(
            job_id = %report.job_id,
            source = %report.source,
            normalizer = %report.normalizer,
            "Starting criteria scan"
        );
        self.emit(&report, None);

        // ── Scanning ──────────────────────────────────────────────────────────
        report.state = ScanState::Scanning;
        let mut ctx = JobContext::new(section, self.config, self.store);
        let mut aggregate = GeneDiseaseAggregate::new();
        let mut cursor: Option<PageCursor> = None;

        loop {
            let page = match self
                .store
                .query(&section_cfg.source, &section_cfg.filter, self.config.page_size, cursor.as_ref())
                .await
            {
                Ok(page) => page,
                Err(e) => return Err(self.fail(&mut report, t0, e)),
            };
            if page.records.is_empty() {
                break;
            }
            report.pages += 1;

            for doc in &page.records {
                report.records_seen += 1;
                match normalizer.normalize(doc, &mut ctx, &mut aggregate).await {
                    Ok(outcome) => {
                        report.records_merged += 1;
                        report.evidence_added += outcome.evidence_added;
                        report.references_missing += outcome.references_missing;
                    }
                    Err(e @ LocitagError::RecordFormat { .. }) => {
                        warn!(record_id = %doc.id, error = %e, "Skipping malformed record");
                        report.records_skipped += 1;
                        report.warnings.push(e.to_string());
                    }
                    Err(e @ LocitagError::NotFound { .. }) => {
                        error!(record_id = %doc.id, error = %e, "Referenced record missing, contribution skipped");
                        report.records_skipped += 1;
                        report.references_missing += 1;
                        report.warnings.push(e.to_string());
                    }
                    Err(e) => return Err(self.fail(&mut report, t0, e)),
                }
            }

            debug!(
                page = report.pages,
                records_seen = report.records_seen,
                evidence_added = report.evidence_added,
                "Page processed"
            );
            self.emit(&report, None);

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        // ── Done ──────────────────────────────────────────────────────────────
        report.state = ScanState::Done;
        report.duration_ms = t0.elapsed().as_millis() as u64;
        info!(
            job_id = %report.job_id,
            records = report.records_seen,
            skipped = report.records_skipped,
            genes = aggregate.gene_count(),
            evidence = report.evidence_added,
            duration_ms = report.duration_ms,
            "Criteria scan complete"
        );

        let load = loader.write(&report.feature, section, &aggregate).await;
        if let Err(ref e) = load {
            error!(job_id = %report.job_id, error = %e, "Loading criteria failed");
        }
        self.emit(&report, load.as_ref().err().map(|e| e.to_string()));

        Ok(ScanOutcome { report, aggregate, load })
    }

    /// Run every section tagging `feature`, in section-name order.
    ///
    /// Stops at the first section that fails; earlier outcomes are lost with it.
    pub async fn run_feature(&self, feature: &str, loader: &dyn Loader) -> Result<Vec<ScanOutcome>> {
        let mut outcomes = Vec::new();
        for section in self.config.sections_for_feature(feature) {
            outcomes.push(self.run(section, loader).await?);
        }
        Ok(outcomes)
    }

    fn fail(&self, report: &mut ScanReport, t0: std::time::Instant, e: LocitagError) -> LocitagError {
        report.state = ScanState::Failed;
        report.duration_ms = t0.elapsed().as_millis() as u64;
        error!(
            job_id = %report.job_id,
            records_seen = report.records_seen,
            error = %e,
            "Criteria scan failed"
        );
        self.emit(report, Some(e.to_string()));
        e
    }
}

/// Run one section with the default normalizers.
pub async fn run_section(
    store: &dyn SearchStore,
    config: &CriteriaConfig,
    section: &str,
    loader: &dyn Loader,
) -> Result<ScanOutcome> {
    let registry = NormalizerRegistry::with_defaults();
    ScanDriver::new(store, &registry, config).run(section, loader).await
}
