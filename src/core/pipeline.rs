use std::fmt;
use std::time::Duration;
use tracing::info;

use super::assets::AssetMaterializer;
use super::reconciler::{Applied, BrandRegistry, ExistingIndex, Reconciler};
use crate::catalog::Candidate;
use crate::error::{SyncError, SyncResult};
use crate::extract::{Extractor, PixelInspector, Rejection};
use crate::logging::{LogContext, RunTimer};
use crate::scraper::{PageFetcher, Politeness};
use crate::sources::SourceAdapter;
use crate::store::{ContentStore, MotorcycleQuery};
use crate::utils::format_duration;
use crate::{log_error, log_info, log_warn};

/// Run-level switches
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Decide and log without any store mutation or asset upload
    pub dry_run: bool,
    /// Spacing between consecutive image uploads
    pub upload_delay: Duration,
    /// Overrides the year used when a page carries none
    pub current_year: Option<i32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            upload_delay: Duration::from_millis(300),
            current_year: None,
        }
    }
}

/// Aggregate outcome of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub source: String,
    pub dry_run: bool,
    pub candidates: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Sync summary for {}{}",
            self.source,
            if self.dry_run { " (dry run)" } else { "" }
        )?;
        writeln!(f, "  candidates: {}", self.candidates)?;
        writeln!(f, "  created:    {}", self.created)?;
        writeln!(f, "  updated:    {}", self.updated)?;
        writeln!(f, "  skipped:    {}", self.skipped)?;
        writeln!(f, "  rejected:   {}", self.rejected)?;
        writeln!(f, "  failed:     {}", self.failed)?;
        write!(f, "  duration:   {}", format_duration(self.duration))
    }
}

enum CandidateOutcome {
    Applied(Applied),
    Rejected(Rejection),
}

/// Discover, extract and reconcile one source, strictly sequentially.
pub struct SyncPipeline<'a> {
    adapter: &'a dyn SourceAdapter,
    fetcher: &'a dyn PageFetcher,
    store: &'a dyn ContentStore,
    options: SyncOptions,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        adapter: &'a dyn SourceAdapter,
        fetcher: &'a dyn PageFetcher,
        store: &'a dyn ContentStore,
        options: SyncOptions,
    ) -> Self {
        Self {
            adapter,
            fetcher,
            store,
            options,
        }
    }

    /// Run to completion. Per-candidate failures are counted in the report;
    /// only an unreachable entry point or rejected credentials end the run early.
    pub async fn run(&self) -> SyncResult<SyncReport> {
        let source = self.adapter.name();
        let timer = RunTimer::start(LogContext::new("pipeline", "sync").with_source(source));
        let mut report = SyncReport {
            source: source.to_string(),
            dry_run: self.options.dry_run,
            ..SyncReport::default()
        };

        if self.options.dry_run {
            info!("Dry run: no document will be written and no image uploaded");
        }

        let mut brands = BrandRegistry::new(self.store.brands().await?);
        let existing = self
            .store
            .motorcycles(&MotorcycleQuery::all().with_condition(self.adapter.condition()))
            .await?;
        let mut index = ExistingIndex::new(existing);
        info!("{}: {} existing {} record(s) loaded", source, index.len(), self.adapter.condition());

        let candidates = match self.adapter.discover(self.fetcher).await {
            Ok(candidates) => candidates,
            Err(error) => {
                let error = SyncError::Discovery {
                    source_name: source.to_string(),
                    error,
                };
                timer.fail("Discovery failed", &error);
                return Err(error);
            }
        };
        report.candidates = candidates.len();
        info!("{}: {} candidate(s) discovered", source, candidates.len());

        let classifier = PixelInspector::new(self.fetcher, self.adapter.asset_headers());
        let mut extractor = Extractor::new(self.adapter, &classifier);
        if let Some(year) = self.options.current_year {
            extractor = extractor.with_current_year(year);
        }
        let reconciler = Reconciler::new(
            self.store,
            AssetMaterializer::new(self.fetcher, self.store, self.options.upload_delay),
            self.options.dry_run,
        );
        let politeness = Politeness::new(self.adapter.request_delay());

        for (position, candidate) in candidates.iter().enumerate() {
            politeness.wait().await;

            let context = LogContext::new("pipeline", "candidate")
                .with_source(source)
                .with_url(candidate.url.clone())
                .at_position(position + 1);

            match self
                .process(candidate, &extractor, &reconciler, &mut brands, &mut index)
                .await
            {
                Ok(CandidateOutcome::Applied(Applied::Created { id, images })) => {
                    report.created += 1;
                    let context = context.with_status("created").with_record(id);
                    log_info!(context, "Created with {} image(s)", images);
                }
                Ok(CandidateOutcome::Applied(Applied::Patched { id, fields })) => {
                    report.updated += 1;
                    let context = context.with_status("updated").with_record(id);
                    log_info!(context, "Updated {}", fields.join(", "));
                }
                Ok(CandidateOutcome::Applied(Applied::Unchanged { id })) => {
                    report.skipped += 1;
                    let context = context.with_status("skipped").with_record(id);
                    log_info!(context, "No changes");
                }
                Ok(CandidateOutcome::Rejected(reason)) => {
                    report.rejected += 1;
                    let context = context.with_status("rejected");
                    log_info!(context, "Rejected: {}", reason);
                }
                Err(error) if error.is_fatal() => {
                    let context = context.with_status("fatal").with_error_category(error.category());
                    log_error!(context, "Stopping run: {}", error);
                    timer.fail("Sync aborted", &error);
                    return Err(error);
                }
                Err(error) => {
                    report.failed += 1;
                    let context = context.with_status("failed").with_error_category(error.category());
                    log_warn!(context, "Failed: {}", error);
                }
            }
        }

        report.duration = timer.elapsed();
        timer.finish("Sync finished", if report.failed == 0 { "ok" } else { "partial" });
        Ok(report)
    }

    async fn process(
        &self,
        candidate: &Candidate,
        extractor: &Extractor<'_>,
        reconciler: &Reconciler<'_>,
        brands: &mut BrandRegistry,
        index: &mut ExistingIndex,
    ) -> SyncResult<CandidateOutcome> {
        let raw = self
            .fetcher
            .fetch_text(&candidate.url, &self.adapter.detail_headers())
            .await?;

        let item = match extractor.extract(&raw, candidate).await {
            Ok(item) => item,
            Err(rejection) => return Ok(CandidateOutcome::Rejected(rejection)),
        };

        let brand_id = brands
            .resolve(&item.brand, self.store, self.options.dry_run)
            .await
            .map_err(|e| SyncError::reconcile(&item.model, e))?;

        let applied = reconciler
            .apply(&item, &brand_id, index, &self.adapter.asset_headers())
            .await?;
        Ok(CandidateOutcome::Applied(applied))
    }
}
