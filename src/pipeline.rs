use crate::assemble::assemble_text;
use crate::config::Config;
use crate::constants::{NOTICE_BOARD_URL, SCROLL_LISTING_URL};
use crate::detail::{DetailCollector, FragmentSelectors};
use crate::discovery::{ListingDiscoverer, ListingSource};
use crate::error::Result;
use crate::extraction::{extract_batch, ExtractionService};
use crate::fetcher::PageSession;
use crate::resolver::resolve_href;
use crate::sink::OutputSink;
use crate::types::{ConcertRecord, ListingItem};
use chrono::Local;
use metrics::{counter, histogram};
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Tallies accumulated over one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub discovered: usize,
    pub assembled: usize,
    pub fetch_errors: usize,
    pub skipped_links: usize,
    pub unreadable_rows: usize,
    pub extraction_failures: usize,
    pub attempts: u32,
    /// False when the retry budget ran out and the run carried on with
    /// whatever had been gathered.
    pub crawl_completed: bool,
}

/// Result of a complete run.
#[derive(Debug)]
pub struct RunReport {
    pub records: Vec<ConcertRecord>,
    pub stats: RunStats,
    pub artifact: PathBuf,
    pub submit_status: Option<u16>,
}

/// Sequences discovery → resolution → collection → assembly → extraction →
/// delivery, strictly one item at a time over a single page session.
pub struct CrawlPipeline {
    config: Config,
    selectors: FragmentSelectors,
}

impl CrawlPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            selectors: FragmentSelectors::default(),
        }
    }

    pub fn with_selectors(mut self, selectors: FragmentSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn listing_url(source: ListingSource) -> &'static str {
        match source {
            ListingSource::Scroll => SCROLL_LISTING_URL,
            ListingSource::Board => NOTICE_BOARD_URL,
        }
    }

    /// Crawl phase: walk the listing and assemble one text block per event.
    ///
    /// Wraps discovery/collection in the bounded retry: a fault waits out a
    /// randomized backoff and re-attempts, keeping everything gathered so
    /// far. The SeenSet lives in the discoverer across attempts, so results
    /// concatenate without duplicates. Exhausting the budget is not an
    /// error here; the partial batch continues downstream.
    pub async fn collect_texts(
        &self,
        session: &mut dyn PageSession,
        source: ListingSource,
    ) -> Result<(Vec<String>, RunStats)> {
        let listing_url = Self::listing_url(source);
        let mut discoverer = ListingDiscoverer::new(self.config.crawl.stall_threshold);
        let mut collector = DetailCollector::new(&self.selectors)?;

        let mut texts: Vec<String> = Vec::new();
        let mut pending: Vec<ListingItem> = Vec::new();
        let mut stats = RunStats::default();

        let max_attempts = self.config.crawl.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            stats.attempts = attempt;
            match self
                .crawl_once(
                    session,
                    &mut discoverer,
                    &mut collector,
                    source,
                    listing_url,
                    &mut pending,
                    &mut texts,
                    &mut stats,
                )
                .await
            {
                Ok(()) => {
                    stats.crawl_completed = true;
                    break;
                }
                Err(e) => {
                    error!(attempt, "Crawl attempt failed: {}", e);
                    counter!("bolmal_crawl_faults_total").increment(1);

                    if attempt >= max_attempts {
                        warn!(
                            collected = texts.len(),
                            "Retry budget exhausted; continuing with partial results"
                        );
                        break;
                    }
                    attempt += 1;

                    let backoff = self.backoff();
                    info!("Backing off {:?} before attempt {}", backoff, attempt);
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        // Every admitted item ended up assembled, skipped, or (after an
        // exhausted budget) still pending.
        stats.discovered = stats.assembled + stats.skipped_links + pending.len();
        stats.fetch_errors = collector.error_tally();
        stats.unreadable_rows = discoverer.skipped_rows();
        counter!("bolmal_notices_discovered_total").increment(stats.discovered as u64);
        counter!("bolmal_texts_assembled_total").increment(stats.assembled as u64);

        Ok((texts, stats))
    }

    /// One crawl attempt: extend the pending queue from discovery, then
    /// drain it item by item through resolve → collect → assemble. Items
    /// already assembled stay out of the queue, so a retry picks up where
    /// the fault interrupted.
    #[allow(clippy::too_many_arguments)]
    async fn crawl_once(
        &self,
        session: &mut dyn PageSession,
        discoverer: &mut ListingDiscoverer,
        collector: &mut DetailCollector,
        source: ListingSource,
        listing_url: &str,
        pending: &mut Vec<ListingItem>,
        texts: &mut Vec<String>,
        stats: &mut RunStats,
    ) -> Result<()> {
        discoverer
            .discover(session, source, listing_url, pending)
            .await?;

        while !pending.is_empty() {
            let item = pending.remove(0);

            let Some(href) = item.href.as_deref() else {
                warn!(label = %item.label, "Listing row carried no link; skipping");
                stats.skipped_links += 1;
                continue;
            };
            let Some(detail_url) = resolve_href(&item.source_url, href) else {
                warn!(label = %item.label, href, "Unresolvable link; skipping");
                stats.skipped_links += 1;
                continue;
            };

            let fragments = collector.collect(session, &detail_url).await;
            texts.push(assemble_text(&item, &fragments));
            stats.assembled += 1;
        }

        Ok(())
    }

    fn backoff(&self) -> Duration {
        let min_ms = self.config.crawl.backoff_min_secs * 1000;
        let max_ms = self.config.crawl.backoff_max_secs.max(self.config.crawl.backoff_min_secs) * 1000 + 1;
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
    }

    /// Extraction phase over the assembled batch.
    pub async fn extract_records(
        &self,
        extractor: &dyn ExtractionService,
        texts: &[String],
    ) -> (Vec<ConcertRecord>, usize) {
        let pacing = Duration::from_millis(self.config.extraction.pacing_ms);
        let (records, failures) = extract_batch(extractor, texts, pacing).await;
        counter!("bolmal_records_extracted_total").increment(records.len() as u64);
        counter!("bolmal_extraction_failures_total").increment(failures as u64);
        (records, failures)
    }

    /// Full run: crawl, extract, write the dated artifact, submit.
    ///
    /// The artifact is always written, even for an empty or partial batch.
    #[instrument(skip(self, session, extractor, sink))]
    pub async fn run(
        &self,
        session: &mut dyn PageSession,
        extractor: &dyn ExtractionService,
        sink: &OutputSink,
        source: ListingSource,
    ) -> Result<RunReport> {
        let t_run = Instant::now();
        info!("🚀 Starting crawl-and-extract run");

        let (texts, mut stats) = self.collect_texts(session, source).await?;
        info!(
            "✅ Crawl phase done: {} assembled, {} fetch errors, {} skipped links",
            stats.assembled, stats.fetch_errors, stats.skipped_links
        );

        let (records, extraction_failures) = self.extract_records(extractor, &texts).await;
        stats.extraction_failures = extraction_failures;
        info!(
            "✅ Extraction done: {} records, {} failures",
            records.len(),
            extraction_failures
        );

        let date = Local::now().date_naive();
        let artifact = sink.write_artifact(&records, date)?;

        let submit_status = match sink.submit(&records).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Submission failed: {}", e);
                None
            }
        };

        histogram!("bolmal_run_duration_seconds").record(t_run.elapsed().as_secs_f64());

        Ok(RunReport {
            records,
            stats,
            artifact,
            submit_status,
        })
    }
}
