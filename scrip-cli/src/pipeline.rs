use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scrip_config::AppConfig;
use scrip_core::{
    dedupe, emit, Anomaly, NormalizedInstrument, Normalizer, ReconSummary, Reconciler,
    SourceProfile,
};
use scrip_data::{
    read_headers, read_raw_records, write_snapshot, HttpFetcher, ListingFetcher, ReportPaths,
    ReportWriter, SnapshotPaths, SourceLocation,
};
use scrip_store::{
    DocumentSink, DocumentStore, InstrumentSink, LoadSummary, SqliteInstrumentTable, StoreResult,
};
use tracing::{debug, error, info, warn};

/// Knobs that vary between the `run` and `diff` commands.
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    pub load_sinks: bool,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: ReconSummary,
    pub reports: ReportPaths,
    pub loads: Vec<LoadSummary>,
    pub sink_failures: Vec<String>,
}

impl RunOutcome {
    pub fn validated(&self) -> bool {
        self.summary.validated
    }
}

/// Raw payload of one source plus the profile it will be normalized with.
struct Listing {
    profile: SourceProfile,
    location: SourceLocation,
    payload: Vec<u8>,
}

/// Deduplicated instruments of one source with the anomalies found on the way.
struct Prepared {
    instruments: Vec<NormalizedInstrument>,
    anomalies: Vec<Anomaly>,
}

/// Fetch, normalize, dedupe, load and reconcile two listings.
pub struct Pipeline {
    config: AppConfig,
    fetcher: Arc<dyn ListingFetcher>,
}

impl Pipeline {
    pub fn new(config: AppConfig, fetcher: Arc<dyn ListingFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn from_config(config: AppConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.fetch.timeout_secs),
            &config.fetch.user_agent,
        )?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome> {
        let (left, right) = self.fetch_sources().await?;
        if let Some(raw_dir) = &self.config.fetch.raw_dir {
            for listing in [&left, &right] {
                if let Err(err) = write_snapshot(raw_dir, &listing.profile.label, &listing.payload) {
                    warn!(source = %listing.profile.label, error = %format!("{err:#}"), "raw snapshot failed");
                }
            }
        }

        let left = prepare(left)?;
        let right = prepare(right)?;

        let (loads, sink_failures) = if options.load_sinks {
            self.load_sinks(&left.instruments, &right.instruments)
        } else {
            info!("sink loading disabled for this run");
            (Vec::new(), Vec::new())
        };

        let left_label = self.config.sources.left.profile().label;
        let right_label = self.config.sources.right.profile().label;
        let reconciliation =
            Reconciler::new(left_label, right_label).reconcile(left.instruments, right.instruments);

        let mut summary = reconciliation.summary();
        let mut anomalies = left.anomalies;
        anomalies.extend(right.anomalies);
        anomalies.append(&mut summary.anomalies);
        summary.anomalies = anomalies;

        let tables = emit(&reconciliation, &self.config.report.columns);
        let reports = ReportWriter::new(&self.config.report.output_dir)
            .write(&tables, &summary)
            .context("failed to write reconciliation reports")?;

        info!(
            run_id = %summary.run_id,
            common = summary.common,
            only_left = summary.only_left,
            only_right = summary.only_right,
            union = summary.union,
            anomalies = summary.anomalies.len(),
            validated = summary.validated,
            "merge statistics"
        );

        Ok(RunOutcome {
            summary,
            reports,
            loads,
            sink_failures,
        })
    }

    /// Download both listings and store raw snapshots under `raw_dir`.
    pub async fn snapshot(&self, raw_dir: &Path) -> Result<Vec<SnapshotPaths>> {
        let (left, right) = self.fetch_sources().await?;
        let mut written = Vec::with_capacity(2);
        for listing in [&left, &right] {
            let paths = write_snapshot(raw_dir, &listing.profile.label, &listing.payload)
                .with_context(|| format!("failed to snapshot {}", listing.profile.label))?;
            written.push(paths);
        }
        Ok(written)
    }

    /// Both sources are fetched concurrently; either failure aborts the run.
    async fn fetch_sources(&self) -> Result<(Listing, Listing)> {
        let sources = &self.config.sources;
        tokio::try_join!(
            self.fetch_listing(sources.left.profile(), &sources.left.location),
            self.fetch_listing(sources.right.profile(), &sources.right.location),
        )
    }

    async fn fetch_listing(&self, profile: SourceProfile, location: &str) -> Result<Listing> {
        let location = SourceLocation::parse(location)?;
        info!(source = %profile.label, location = %location, "fetching listing");
        let payload = self
            .fetcher
            .fetch(&location)
            .await
            .with_context(|| format!("failed to fetch {} listing from {location}", profile.label))?;
        Ok(Listing {
            profile,
            location,
            payload,
        })
    }

    fn load_sinks(
        &self,
        left: &[NormalizedInstrument],
        right: &[NormalizedInstrument],
    ) -> (Vec<LoadSummary>, Vec<String>) {
        let storage = &self.config.storage;
        let mut loads = Vec::new();
        let mut failures = Vec::new();

        if storage.documents.enabled {
            let sink = DocumentStore::open(&storage.documents.path, &storage.documents.collection)
                .map(|store| {
                    Box::new(DocumentSink::new(store, storage.documents.clear_before_load))
                        as Box<dyn InstrumentSink>
                });
            load_into("documents", sink, left, &mut loads, &mut failures);
        }
        if storage.sqlite.enabled {
            let sink = SqliteInstrumentTable::new(&storage.sqlite.path, &storage.sqlite.table)
                .map(|table| Box::new(table) as Box<dyn InstrumentSink>);
            load_into("sqlite", sink, right, &mut loads, &mut failures);
        }
        (loads, failures)
    }
}

fn load_into(
    name: &str,
    sink: StoreResult<Box<dyn InstrumentSink>>,
    rows: &[NormalizedInstrument],
    loads: &mut Vec<LoadSummary>,
    failures: &mut Vec<String>,
) {
    match sink.and_then(|sink| sink.load(rows)) {
        Ok(summary) => loads.push(summary),
        Err(err) => {
            error!(sink = name, error = %err, "sink load failed, continuing without it");
            failures.push(format!("{name}: {err}"));
        }
    }
}

fn prepare(listing: Listing) -> Result<Prepared> {
    let label = listing.profile.label.clone();
    if let Ok(headers) = read_headers(&listing.payload) {
        debug!(source = %label, columns = ?headers, "listing columns");
    }
    let records = read_raw_records(&listing.payload)
        .with_context(|| format!("failed to decode {label} listing from {}", listing.location))?;
    info!(source = %label, rows = records.len(), "decoded listing");

    let normalized = Normalizer::new(listing.profile).normalize(records);
    let deduped = dedupe(normalized.instruments, &label);
    let mut anomalies = normalized.anomalies;
    anomalies.extend(deduped.anomalies(&label));
    Ok(Prepared {
        instruments: deduped.instruments,
        anomalies,
    })
}
