// src/driver.rs
// Multi-source sync driver: runs collection + extraction per configured
// source, sequentially, under a run lease. One source failing (even
// terminally logged-out) never stops the others.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::extractor::Extractor;
use crate::merge::merge_consecutive;
use crate::pipeline::Pipeline;
use crate::sources::ItemSource;
use crate::store::EventStore;
use crate::types::{EventRecord, SourceType};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Completed sync runs.");
        describe_counter!("sync_source_failures_total", "Sources that failed a run.");
        describe_gauge!("sync_last_run_ts", "Unix ts when the last sync run finished.");
        describe_gauge!("sync_confidence_threshold", "Publish-vs-flag cutoff in effect.");
    });
}

/// Explicit run lease: at most one sync run may be in flight, because the
/// file-backed store is single-writer. `try_acquire` is the busy/ok signal
/// the trigger surface exposes; the guard releases on drop.
#[derive(Clone, Default)]
pub struct RunLease(Arc<AtomicBool>);

pub struct RunGuard(Arc<AtomicBool>);

impl RunLease {
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(self.0.clone()))
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Aggregate outcome of one run. The caller owns side effects such as
/// notification dispatch.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub new_records: Vec<EventRecord>,
    /// Set when a source hit a session-invalid failure; an operator has to
    /// re-link before that source can sync again.
    pub needs_relink: bool,
    pub source_counts: Vec<(SourceType, usize)>,
}

impl SyncReport {
    pub fn processed_count(&self) -> usize {
        self.new_records.len()
    }
}

/// Builds a fresh source per run; each run opens its own session.
pub type SourceFactory = Box<dyn Fn() -> Box<dyn ItemSource> + Send + Sync>;

pub struct SyncDriver {
    config: SyncConfig,
    store: Arc<dyn EventStore>,
    extractor: Arc<dyn Extractor>,
    sources: Vec<SourceFactory>,
    lease: RunLease,
}

impl SyncDriver {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn EventStore>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        ensure_metrics_described();
        gauge!("sync_confidence_threshold").set(config.confidence_threshold as f64);
        Self {
            config,
            store,
            extractor,
            sources: Vec::new(),
            lease: RunLease::default(),
        }
    }

    pub fn with_source(mut self, factory: SourceFactory) -> Self {
        self.sources.push(factory);
        self
    }

    pub fn lease(&self) -> RunLease {
        self.lease.clone()
    }

    /// Run every configured source once and aggregate the new records.
    /// Rejects with `AlreadyRunning` while another run holds the lease.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.lease.try_acquire().ok_or(SyncError::AlreadyRunning)?;

        let mut ledger = self.store.load_ledger()?;
        let migrated = ledger.migrate_legacy_entries();
        if migrated > 0 {
            tracing::info!(migrated, "migrated legacy ledger entries");
            self.store.save_ledger(&ledger)?;
        }

        // Replayable histories resume from the last completed run.
        let since_ts = ledger
            .last_sync_timestamp
            .map(|t| t.timestamp())
            .unwrap_or(0);

        let mut report = SyncReport::default();
        for factory in &self.sources {
            let mut source = factory();
            let source_type = source.source_type();
            tracing::info!(source = %source_type, since_ts, "syncing source");

            match source.collect(since_ts).await {
                Ok(batches) => {
                    let mut pipeline = Pipeline::new(
                        self.store.as_ref(),
                        self.extractor.as_ref(),
                        &mut ledger,
                        self.config.confidence_threshold,
                        self.config.similarity_threshold,
                    );
                    let mut new_for_source = 0usize;
                    for batch in batches {
                        let merged =
                            merge_consecutive(batch.items, self.config.merge_window_secs);
                        let records = pipeline
                            .process_channel(&*source, &batch.channel, merged)
                            .await;
                        new_for_source += records.len();
                        report.new_records.extend(records);
                    }
                    report.source_counts.push((source_type, new_for_source));
                }
                Err(e) => {
                    counter!("sync_source_failures_total").increment(1);
                    if e.is_session_invalid() {
                        report.needs_relink = true;
                        tracing::error!(source = %source_type, "session invalidated; operator must re-link");
                    } else {
                        tracing::warn!(source = %source_type, error = %e, "source failed this run");
                    }
                    report.source_counts.push((source_type, 0));
                }
            }
            source.close().await;
        }

        ledger.last_sync_timestamp = Some(Utc::now());
        if let Err(e) = self.store.save_ledger(&ledger) {
            tracing::warn!(error = ?e, "failed to persist ledger after run");
        }

        counter!("sync_runs_total").increment(1);
        gauge!("sync_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            new = report.processed_count(),
            needs_relink = report.needs_relink,
            "sync run finished"
        );
        Ok(report)
    }
}
