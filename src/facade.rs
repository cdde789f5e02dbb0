//! `DirectoryStore` — the library's single public entry point, wiring
//! together `Store`, `SyncPipeline`, `SnapshotCodec`, `DcLocator`, and the
//! watchdog behind one owned value whose lifetime is the process. No
//! global state: a host application holds the `Arc<DirectoryStore>` and
//! everything background workers need flows from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::core::{DirError, Result};
use crate::metrics::MetricSink;
use crate::snapshot::SnapshotCodec;
use crate::store::Store;
use crate::sync::dc_locator::DcLocator;
use crate::sync::feed::DirectoryFeed;
use crate::sync::pipeline::SyncPipeline;
use crate::sync::watchdog;

/// Builds the bulk-load and change-notify feeds against a chosen DC
/// hostname. The concrete LDAP client is an external collaborator; the
/// host application supplies this factory.
pub type FeedFactory = dyn Fn(&str) -> (Box<dyn DirectoryFeed>, Box<dyn DirectoryFeed>) + Send + Sync;

pub struct DirectoryStore {
    store: Arc<Store>,
    config: StoreConfig,
    metrics: Arc<dyn MetricSink>,
    cancel: Arc<AtomicBool>,
    pipeline: Mutex<Option<SyncPipeline>>,
    snapshot_writer: Arc<Mutex<Option<JoinHandle<()>>>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryStore {
    /// Opens the store, warm-starting from the configured snapshot file
    /// if one exists and its schema descriptor matches. A missing file or
    /// a descriptor mismatch both fall back to starting empty.
    pub fn open(config: StoreConfig, metrics: Arc<dyn MetricSink>) -> Self {
        let path = config.resolved_snapshot_path();
        let flat_name = config.resolved_domain_flat_name();
        let store = match SnapshotCodec::load(&path) {
            Ok(Some(entities)) => {
                info!(path = %path.display(), count = entities.len(), "warm-starting from snapshot");
                Store::rebuild_from_snapshot(flat_name, Arc::clone(&metrics), entities)
            }
            Ok(None) => Store::new(flat_name, Arc::clone(&metrics)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot unreadable, starting empty");
                Store::new(flat_name, Arc::clone(&metrics))
            }
        };

        Self {
            store: Arc::new(store),
            config,
            metrics,
            cancel: Arc::new(AtomicBool::new(false)),
            pipeline: Mutex::new(None),
            snapshot_writer: Arc::new(Mutex::new(None)),
            watchdog: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Selects an initial DC, starts the sync pipeline against it, and
    /// spawns the watchdog that restarts the pipeline against a new DC on
    /// fault. Requires `Arc<Self>` because the watchdog's restart
    /// callback calls back into this store for the lifetime of the
    /// process.
    pub fn run(self: &Arc<Self>, locator: Arc<DcLocator>, build_feeds: Arc<FeedFactory>) -> Result<()> {
        let dc = locator
            .select_with_backoff(self.config.dc_retry_backoff_min, self.config.dc_retry_backoff_max, &self.cancel)
            .ok_or_else(|| DirError::FeedFatal("no domain controller available at startup".to_string()))?;

        self.start_pipeline_against(&dc, &build_feeds);

        let faults = {
            let guard = self.pipeline.lock().expect("lock poisoned");
            guard.as_ref().expect("pipeline just started").faults()
        };

        let this = Arc::clone(self);
        let locator_for_watchdog = Arc::clone(&locator);
        let handle = watchdog::spawn(
            locator_for_watchdog,
            faults,
            self.config.watchdog_interval,
            Arc::clone(&self.cancel),
            move |dc| this.start_pipeline_against(&dc, &build_feeds),
        );
        *self.watchdog.lock().expect("lock poisoned") = Some(handle);

        Ok(())
    }

    fn start_pipeline_against(&self, dc: &str, build_feeds: &FeedFactory) {
        info!(dc, "starting sync pipeline");
        if let Some(old) = self.pipeline.lock().expect("lock poisoned").take() {
            old.shutdown();
        }
        if let Some(old) = self.snapshot_writer.lock().expect("lock poisoned").take() {
            let _ = old.join();
        }

        // Every full bulk load — the initial one and every watchdog-driven
        // restart alike — begins by marking all existing entities
        // `Detecting`. Doing it here rather than only on the watchdog path
        // means a warm start from a snapshot also sweeps objects the
        // directory deleted while the process was down.
        self.store.mark_all_as_detecting();

        let (bulk_feed, change_feed) = build_feeds(dc);
        let store = Arc::clone(&self.store);
        let writer_store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let writer_metrics = Arc::clone(&self.metrics);
        let snapshot_path = self.config.resolved_snapshot_path();
        let defect_log_path = self.config.defect_log_path();
        let snapshot_interval = self.config.snapshot_interval;
        let writer_cancel = Arc::clone(&self.cancel);
        let snapshot_writer_slot = Arc::clone(&self.snapshot_writer);

        let pipeline = SyncPipeline::start(store, bulk_feed, change_feed, self.config.feed_queue_capacity, metrics, move || {
            info!("initial bulk load complete, starting periodic snapshot writer");
            let handle = spawn_snapshot_writer(writer_store, snapshot_path, defect_log_path, snapshot_interval, writer_cancel, writer_metrics);
            *snapshot_writer_slot.lock().expect("lock poisoned") = Some(handle);
        });

        *self.pipeline.lock().expect("lock poisoned") = Some(pipeline);
    }

    /// Cancels the pipeline, watchdog, and snapshot writer, and blocks
    /// until they have all exited.
    pub fn shutdown(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(pipeline) = self.pipeline.lock().expect("lock poisoned").take() {
            pipeline.shutdown();
        }
        if let Some(handle) = self.watchdog.lock().expect("lock poisoned").take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.snapshot_writer.lock().expect("lock poisoned").take() {
            let _ = handle.join();
        }
    }

    /// Forces an out-of-cycle snapshot write, e.g. before a clean shutdown.
    pub fn snapshot_now(&self) -> Result<()> {
        let entities = self.store.snapshot_entities();
        SnapshotCodec::save(&self.config.resolved_snapshot_path(), &entities)
    }
}

fn spawn_snapshot_writer(
    store: Arc<Store>,
    snapshot_path: std::path::PathBuf,
    defect_log_path: std::path::PathBuf,
    interval: std::time::Duration,
    cancel: Arc<AtomicBool>,
    metrics: Arc<dyn MetricSink>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(interval);
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let entities = store.snapshot_entities();
        match SnapshotCodec::save(&snapshot_path, &entities) {
            Ok(()) => {
                metrics.counter("snapshot.writes").increment(1);
            }
            Err(e) => {
                warn!(error = %e, "periodic snapshot write failed, will retry next cycle");
                metrics.counter("snapshot.write_failures").increment(1);
            }
        }

        if let Err(e) = append_defect_log(&defect_log_path, &store.drain_defects()) {
            warn!(error = %e, "failed to append to defect log");
        }
    })
}

/// Appends newly observed defects to the sibling `.log` file, one line
/// per defect.
fn append_defect_log(path: &std::path::Path, defects: &[crate::store::Defect]) -> std::io::Result<()> {
    if defects.is_empty() {
        return Ok(());
    }
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    for defect in defects {
        writeln!(file, "{:?}: {}", defect.kind, defect.message)?;
    }
    Ok(())
}
