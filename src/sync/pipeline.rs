//! SyncPipeline — two concurrent feed threads over bounded queues,
//! drained by a single consumer thread that is the store's only writer.
//!
//! Plain OS threads plus `std::sync::mpsc` bounded channels: a
//! background-thread-plus-channel shape, draining a channel fed by
//! producer threads rather than callback-based async feeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::core::RecordSource;
use crate::metrics::MetricSink;
use crate::store::Store;
use crate::sync::feed::DirectoryFeed;

/// Shared fault flags the watchdog polls. Set by a feed thread when its
/// feed reports a transient or fatal error.
#[derive(Default)]
pub struct FeedFaults {
    pub bulk_load: AtomicBool,
    pub change_notify: AtomicBool,
}

const IDLE_POLL: Duration = Duration::from_millis(25);

pub struct SyncPipeline {
    cancel: Arc<AtomicBool>,
    initial_load_complete: Arc<AtomicBool>,
    faults: Arc<FeedFaults>,
    bulk_handle: Option<JoinHandle<()>>,
    change_handle: Option<JoinHandle<()>>,
    consumer_handle: Option<JoinHandle<()>>,
}

impl SyncPipeline {
    /// Starts the bulk-load feed, the change-notify feed, and the single
    /// consumer thread. `on_initial_load_complete` fires once, on the
    /// consumer thread, right after `ResolveAllDeferred` + `DeleteUndetected`
    /// — the facade uses it to kick off the periodic snapshot writer.
    pub fn start(
        store: Arc<Store>,
        bulk_feed: Box<dyn DirectoryFeed>,
        change_feed: Box<dyn DirectoryFeed>,
        queue_capacity: usize,
        metrics: Arc<dyn MetricSink>,
        on_initial_load_complete: impl FnOnce() + Send + 'static,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let initial_load_complete = Arc::new(AtomicBool::new(false));
        let faults = Arc::new(FeedFaults::default());

        let (bulk_tx, bulk_rx) = sync_channel(queue_capacity.max(1));
        let (change_tx, change_rx) = sync_channel(queue_capacity.max(1));

        let bulk_handle = thread::spawn({
            let cancel = Arc::clone(&cancel);
            let faults = Arc::clone(&faults);
            move || feed_loop("bulk-load", bulk_feed, bulk_tx, &cancel, &faults.bulk_load)
        });
        let change_handle = thread::spawn({
            let cancel = Arc::clone(&cancel);
            let faults = Arc::clone(&faults);
            move || feed_loop("change-notify", change_feed, change_tx, &cancel, &faults.change_notify)
        });

        let consumer_handle = thread::spawn({
            let cancel = Arc::clone(&cancel);
            let initial_load_complete = Arc::clone(&initial_load_complete);
            move || consumer_loop(store, bulk_rx, change_rx, cancel, initial_load_complete, metrics, on_initial_load_complete)
        });

        Self {
            cancel,
            initial_load_complete,
            faults,
            bulk_handle: Some(bulk_handle),
            change_handle: Some(change_handle),
            consumer_handle: Some(consumer_handle),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn initial_load_complete(&self) -> bool {
        self.initial_load_complete.load(Ordering::SeqCst)
    }

    pub fn faults(&self) -> Arc<FeedFaults> {
        Arc::clone(&self.faults)
    }

    /// Cancels and blocks until all three threads have exited.
    pub fn shutdown(mut self) {
        self.cancel();
        for handle in [self.bulk_handle.take(), self.change_handle.take(), self.consumer_handle.take()] {
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        }
    }
}

fn feed_loop(
    name: &'static str,
    mut feed: Box<dyn DirectoryFeed>,
    tx: SyncSender<RawRecordEnvelope>,
    cancel: &AtomicBool,
    fault: &AtomicBool,
) {
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        match feed.next_record() {
            Ok(Some(record)) => {
                if tx.send(record).is_err() {
                    break; // consumer gone
                }
            }
            Ok(None) => {
                info!(feed = name, "feed exhausted");
                break;
            }
            Err(e) => {
                warn!(feed = name, error = %e, "feed reported an error");
                fault.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
}

type RawRecordEnvelope = crate::core::RawRecord;

fn consumer_loop(
    store: Arc<Store>,
    bulk_rx: Receiver<RawRecordEnvelope>,
    change_rx: Receiver<RawRecordEnvelope>,
    cancel: Arc<AtomicBool>,
    initial_load_complete: Arc<AtomicBool>,
    metrics: Arc<dyn MetricSink>,
    on_initial_load_complete: impl FnOnce() + Send + 'static,
) {
    let mut bulk_done = false;
    let mut on_complete = Some(on_initial_load_complete);
    let apply_timer = metrics.timer("pipeline.apply_record");

    loop {
        let mut made_progress = false;

        if !bulk_done {
            match bulk_rx.try_recv() {
                Ok(record) => {
                    crate::metrics::timed(&apply_timer, || {
                        let _ = store.apply_record(record, RecordSource::BulkLoad);
                    });
                    made_progress = true;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    bulk_done = true;
                    store.resolve_all_deferred();
                    store.delete_undetected();
                    initial_load_complete.store(true, Ordering::SeqCst);
                    if let Some(cb) = on_complete.take() {
                        cb();
                    }
                }
            }
        }

        match change_rx.try_recv() {
            Ok(record) => {
                crate::metrics::timed(&apply_timer, || {
                    let _ = store.apply_record(record, RecordSource::ChangeNotify);
                });
                made_progress = true;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
            }
        }

        if cancel.load(Ordering::SeqCst) {
            // Drain whatever is already in flight before exiting.
            while let Ok(record) = bulk_rx.try_recv() {
                let _ = store.apply_record(record, RecordSource::BulkLoad);
            }
            while let Ok(record) = change_rx.try_recv() {
                let _ = store.apply_record(record, RecordSource::ChangeNotify);
            }
            break;
        }

        if !made_progress {
            thread::sleep(IDLE_POLL);
        }
    }
}
