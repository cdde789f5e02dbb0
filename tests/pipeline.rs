use std::sync::Arc;
use std::time::{Duration, Instant};

use dirstore::{
    CountingMetricSink, DirectoryFeed, Guid, ObjectClass, RawRecord, StaticFeed, Store, SyncPipeline,
};

fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    pred()
}

#[test]
fn bulk_feed_applies_records_and_signals_initial_load_complete() {
    let metrics = Arc::new(CountingMetricSink::new());
    let store = Arc::new(Store::new("EXAMPLE", metrics.clone()));

    let records = vec![
        RawRecord::new("CN=A", Guid::new_v4(), ObjectClass::new("top.user")),
        RawRecord::new("CN=B", Guid::new_v4(), ObjectClass::new("top.user")),
    ];
    let bulk: Box<dyn DirectoryFeed> = Box::new(StaticFeed::new(records));
    let change: Box<dyn DirectoryFeed> = Box::new(StaticFeed::new(Vec::new()));

    let (tx, rx) = std::sync::mpsc::channel();
    let pipeline = SyncPipeline::start(Arc::clone(&store), bulk, change, 16, metrics.clone(), move || {
        let _ = tx.send(());
    });

    assert!(wait_until(|| store.iter_live().count() == 2, Duration::from_secs(2)));
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok(), "initial load completion callback never fired");
    assert!(wait_until(|| pipeline.initial_load_complete(), Duration::from_secs(2)));

    pipeline.shutdown();
    assert_eq!(metrics.counter_value("store.records_applied"), 2);
}
