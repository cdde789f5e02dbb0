//! Watchdog — polls the feeds for fault indicators and drives a
//! fault-triggered pipeline restart without losing in-memory state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::sync::dc_locator::DcLocator;
use crate::sync::pipeline::FeedFaults;

/// Spawns the repeating fault-poll task. On fault it invokes `restart`
/// with the newly selected DC; `restart` owns terminating the old feeds,
/// marking every existing entity `Detecting` for the fresh sweep, and
/// starting a new bulk-load + change-notify pair (it needs the production
/// `DirectoryFeed` constructors, which live with the host application).
/// The mark-as-detecting step lives in `restart` rather than here so it
/// only happens when a replacement DC was actually found — marking
/// everything `Detecting` with no bulk load to follow would leave it
/// stuck there until the next successful restart.
pub fn spawn(
    locator: Arc<DcLocator>,
    faults: Arc<FeedFaults>,
    interval: Duration,
    cancel: Arc<AtomicBool>,
    mut restart: impl FnMut(String) + Send + 'static,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(interval);
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let bulk_fault = faults.bulk_load.swap(false, Ordering::SeqCst);
        let change_fault = faults.change_notify.swap(false, Ordering::SeqCst);
        if !bulk_fault && !change_fault {
            continue;
        }

        warn!(bulk_fault, change_fault, "watchdog observed a feed fault, restarting pipeline");

        match locator.select() {
            Some(dc) => {
                info!(dc, "watchdog selected a replacement domain controller");
                restart(dc);
            }
            None => {
                warn!("watchdog found no available domain controller; will retry next poll");
            }
        }
    })
}
