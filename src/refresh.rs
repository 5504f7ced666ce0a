//! Background chart refresh.
//!
//! A refresher task keeps the latest [`ChartSnapshot`] for one selected
//! window. It recomputes the snapshot:
//!
//! - once at startup,
//! - on every tick of a fixed period,
//! - whenever the statistics store reports a change,
//! - whenever the selected window changes.
//!
//! Readers get snapshots through a [`ChartFeed`] and never block the task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::aggregation::{ChartSnapshot, compute_chart};
use crate::model::TimeWindow;
use crate::storage::Storage;

/// Handle to a running chart refresher.
///
/// Clones share the same task. The task stops once every clone is dropped.
#[derive(Clone)]
pub struct ChartFeed {
    window: Arc<watch::Sender<TimeWindow>>,
    snapshots: watch::Receiver<Option<Arc<ChartSnapshot>>>,
}

impl ChartFeed {
    /// The most recently computed snapshot, if any.
    pub fn latest(&self) -> Option<Arc<ChartSnapshot>> {
        self.snapshots.borrow().clone()
    }

    /// The window the refresher is currently charting.
    pub fn window(&self) -> TimeWindow {
        *self.window.borrow()
    }

    /// Switch the refresher to another window.
    ///
    /// A new snapshot is computed right away if the window actually changed.
    pub fn set_window(&self, window: TimeWindow) {
        self.window.send_if_modified(|current| {
            if *current == window {
                return false;
            }
            *current = window;
            true
        });
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ChartSnapshot>>> {
        let mut snapshots = self.snapshots.clone();
        snapshots.mark_unchanged();
        snapshots
    }
}

/// Spawn a refresher charting `window` and re-polling every `period`.
pub fn spawn_chart_refresher(
    storage: Storage,
    window: TimeWindow,
    period: Duration,
) -> (ChartFeed, JoinHandle<()>) {
    let (window_tx, mut window_rx) = watch::channel(window);
    let (snapshot_tx, snapshot_rx) = watch::channel(None);
    let mut changes = storage.subscribe();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(window = %window, period_secs = period.as_secs(), "Chart refresher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = window_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let window = *window_rx.borrow_and_update();
            changes.mark_unchanged();

            match compute_chart(&storage, window, Utc::now()).await {
                Ok(snapshot) => {
                    debug!(window = %window, "Chart snapshot refreshed");
                    snapshot_tx.send_replace(Some(Arc::new(snapshot)));
                }
                Err(e) => {
                    warn!(window = %window, error = %e, "Failed to refresh chart");
                }
            }
        }

        info!("Chart refresher stopped");
    });

    let feed = ChartFeed {
        window: Arc::new(window_tx),
        snapshots: snapshot_rx,
    };

    (feed, handle)
}
