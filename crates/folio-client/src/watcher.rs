//! Background portfolio watcher.
//!
//! Holds the freshest [`PortfolioSnapshot`] for one owner in a `watch`
//! channel, refreshing on a fixed cadence and immediately when an
//! invalidation signal reports that a confirmed action touched
//! portfolio-relevant data. A failed refresh keeps the last good snapshot;
//! the next tick tries again.

use std::time::Duration;

use folio_core::{Address, PortfolioSnapshot};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::action::Invalidation;
use crate::aggregate::NoteAggregator;

/// Periodically refreshed portfolio view for a single owner.
///
/// The background task is aborted when the watcher is dropped; receivers
/// observe the channel closing.
pub struct PortfolioWatcher {
    snapshots: watch::Receiver<PortfolioSnapshot>,
    handle: JoinHandle<()>,
}

impl PortfolioWatcher {
    /// Spawns the refresh task.
    ///
    /// The first refresh runs immediately; later ones run every
    /// `poll_interval` and on every portfolio-relevant invalidation.
    #[must_use]
    pub fn spawn(
        aggregator: NoteAggregator,
        owner: Address,
        poll_interval: Duration,
        invalidations: broadcast::Receiver<Invalidation>,
    ) -> Self {
        let (tx, snapshots) = watch::channel(PortfolioSnapshot::default());
        let handle = tokio::spawn(refresh_loop(
            aggregator,
            owner,
            poll_interval,
            invalidations,
            tx,
        ));
        Self { snapshots, handle }
    }

    /// Returns a receiver over snapshot updates.
    ///
    /// The channel only wakes receivers when the snapshot actually changed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PortfolioSnapshot> {
        self.snapshots.clone()
    }

    /// Returns the most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> PortfolioSnapshot {
        *self.snapshots.borrow()
    }
}

impl Drop for PortfolioWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn refresh_loop(
    aggregator: NoteAggregator,
    owner: Address,
    poll_interval: Duration,
    mut invalidations: broadcast::Receiver<Invalidation>,
    tx: watch::Sender<PortfolioSnapshot>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut invalidations_open = true;
    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            signal = invalidations.recv(), if invalidations_open => match signal {
                Ok(signal) if signal.affects_portfolio() => {
                    debug!(%owner, ?signal, "invalidation-driven refresh");
                },
                Ok(_) => continue,
                // Missed signals mean something changed; refresh.
                Err(broadcast::error::RecvError::Lagged(_)) => {},
                Err(broadcast::error::RecvError::Closed) => {
                    invalidations_open = false;
                    continue;
                },
            },
        }
        match aggregator.snapshot(&owner).await {
            Ok(snapshot) => {
                tx.send_if_modified(|current| {
                    if *current == snapshot {
                        false
                    } else {
                        *current = snapshot;
                        true
                    }
                });
            },
            Err(error) => {
                warn!(%owner, %error, "portfolio refresh failed, keeping last snapshot");
            },
        }
    }
}
