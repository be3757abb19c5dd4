//! Expiry sweep bookkeeping and the periodic sweeper task.
//!
//! At most one sweep runs at a time. [`SweepGuard::try_acquire`] hands out
//! a permit that clears the in-flight flag when dropped, so the flag is
//! released on success, on error, and on cancellation alike.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::manager::DocumentManager;

/// Counters from one completed sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys returned by the listing.
    pub scanned: usize,
    /// Expired documents removed.
    pub deleted: usize,
    /// Documents that could not be inspected or deleted.
    pub failed: usize,
}

/// What a sweep trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// This trigger ran the sweep.
    Completed(SweepReport),
    /// Another sweep was already running.
    Skipped,
}

/// Single-flight flag for the sweep.
#[derive(Debug, Default)]
pub struct SweepGuard {
    running: AtomicBool,
}

impl SweepGuard {
    /// Take the flag, or `None` when a sweep is already in flight.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SweepPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepPermit {
                running: &self.running,
            })
    }

    /// Whether a sweep currently holds the flag.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of holding the sweep flag; releases it on drop.
#[derive(Debug)]
pub struct SweepPermit<'a> {
    running: &'a AtomicBool,
}

impl Drop for SweepPermit<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Run [`DocumentManager::cleanup`] every `period`.
///
/// The first tick is consumed immediately, so the first sweep happens one
/// `period` after spawning; callers run the startup sweep themselves. A tick
/// missed behind a slow sweep is delayed rather than replayed. Abort the
/// returned handle to stop the task.
pub fn spawn_sweeper(manager: Arc<DocumentManager>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        info!(interval_secs = period.as_secs(), "periodic sweep started");

        loop {
            ticker.tick().await;
            match manager.cleanup().await {
                Ok(SweepOutcome::Completed(report)) => {
                    debug!(
                        scanned = report.scanned,
                        deleted = report.deleted,
                        failed = report.failed,
                        "periodic sweep finished"
                    );
                }
                Ok(SweepOutcome::Skipped) => {
                    debug!("periodic sweep skipped, previous run still active");
                }
                Err(err) => warn!(error = %err, "periodic sweep failed"),
            }
        }
    })
}
