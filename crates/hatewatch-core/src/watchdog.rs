//! Low-frequency reconciliation sweep.
//!
//! Catches messages the observer missed (virtualized re-renders, batches
//! its filters did not qualify) once the document has been quiet for a
//! while, without duplicating the work of the debounced observer path
//! during bursts.

use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

use crate::scan::ScanCoordinator;
use crate::state::SharedSession;

pub struct ActivityWatchdog {
    ticker: Interval,
    quiet_threshold: Duration,
}

impl ActivityWatchdog {
    pub fn new(period: Duration, quiet_threshold: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            quiet_threshold,
        }
    }

    /// Waits for the next period. Cancel-safe.
    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }

    /// A sweep is due when the session is active, has been quiet for longer
    /// than the threshold, and some candidate is still unannotated.
    pub fn should_sweep(&self, session: &SharedSession, coordinator: &ScanCoordinator) -> bool {
        session.is_active()
            && session.quiet_for() > self.quiet_threshold
            && coordinator.has_unannotated_candidates()
    }
}
