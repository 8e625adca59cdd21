use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::services::ledger::{SeatLedger, SweepStats};

/// Periodically returns the seats of abandoned checkouts to sale.
pub struct CleanupService {
    ledger: Arc<SeatLedger>,
    interval: Duration,
}

impl CleanupService {
    pub fn new(ledger: Arc<SeatLedger>, interval: Duration) -> Self {
        // tokio::time::interval panics on a zero period
        let interval = interval.max(Duration::from_secs(1));
        Self { ledger, interval }
    }

    /// One sweep over every loaded showtime.
    pub async fn run_once(&self) -> SweepStats {
        let stats = self.ledger.sweep_expired().await;
        if stats.holds_expired == 0 {
            debug!("🧹 No expired holds to reclaim");
        } else {
            info!(
                holds = stats.holds_expired,
                seats = stats.seats_freed,
                "🧹 Expired holds reclaimed"
            );
        }
        if stats.showtimes_evicted > 0 {
            info!(showtimes = stats.showtimes_evicted, "🧹 Finished showtimes evicted");
        }
        stats
    }

    /// Runs the sweep forever on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
