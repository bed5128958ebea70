//! Ledger tombstone pruning.
//!
//! Deleted-todo entries only guard against a late or redelivered event for
//! the same todo. Once they are older than the retention window they are
//! dropped; an event for that todo arriving afterwards would be counted.
//! Live entries are never pruned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use common::{AppError, AppResult};

use crate::repository::ProfileRepository;

pub struct LedgerPruner {
    profiles: Arc<dyn ProfileRepository>,
    retention: Duration,
}

impl LedgerPruner {
    pub fn new(profiles: Arc<dyn ProfileRepository>, retention: Duration) -> Self {
        Self {
            profiles,
            retention,
        }
    }

    /// Remove tombstones older than the retention window.
    pub async fn prune_once(&self) -> AppResult<u64> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| AppError::internal(e.to_string()))?;
        let removed = self.profiles.prune_tombstones(Utc::now() - retention).await?;
        if removed > 0 {
            info!(removed, "Pruned todo ledger tombstones");
        }
        Ok(removed)
    }

    /// Prune every `period` until `shutdown` flips.
    pub async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(retention_secs = self.retention.as_secs(), "Ledger pruning started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.prune_once().await {
                        warn!(error = %e, "Ledger pruning failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Ledger pruning stopped");
    }
}
