//! Job leases.
//!
//! Several instances may share one database. Each holds time-bounded leases
//! on the jobs it serves and renews them well before they expire.

use std::sync::Arc;
use std::time::Duration;

use tessera_store::{Error, Store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keeps this process's job leases alive.
pub struct LeaseKeeper {
  store: Arc<dyn Store>,
  holder_id: String,
  ttl: Duration,
  interval: Duration,
}

impl LeaseKeeper {
  pub fn new(store: Arc<dyn Store>, holder_id: impl Into<String>, ttl: Duration) -> Self {
    Self {
      store,
      holder_id: holder_id.into(),
      ttl,
      interval: (ttl / 3).max(Duration::from_millis(10)),
    }
  }

  /// Renew held leases, then claim any job without a live lease.
  ///
  /// Returns the ids of jobs held after this tick.
  pub async fn tick(&self) -> Result<Vec<i64>, Error> {
    let renewed = self.store.renew_leases(&self.holder_id, self.ttl).await?;
    let claimed = self
      .store
      .claim_unclaimed_jobs(&self.holder_id, self.ttl)
      .await?;
    debug!(
      holder_id = %self.holder_id,
      renewed = renewed,
      held = claimed.len(),
      "lease_tick"
    );
    Ok(claimed)
  }

  /// Tick until cancelled, then release every lease held.
  pub async fn run(self, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(self.interval);
    let mut held: Vec<i64> = Vec::new();

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = interval.tick() => {
          match self.tick().await {
            Ok(jobs) => {
              let new: Vec<i64> = jobs.iter().copied().filter(|id| !held.contains(id)).collect();
              if !new.is_empty() {
                info!(holder_id = %self.holder_id, jobs = ?new, "jobs_claimed");
              }
              held = jobs;
            }
            Err(e) => warn!(holder_id = %self.holder_id, error = %e, "lease_tick_failed"),
          }
        }
      }
    }

    match self.store.release_leases(&self.holder_id).await {
      Ok(released) => info!(holder_id = %self.holder_id, released = released, "leases_released"),
      Err(e) => warn!(holder_id = %self.holder_id, error = %e, "lease_release_failed"),
    }
  }
}
