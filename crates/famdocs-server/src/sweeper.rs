//! Background cleanup of the reservation ledger: releases reservations
//! abandoned by a crashed request and forgets old settled ones.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use famdocs_core::store::FamilyStore;
use famdocs_workflow::QuotaLedger;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::ReservationConfig;

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
  pub released: usize,
  pub pruned:   usize,
}

fn cutoff(age: Duration) -> DateTime<Utc> {
  let age = TimeDelta::from_std(age).unwrap_or(TimeDelta::MAX);
  Utc::now()
    .checked_sub_signed(age)
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run one sweep: release every pending reservation older than `stale_after`,
/// then delete settled reservations older than `retain_settled`.
pub async fn sweep_once<S: FamilyStore + 'static>(
  ledger: &QuotaLedger<S>,
  stale_after: Duration,
  retain_settled: Duration,
) -> famdocs_workflow::Result<Sweep> {
  let stale_cutoff = cutoff(stale_after);
  let released = ledger.release_stale(stale_cutoff).await?;
  if released > 0 {
    info!(released, cutoff = %stale_cutoff, "released stale reservations");
  }

  let settled_cutoff = cutoff(retain_settled);
  let pruned = ledger.prune_settled(settled_cutoff).await?;
  if pruned > 0 {
    info!(pruned, cutoff = %settled_cutoff, "pruned settled reservations");
  }

  Ok(Sweep { released, pruned })
}

/// Spawn the periodic sweeper onto the current runtime.
pub fn spawn<S>(store: Arc<S>, cfg: ReservationConfig) -> JoinHandle<()>
where
  S: FamilyStore + 'static,
{
  let ledger = QuotaLedger::new(store);
  let stale_after = Duration::from_secs(cfg.stale_after_secs);
  let retain_settled = Duration::from_secs(cfg.retain_settled_secs);
  let every = Duration::from_secs(cfg.sweep_interval_secs.max(1));

  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = sweep_once(&ledger, stale_after, retain_settled).await {
        warn!(error = %e, "reservation sweep failed");
      }
    }
  })
}
