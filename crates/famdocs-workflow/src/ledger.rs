//! Quota Ledger: reserve, commit and release units of family quota.
//!
//! Every successful reservation is returned as a [`Reservation`] handle. The
//! handle must end in exactly one of three ways: [`Reservation::commit`],
//! [`Reservation::release`], or [`Reservation::settled_by_store`] after a store
//! transaction committed the token itself. A handle dropped any other way (an
//! early return, a panic, or the request future being dropped on client
//! disconnect) releases its token from a spawned task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use famdocs_core::{
  family::FamilyId,
  store::FamilyStore,
  subscription::{QuotaKind, ReservationToken, ReserveOutcome},
};
use tracing::{debug, info, warn};

use crate::{Result, WorkflowError};

pub struct QuotaLedger<S> {
  store: Arc<S>,
}

impl<S> Clone for QuotaLedger<S> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
    }
  }
}

impl<S: FamilyStore + 'static> QuotaLedger<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Reserve one AI request from the family's monthly allowance.
  pub async fn reserve_ai_request(&self, family_id: FamilyId) -> Result<Reservation<S>> {
    self.reserve(family_id, QuotaKind::AiRequest).await
  }

  /// Reserve one document slot. Callers in the generation workflow reserve
  /// this only after [`Self::reserve_ai_request`] succeeded.
  pub async fn reserve_document_slot(&self, family_id: FamilyId) -> Result<Reservation<S>> {
    self.reserve(family_id, QuotaKind::Document).await
  }

  /// The handle is armed before the store is asked, so a caller dropped
  /// while the write is in flight still releases the unit. Releasing a token
  /// that never got a row is a no-op.
  async fn reserve(&self, family_id: FamilyId, kind: QuotaKind) -> Result<Reservation<S>> {
    let reservation = Reservation {
      store: self.store.clone(),
      token: ReservationToken::new(),
      kind,
      family_id,
      settled: false,
    };

    let outcome = self
      .store
      .reserve_quota(family_id, kind, reservation.token)
      .await
      .map_err(WorkflowError::from_store)?;

    let err = match outcome {
      ReserveOutcome::Reserved(token) => {
        debug!(family_id, %kind, %token, "reserved quota");
        return Ok(reservation);
      }
      ReserveOutcome::NoSubscription => WorkflowError::SubscriptionNotFound(family_id),
      ReserveOutcome::Inactive(status) => WorkflowError::SubscriptionInactive(status),
      ReserveOutcome::Exhausted { ceiling } => {
        info!(family_id, %kind, ceiling, "quota exhausted");
        WorkflowError::QuotaExhausted { kind, ceiling }
      }
    };
    // Nothing was written.
    reservation.settled_by_store();
    Err(err)
  }

  /// Mark a reservation settled by token. Idempotent.
  pub async fn commit(&self, token: ReservationToken) -> Result<bool> {
    self
      .store
      .commit_reservation(token)
      .await
      .map_err(WorkflowError::from_store)
  }

  /// Undo a pending reservation by token. Idempotent; settled tokens are left
  /// alone.
  pub async fn release(&self, token: ReservationToken) -> Result<bool> {
    self
      .store
      .release_reservation(token)
      .await
      .map_err(WorkflowError::from_store)
  }

  /// Release reservations abandoned before `older_than`, e.g. by a process
  /// that died mid-request.
  pub async fn release_stale(&self, older_than: DateTime<Utc>) -> Result<usize> {
    self
      .store
      .release_stale_reservations(older_than)
      .await
      .map_err(WorkflowError::from_store)
  }

  /// Forget reservations settled before `settled_before`.
  pub async fn prune_settled(&self, settled_before: DateTime<Utc>) -> Result<usize> {
    self
      .store
      .prune_settled_reservations(settled_before)
      .await
      .map_err(WorkflowError::from_store)
  }
}

/// One reserved unit of quota.
#[must_use = "a dropped reservation is released"]
pub struct Reservation<S: FamilyStore + 'static> {
  store:     Arc<S>,
  token:     ReservationToken,
  kind:      QuotaKind,
  family_id: FamilyId,
  settled:   bool,
}

impl<S: FamilyStore + 'static> Reservation<S> {
  pub fn token(&self) -> ReservationToken { self.token }

  pub fn kind(&self) -> QuotaKind { self.kind }

  pub fn family_id(&self) -> FamilyId { self.family_id }

  pub async fn commit(mut self) -> Result<bool> {
    let committed = self
      .store
      .commit_reservation(self.token)
      .await
      .map_err(WorkflowError::from_store)?;
    self.settled = true;
    Ok(committed)
  }

  /// Release the reservation now. On a store error the handle stays armed and
  /// the release is retried from `Drop`.
  pub async fn release(mut self) -> Result<bool> {
    let released = self
      .store
      .release_reservation(self.token)
      .await
      .map_err(WorkflowError::from_store)?;
    self.settled = true;
    info!(
      family_id = self.family_id,
      kind = %self.kind,
      token = %self.token,
      released,
      "released reservation"
    );
    Ok(released)
  }

  /// Disarm the handle after a store transaction settled the token.
  pub fn settled_by_store(mut self) { self.settled = true; }
}

impl<S: FamilyStore + 'static> Drop for Reservation<S> {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    let token = self.token;
    let family_id = self.family_id;
    let kind = self.kind;

    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      warn!(
        family_id,
        %kind,
        %token,
        "no runtime to release dropped reservation; leaving it to the sweeper"
      );
      return;
    };

    let store = self.store.clone();
    handle.spawn(async move {
      match store.release_reservation(token).await {
        Ok(released) => {
          info!(family_id, %kind, %token, released, "released abandoned reservation");
        }
        Err(e) => {
          warn!(family_id, %kind, %token, error = %e, "failed to release abandoned reservation");
        }
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use std::{
    future::Future,
    task::{Context, Waker},
    time::Duration,
  };

  use famdocs_core::{
    family::NewFamily,
    subscription::{Plan, ReservationState, SubscriptionStatus},
  };
  use famdocs_store_sqlite::SqliteStore;

  use super::*;

  async fn ledger_with_family() -> (QuotaLedger<SqliteStore>, Arc<SqliteStore>, FamilyId) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let (family, _) = store
      .create_family(NewFamily {
        name: "Costa".into(),
        description: None,
        plan: Plan::Free,
      })
      .await
      .unwrap();
    (QuotaLedger::new(store.clone()), store, family.family_id)
  }

  async fn ai_usage(store: &SqliteStore, family_id: FamilyId) -> i64 {
    store
      .get_subscription(family_id)
      .await
      .unwrap()
      .unwrap()
      .usage
      .current_ai_requests_this_month
  }

  #[tokio::test]
  async fn explicit_release_restores_counter() {
    let (ledger, store, id) = ledger_with_family().await;
    let r = ledger.reserve_ai_request(id).await.unwrap();
    assert_eq!(ai_usage(&store, id).await, 1);

    assert!(r.release().await.unwrap());
    assert_eq!(ai_usage(&store, id).await, 0);
  }

  #[tokio::test]
  async fn commit_keeps_counter_and_disarms() {
    let (ledger, store, id) = ledger_with_family().await;
    let r = ledger.reserve_ai_request(id).await.unwrap();
    let token = r.token();
    assert!(r.commit().await.unwrap());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ai_usage(&store, id).await, 1);
    assert!(!ledger.release(token).await.unwrap());
  }

  #[tokio::test]
  async fn dropped_reservation_is_released() {
    let (ledger, store, id) = ledger_with_family().await;
    let r = ledger.reserve_ai_request(id).await.unwrap();
    let token = r.token();
    drop(r);

    for _ in 0..100 {
      let state = store.get_reservation(token).await.unwrap().unwrap().state;
      if state == ReservationState::Released {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
      store.get_reservation(token).await.unwrap().unwrap().state,
      ReservationState::Released
    );
    assert_eq!(ai_usage(&store, id).await, 0);
  }

  #[tokio::test]
  async fn reservation_dropped_mid_write_is_released() {
    let (ledger, store, id) = ledger_with_family().await;

    // One poll hands the write to the connection thread; dropping the future
    // afterwards must still give the unit back.
    let mut reserving = Box::pin(ledger.reserve_ai_request(id));
    let _ = reserving.as_mut().poll(&mut Context::from_waker(Waker::noop()));
    assert_eq!(ai_usage(&store, id).await, 1);
    drop(reserving);

    for _ in 0..100 {
      if ai_usage(&store, id).await == 0 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ai_usage(&store, id).await, 0);
  }

  #[tokio::test]
  async fn rejected_reservation_leaves_nothing_behind() {
    let (ledger, store, id) = ledger_with_family().await;
    let mut held = Vec::new();
    for _ in 0..10 {
      held.push(ledger.reserve_ai_request(id).await.unwrap());
    }
    assert!(ledger.reserve_ai_request(id).await.is_err());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(ai_usage(&store, id).await, 10);

    for r in held {
      r.commit().await.unwrap();
    }
  }

  #[tokio::test]
  async fn reserve_maps_store_outcomes() {
    let (ledger, store, id) = ledger_with_family().await;

    assert!(matches!(
      ledger.reserve_document_slot(id + 1).await,
      Err(WorkflowError::SubscriptionNotFound(_))
    ));

    store
      .set_subscription_status(id, SubscriptionStatus::Expired)
      .await
      .unwrap();
    assert!(matches!(
      ledger.reserve_ai_request(id).await,
      Err(WorkflowError::SubscriptionInactive(SubscriptionStatus::Expired))
    ));
  }

  #[tokio::test]
  async fn exhaustion_names_the_dimension() {
    let (ledger, _store, id) = ledger_with_family().await;
    let mut held = Vec::new();
    for _ in 0..10 {
      held.push(ledger.reserve_ai_request(id).await.unwrap());
    }
    let err = ledger.reserve_ai_request(id).await.err().unwrap();
    assert!(matches!(
      err,
      WorkflowError::QuotaExhausted { kind: QuotaKind::AiRequest, ceiling: 10 }
    ));
    assert!(err.to_string().contains("monthly AI request"));

    for r in held {
      r.release().await.unwrap();
    }
  }
}
