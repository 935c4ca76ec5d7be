//! Subscriptions, quota ceilings and reservations.
//!
//! Every family owns exactly one subscription. Its four usage counters mirror
//! four ceilings, and at every committed state `0 <= usage <= ceiling`. The
//! AI-request and document counters are moved through reservations so a unit
//! of quota is held before any remote cost is incurred.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::family::FamilyId;

// ─── Plan and status ─────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
  #[default]
  Free,
  Premium,
}

impl Plan {
  /// The ceilings a new subscription on this plan starts with.
  pub fn limits(self) -> QuotaLimits {
    match self {
      Self::Free => QuotaLimits {
        max_members:               5,
        max_documents:             100,
        max_ai_requests_per_month: 10,
        max_storage_mb:            500,
      },
      Self::Premium => QuotaLimits {
        max_members:               50,
        max_documents:             100_000,
        max_ai_requests_per_month: 500,
        max_storage_mb:            10_240,
      },
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
  #[default]
  Active,
  Expired,
  Cancelled,
  Pending,
}

// ─── Counters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
  pub max_members:               i64,
  pub max_documents:             i64,
  pub max_ai_requests_per_month: i64,
  pub max_storage_mb:            i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
  pub current_members:                i64,
  pub current_documents:              i64,
  pub current_ai_requests_this_month: i64,
  pub current_storage_mb:             i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id:     i64,
  pub family_id:           FamilyId,
  pub plan:                Plan,
  pub status:              SubscriptionStatus,
  pub limits:              QuotaLimits,
  pub usage:               QuotaUsage,
  pub billing_cycle_start: DateTime<Utc>,
  pub created_at:          DateTime<Utc>,
}

impl Subscription {
  pub fn is_active(&self) -> bool { self.status == SubscriptionStatus::Active }

  /// `(used, ceiling)` for one reservable dimension.
  pub fn counter(&self, kind: QuotaKind) -> (i64, i64) {
    match kind {
      QuotaKind::AiRequest => (
        self.usage.current_ai_requests_this_month,
        self.limits.max_ai_requests_per_month,
      ),
      QuotaKind::Document => {
        (self.usage.current_documents, self.limits.max_documents)
      }
    }
  }
}

// ─── Reservations ────────────────────────────────────────────────────────────

/// The two quota dimensions consumed by document generation.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuotaKind {
  AiRequest,
  Document,
}

impl QuotaKind {
  /// Human-readable name used in error messages.
  pub fn describe(self) -> &'static str {
    match self {
      Self::AiRequest => "monthly AI request",
      Self::Document => "document",
    }
  }
}

/// Opaque handle for one reserved unit of quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationToken(pub Uuid);

impl ReservationToken {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for ReservationToken {
  fn default() -> Self { Self::new() }
}

impl std::fmt::Display for ReservationToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReservationState {
  Pending,
  Committed,
  Released,
}

/// A reservation row as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaReservation {
  pub token:      ReservationToken,
  pub family_id:  FamilyId,
  pub kind:       QuotaKind,
  pub state:      ReservationState,
  pub created_at: DateTime<Utc>,
}

/// Result of an attempt to reserve one unit of quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
  Reserved(ReservationToken),
  /// The family has no subscription row.
  NoSubscription,
  Inactive(SubscriptionStatus),
  /// The counter already sits at its ceiling.
  Exhausted { ceiling: i64 },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn free_plan_ceilings() {
    let limits = Plan::Free.limits();
    assert_eq!(limits.max_members, 5);
    assert_eq!(limits.max_documents, 100);
    assert_eq!(limits.max_ai_requests_per_month, 10);
    assert_eq!(limits.max_storage_mb, 500);
  }

  #[test]
  fn quota_kind_tags() {
    assert_eq!(QuotaKind::AiRequest.to_string(), "ai_request");
    assert_eq!("document".parse::<QuotaKind>().unwrap(), QuotaKind::Document);
  }
}
