//! The `FamilyStore` trait: the relational datastore collaborator.
//!
//! Implemented by storage backends (e.g. `famdocs-store-sqlite`). The workflow
//! and the HTTP layer depend on this abstraction, not on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  document::{Document, DocumentId, NewDocument},
  family::{Family, FamilyId, FamilyMember, MemberId, NewFamily, NewMember},
  subscription::{
    QuotaKind, QuotaReservation, ReservationToken, ReserveOutcome, Subscription,
    SubscriptionStatus,
  },
};

/// Coarse classification of a datastore failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
  /// A referenced row does not exist.
  NotFound,
  /// A uniqueness constraint rejected the write.
  Conflict,
  /// A subscription ceiling rejected the write.
  LimitReached,
  /// The input failed validation.
  Invalid,
  /// Anything else: I/O, corruption, decode failures.
  Fault,
}

/// Implemented by store error types so callers that are generic over the
/// backend can still tell rejected input apart from faults.
pub trait ClassifyError {
  fn kind(&self) -> StoreErrorKind;
}

/// Abstraction over the family datastore.
///
/// Subscriptions and members are owned by their family; documents are owned by
/// their family and cascade away with the member they concern.
///
/// The quota operations are the only ones with concurrency requirements:
/// [`FamilyStore::reserve_quota`] must be a single atomic conditional
/// increment against the family's subscription row, so concurrent reservations
/// for one family can never push usage past its ceiling.
pub trait FamilyStore: Send + Sync {
  type Error: std::error::Error + ClassifyError + Send + Sync + 'static;

  // ── Families ──────────────────────────────────────────────────────────

  /// Create a family together with its subscription, using the plan's
  /// ceilings and zeroed usage.
  fn create_family(
    &self,
    input: NewFamily,
  ) -> impl Future<Output = Result<(Family, Subscription), Self::Error>> + Send + '_;

  fn get_family(
    &self,
    id: FamilyId,
  ) -> impl Future<Output = Result<Option<Family>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  fn get_subscription(
    &self,
    family_id: FamilyId,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  /// Returns the updated subscription, or `None` if the family has none.
  fn set_subscription_status(
    &self,
    family_id: FamilyId,
    status: SubscriptionStatus,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  /// Start a new billing cycle: reset the monthly AI-request counter.
  ///
  /// Pending AI-request reservations stay pending and are carried into the
  /// new cycle, so the counter restarts at their number rather than zero.
  fn reset_monthly_ai_requests(
    &self,
    family_id: FamilyId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Members ───────────────────────────────────────────────────────────

  /// Add a member, counting it against the family's member ceiling.
  fn add_member(
    &self,
    input: NewMember,
  ) -> impl Future<Output = Result<FamilyMember, Self::Error>> + Send + '_;

  fn get_member(
    &self,
    id: MemberId,
  ) -> impl Future<Output = Result<Option<FamilyMember>, Self::Error>> + Send + '_;

  /// Look up the member linked to an identity-backend subject.
  fn member_by_identity<'a>(
    &'a self,
    identity_id: &'a str,
  ) -> impl Future<Output = Result<Option<FamilyMember>, Self::Error>> + Send + 'a;

  fn list_members(
    &self,
    family_id: FamilyId,
  ) -> impl Future<Output = Result<Vec<FamilyMember>, Self::Error>> + Send + '_;

  /// Delete a member and, by cascade, that member's documents. Returns
  /// `false` if the member did not exist.
  fn delete_member(
    &self,
    id: MemberId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Record a document directly, counting it against the document ceiling.
  fn add_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    id: DocumentId,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn list_member_documents(
    &self,
    member_id: MemberId,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Persist a generated document and commit every reservation that paid for
  /// it, in one transaction. Fails without side effects if any token is no
  /// longer pending.
  fn record_generated_document<'a>(
    &'a self,
    input: NewDocument,
    tokens: &'a [ReservationToken],
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'a;

  // ── Quota reservations ────────────────────────────────────────────────

  /// Atomically check the subscription and increment the counter for `kind`,
  /// recording a pending reservation under the caller-chosen `token`.
  ///
  /// The caller picks the token so it can arm a release for it before the
  /// write lands.
  fn reserve_quota(
    &self,
    family_id: FamilyId,
    kind: QuotaKind,
    token: ReservationToken,
  ) -> impl Future<Output = Result<ReserveOutcome, Self::Error>> + Send + '_;

  /// Mark a pending reservation committed. Returns whether a transition
  /// happened; settled tokens are left alone.
  fn commit_reservation(
    &self,
    token: ReservationToken,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Mark a pending reservation released and undo its increment. Returns
  /// whether a transition happened; settled tokens are left alone.
  fn release_reservation(
    &self,
    token: ReservationToken,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn get_reservation(
    &self,
    token: ReservationToken,
  ) -> impl Future<Output = Result<Option<QuotaReservation>, Self::Error>> + Send + '_;

  /// Release every reservation still pending that was created before
  /// `older_than`. Returns how many were released.
  fn release_stale_reservations(
    &self,
    older_than: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Delete committed and released reservations settled before
  /// `settled_before`. Pending rows are never touched. Returns how many rows
  /// were deleted.
  fn prune_settled_reservations(
    &self,
    settled_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
