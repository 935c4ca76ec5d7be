//! Error type for `famdocs-store-sqlite`.

use famdocs_core::{
  family::{FamilyId, MemberId},
  store::{ClassifyError, StoreErrorKind},
  subscription::ReservationToken,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] famdocs_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("family not found: {0}")]
  FamilyNotFound(FamilyId),

  #[error("member {member_id} not found in family {family_id}")]
  MemberNotFound { family_id: FamilyId, member_id: MemberId },

  #[error("family {0} has no subscription")]
  NoSubscription(FamilyId),

  #[error("family {family_id} has reached its {what} ceiling of {ceiling}")]
  LimitReached {
    family_id: FamilyId,
    what:      &'static str,
    ceiling:   i64,
  },

  #[error("a member with email {0:?} already exists")]
  DuplicateMember(String),

  #[error("reservation {0} is no longer pending")]
  ReservationNotPending(ReservationToken),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl ClassifyError for Error {
  fn kind(&self) -> StoreErrorKind {
    match self {
      Error::Core(_) => StoreErrorKind::Invalid,
      Error::FamilyNotFound(_)
      | Error::MemberNotFound { .. }
      | Error::NoSubscription(_) => StoreErrorKind::NotFound,
      Error::DuplicateMember(_) | Error::ReservationNotPending(_) => {
        StoreErrorKind::Conflict
      }
      Error::LimitReached { .. } => StoreErrorKind::LimitReached,
      Error::Database(_) | Error::Json(_) | Error::Uuid(_) | Error::Decode(_) => {
        StoreErrorKind::Fault
      }
    }
  }
}
