//! Error type for the workflow.

use famdocs_core::{
  family::FamilyId,
  services::RenderError,
  store::{ClassifyError, StoreErrorKind},
  subscription::{QuotaKind, SubscriptionStatus},
};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("missing or invalid credentials")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(&'static str),

  #[error("{0} not found")]
  NotFound(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("family {0} has no subscription")]
  SubscriptionNotFound(FamilyId),

  #[error("subscription is {0}")]
  SubscriptionInactive(SubscriptionStatus),

  #[error("{} limit reached (ceiling {ceiling})", .kind.describe())]
  QuotaExhausted { kind: QuotaKind, ceiling: i64 },

  #[error("{0}")]
  LimitReached(String),

  #[error("text generation failed: {0}")]
  GenerationFailed(String),

  #[error("rendering failed: {0}")]
  RenderFailed(#[source] RenderError),

  #[error("archive upload failed: {0}")]
  ArchiveFailed(#[source] BoxError),

  #[error("could not persist the generated document: {0}")]
  PersistenceFailed(#[source] BoxError),

  #[error("internal error: {0}")]
  Internal(#[source] BoxError),
}

pub type Result<T, E = WorkflowError> = std::result::Result<T, E>;

impl WorkflowError {
  /// Translate a datastore failure by its classification.
  pub fn from_store<E>(err: E) -> Self
  where
    E: std::error::Error + ClassifyError + Send + Sync + 'static,
  {
    match err.kind() {
      StoreErrorKind::NotFound => Self::NotFound(err.to_string()),
      StoreErrorKind::Conflict => Self::Conflict(err.to_string()),
      StoreErrorKind::LimitReached => Self::LimitReached(err.to_string()),
      StoreErrorKind::Invalid => Self::InvalidRequest(err.to_string()),
      StoreErrorKind::Fault => Self::Internal(Box::new(err)),
    }
  }

  pub fn internal(err: impl Into<BoxError>) -> Self { Self::Internal(err.into()) }

  /// Stable machine-readable code for response bodies.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthorized",
      Self::Forbidden(_) => "forbidden",
      Self::NotFound(_) => "not_found",
      Self::InvalidRequest(_) => "invalid_request",
      Self::Conflict(_) => "conflict",
      Self::SubscriptionNotFound(_) => "subscription_not_found",
      Self::SubscriptionInactive(_) => "subscription_inactive",
      Self::QuotaExhausted { kind: QuotaKind::AiRequest, .. } => "ai_quota_exhausted",
      Self::QuotaExhausted { kind: QuotaKind::Document, .. } => "document_quota_exhausted",
      Self::LimitReached(_) => "limit_reached",
      Self::GenerationFailed(_) => "generation_failed",
      Self::RenderFailed(_) => "render_failed",
      Self::ArchiveFailed(_) => "archive_failed",
      Self::PersistenceFailed(_) => "persistence_failed",
      Self::Internal(_) => "internal",
    }
  }
}

impl From<famdocs_core::Error> for WorkflowError {
  fn from(err: famdocs_core::Error) -> Self { Self::InvalidRequest(err.to_string()) }
}
