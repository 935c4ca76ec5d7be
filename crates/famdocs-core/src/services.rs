//! Contracts for the remote collaborators the workflow drives.
//!
//! Each is consumed only through the narrow interface below; concrete HTTP
//! clients live in `famdocs-remote`, in-process fakes in
//! `famdocs-workflow::fakes`.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  claims::{Credential, VerifiedIdentity},
  document::ArchiveRef,
};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The identity backend: password login and bearer-token verification.
pub trait IdentityProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Exchange a username and password for tokens. `None` means the backend
  /// rejected the credentials.
  fn authenticate<'a>(
    &'a self,
    username: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Option<Credential>, Self::Error>> + Send + 'a;

  /// Verify an access token. `None` means the token is invalid or expired.
  fn verify_token<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Option<VerifiedIdentity>, Self::Error>> + Send + 'a;
}

// ─── Text generation ─────────────────────────────────────────────────────────

/// Availability of a generation model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
  pub name:      String,
  pub available: bool,
}

/// The large-language-model backend.
pub trait TextGenerator: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Generate text for `prompt`, bounded by `max_tokens`.
  fn generate<'a>(
    &'a self,
    prompt: &'a str,
    max_tokens: u32,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Report the configured model and whether the backend has it loaded.
  fn model_status(
    &self,
  ) -> impl Future<Output = Result<ModelStatus, Self::Error>> + Send + '_;
}

// ─── Archive ─────────────────────────────────────────────────────────────────

/// A rendered artifact on its way to the archive.
#[derive(Debug, Clone)]
pub struct ArchiveUpload {
  pub bytes:    Vec<u8>,
  pub filename: String,
  pub title:    String,
  pub tags:     Vec<String>,
}

/// The external document archive.
pub trait DocumentArchive: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn upload(
    &self,
    upload: ArchiveUpload,
  ) -> impl Future<Output = Result<ArchiveRef, Self::Error>> + Send + '_;
}

// ─── Rendering ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("nothing to render: {0} is empty")]
  Empty(&'static str),

  #[error("render failed: {0}")]
  Failed(String),
}

/// Deterministic transform from generated text to a document byte stream.
pub trait DocumentRenderer: Send + Sync {
  fn render(
    &self,
    title: &str,
    body: &str,
    date: NaiveDate,
  ) -> Result<Vec<u8>, RenderError>;
}
