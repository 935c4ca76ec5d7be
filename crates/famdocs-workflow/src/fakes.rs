//! In-process collaborator fakes.
//!
//! The store is a real in-memory [`SqliteStore`]; the remote collaborators are
//! replaced by fakes that record their calls and can be told to fail.

use std::{
  collections::{BTreeSet, HashMap},
  sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
  },
};

use chrono::NaiveDate;
use famdocs_core::{
  claims::{ClaimSet, Credential, Role, VerifiedIdentity},
  document::ArchiveRef,
  family::{FamilyId, Gender, NewMember},
  services::{
    ArchiveUpload, DocumentArchive, DocumentRenderer, IdentityProvider, ModelStatus,
    RenderError, TextGenerator,
  },
};
use famdocs_store_sqlite::SqliteStore;
use thiserror::Error;
use tokio::sync::Notify;

use crate::{Backend, PdfRenderer, Services};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FakeError(pub String);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

// ─── Identity ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIdentity {
  tokens:   Mutex<HashMap<String, VerifiedIdentity>>,
  accounts: Mutex<HashMap<String, (String, String)>>,
  fail:     AtomicBool,
}

impl FakeIdentity {
  /// Accept `token` as a bearer token for `identity`.
  pub fn register_token(&self, token: &str, identity: VerifiedIdentity) {
    lock(&self.tokens).insert(token.to_owned(), identity);
  }

  /// Accept `username`/`password` at login, issuing `token`.
  pub fn register_account(&self, username: &str, password: &str, token: &str) {
    lock(&self.accounts).insert(username.to_owned(), (password.to_owned(), token.to_owned()));
  }

  pub fn set_failing(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

  fn check(&self) -> Result<(), FakeError> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(FakeError("identity backend unreachable".to_owned()));
    }
    Ok(())
  }
}

impl IdentityProvider for FakeIdentity {
  type Error = FakeError;

  async fn authenticate(&self, username: &str, password: &str) -> Result<Option<Credential>, FakeError> {
    self.check()?;
    let accounts = lock(&self.accounts);
    Ok(match accounts.get(username) {
      Some((expected, token)) if expected == password => Some(Credential::bearer(token.clone())),
      _ => None,
    })
  }

  async fn verify_token(&self, token: &str) -> Result<Option<VerifiedIdentity>, FakeError> {
    self.check()?;
    Ok(lock(&self.tokens).get(token).cloned())
  }
}

// ─── Generator ───────────────────────────────────────────────────────────────

pub struct FakeGenerator {
  reply:     Mutex<Result<String, String>>,
  calls:     Mutex<Vec<(String, u32)>>,
  hang:      AtomicBool,
  available: AtomicBool,
}

impl Default for FakeGenerator {
  fn default() -> Self {
    Self {
      reply:     Mutex::new(Ok("I, the undersigned, declare the facts below.".to_owned())),
      calls:     Mutex::new(Vec::new()),
      hang:      AtomicBool::new(false),
      available: AtomicBool::new(true),
    }
  }
}

impl FakeGenerator {
  pub fn set_reply(&self, text: &str) { *lock(&self.reply) = Ok(text.to_owned()); }

  pub fn set_failure(&self, message: &str) { *lock(&self.reply) = Err(message.to_owned()); }

  /// Make every call wait forever, to exercise cancellation.
  pub fn set_hanging(&self, hang: bool) { self.hang.store(hang, Ordering::SeqCst); }

  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  /// Every `(prompt, max_tokens)` received so far.
  pub fn calls(&self) -> Vec<(String, u32)> { lock(&self.calls).clone() }
}

impl TextGenerator for FakeGenerator {
  type Error = FakeError;

  async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, FakeError> {
    lock(&self.calls).push((prompt.to_owned(), max_tokens));
    if self.hang.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    lock(&self.reply).clone().map_err(FakeError)
  }

  async fn model_status(&self) -> Result<ModelStatus, FakeError> {
    Ok(ModelStatus {
      name:      "fake-model".to_owned(),
      available: self.available.load(Ordering::SeqCst),
    })
  }
}

// ─── Archive ─────────────────────────────────────────────────────────────────

pub struct FakeArchive {
  next_id: AtomicI64,
  fail:    AtomicBool,
  hold:    AtomicBool,
  arrived: Notify,
  resume:  Notify,
  uploads: Mutex<Vec<ArchiveUpload>>,
}

impl Default for FakeArchive {
  fn default() -> Self {
    Self {
      next_id: AtomicI64::new(42),
      fail:    AtomicBool::new(false),
      hold:    AtomicBool::new(false),
      arrived: Notify::new(),
      resume:  Notify::new(),
      uploads: Mutex::new(Vec::new()),
    }
  }
}

impl FakeArchive {
  pub const BASE_URL: &'static str = "http://archive.test";

  pub fn set_failing(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

  /// Park every upload after it is stored until [`FakeArchive::resume`].
  pub fn set_holding(&self, hold: bool) { self.hold.store(hold, Ordering::SeqCst); }

  /// Wait until a held upload has been stored.
  pub async fn upload_arrived(&self) { self.arrived.notified().await; }

  pub fn resume(&self) { self.resume.notify_one(); }

  pub fn uploads(&self) -> Vec<ArchiveUpload> { lock(&self.uploads).clone() }
}

impl DocumentArchive for FakeArchive {
  type Error = FakeError;

  async fn upload(&self, upload: ArchiveUpload) -> Result<ArchiveRef, FakeError> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(FakeError("archive rejected the upload".to_owned()));
    }
    lock(&self.uploads).push(upload);
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    if self.hold.load(Ordering::SeqCst) {
      self.arrived.notify_one();
      self.resume.notified().await;
    }
    Ok(ArchiveRef {
      id,
      url: format!("{}/documents/{id}/", Self::BASE_URL),
    })
  }
}

// ─── Renderer ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeRenderer {
  fail:    AtomicBool,
  renders: AtomicUsize,
}

impl FakeRenderer {
  pub fn set_failing(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

  pub fn renders(&self) -> usize { self.renders.load(Ordering::SeqCst) }
}

impl DocumentRenderer for FakeRenderer {
  fn render(&self, title: &str, body: &str, date: NaiveDate) -> Result<Vec<u8>, RenderError> {
    self.renders.fetch_add(1, Ordering::SeqCst);
    if self.fail.load(Ordering::SeqCst) {
      return Err(RenderError::Failed("renderer told to fail".to_owned()));
    }
    PdfRenderer.render(title, body, date)
  }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

pub struct FakeBackend;

impl Backend for FakeBackend {
  type Store = SqliteStore;
  type Identity = FakeIdentity;
  type Generator = FakeGenerator;
  type Archive = FakeArchive;
  type Renderer = FakeRenderer;
}

/// Fresh services over an empty in-memory store.
pub async fn services() -> Services<FakeBackend> {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  Services::new(
    store,
    FakeIdentity::default(),
    FakeGenerator::default(),
    FakeArchive::default(),
    FakeRenderer::default(),
  )
}

pub fn identity(identity_id: &str, roles: &[Role]) -> VerifiedIdentity {
  VerifiedIdentity {
    identity_id:  identity_id.to_owned(),
    username:     identity_id.to_owned(),
    display_name: identity_id.to_owned(),
    email:        None,
    roles:        roles.iter().copied().collect::<BTreeSet<_>>(),
  }
}

pub fn claims(roles: &[Role], family_id: Option<FamilyId>) -> ClaimSet {
  ClaimSet::from_identity(identity("caller", roles), family_id)
}

pub fn new_member(family_id: FamilyId, full_name: &str, email: &str) -> NewMember {
  NewMember {
    family_id,
    identity_id: None,
    full_name: full_name.to_owned(),
    birth_date: NaiveDate::from_ymd_opt(1988, 11, 23).unwrap_or_default(),
    gender: Gender::Other,
    nationality: "Brazilian".to_owned(),
    email: email.to_owned(),
    address: Default::default(),
    role: Default::default(),
  }
}
