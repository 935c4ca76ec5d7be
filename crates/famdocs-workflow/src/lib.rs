//! The quota-enforced document generation workflow.
//!
//! Every component here is generic over the collaborator traits from
//! `famdocs-core`. A concrete deployment names its collaborator types once
//! through [`Backend`] and hands constructed instances to [`Services`], which
//! the server clones into every request.

pub mod admin;
pub mod chat;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod orchestrator;
pub mod prompt;
pub mod render;

#[cfg(any(test, feature = "fakes"))]
pub mod fakes;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use famdocs_core::{
  services::{DocumentArchive, DocumentRenderer, IdentityProvider, TextGenerator},
  store::FamilyStore,
};

pub use self::{
  admin::FamilyAdmin,
  chat::{ChatAnswer, ChatQuery, QueryHandler},
  error::{BoxError, Result, WorkflowError},
  guard::{AuthorizationGuard, authorize, authorize_family_scope},
  ledger::{QuotaLedger, Reservation},
  orchestrator::{GeneratedDocument, GenerationOrchestrator},
  render::PdfRenderer,
};

/// The collaborator types of one deployment.
pub trait Backend: Send + Sync + 'static {
  type Store: FamilyStore + 'static;
  type Identity: IdentityProvider + 'static;
  type Generator: TextGenerator + 'static;
  type Archive: DocumentArchive + 'static;
  type Renderer: DocumentRenderer + 'static;
}

/// Token budgets handed to the text generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
  pub document: u32,
  pub query:    u32,
}

impl Default for TokenBudget {
  fn default() -> Self {
    Self {
      document: 1500,
      query:    1000,
    }
  }
}

/// Constructed collaborator handles, injected once at startup.
pub struct Services<B: Backend> {
  pub store:     Arc<B::Store>,
  pub identity:  Arc<B::Identity>,
  pub generator: Arc<B::Generator>,
  pub archive:   Arc<B::Archive>,
  pub renderer:  Arc<B::Renderer>,
  pub budget:    TokenBudget,
}

// Derived `Clone` would demand `B: Clone`.
impl<B: Backend> Clone for Services<B> {
  fn clone(&self) -> Self {
    Self {
      store:     self.store.clone(),
      identity:  self.identity.clone(),
      generator: self.generator.clone(),
      archive:   self.archive.clone(),
      renderer:  self.renderer.clone(),
      budget:    self.budget,
    }
  }
}

impl<B: Backend> Services<B> {
  pub fn new(
    store: B::Store,
    identity: B::Identity,
    generator: B::Generator,
    archive: B::Archive,
    renderer: B::Renderer,
  ) -> Self {
    Self {
      store:     Arc::new(store),
      identity:  Arc::new(identity),
      generator: Arc::new(generator),
      archive:   Arc::new(archive),
      renderer:  Arc::new(renderer),
      budget:    TokenBudget::default(),
    }
  }

  pub fn with_budget(mut self, budget: TokenBudget) -> Self {
    self.budget = budget;
    self
  }

  pub fn guard(&self) -> AuthorizationGuard<B::Identity, B::Store> {
    AuthorizationGuard::new(self.identity.clone(), self.store.clone())
  }

  pub fn ledger(&self) -> QuotaLedger<B::Store> { QuotaLedger::new(self.store.clone()) }

  pub fn orchestrator(&self) -> GenerationOrchestrator<B> {
    GenerationOrchestrator::new(self.clone())
  }

  pub fn query_handler(&self) -> QueryHandler<B> { QueryHandler::new(self.clone()) }

  pub fn family_admin(&self) -> FamilyAdmin<B::Store> {
    FamilyAdmin::new(self.store.clone())
  }
}
