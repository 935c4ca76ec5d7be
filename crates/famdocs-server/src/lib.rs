//! JSON HTTP API for famdocs.
//!
//! Exposes an axum [`Router`] over any [`Backend`]. Every route under
//! `/api/v1` except login resolves the caller from a bearer token through the
//! [`auth::Caller`] extractor.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use error::ApiError;

use std::path::PathBuf;

use axum::{
  Router,
  routing::{delete, get, post},
};
use famdocs_remote::{KeycloakConfig, OllamaConfig, PaperlessConfig};
use famdocs_workflow::{Backend, Services, TokenBudget};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{chat, families, health};

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "0.0.0.0".to_owned() }
fn default_port() -> u16 { 8000 }

/// Runtime server configuration, deserialised from `config.toml` and the
/// `FAMDOCS__*` environment.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:         String,
  #[serde(default = "default_port")]
  pub port:         u16,
  pub store_path:   PathBuf,
  pub keycloak:     KeycloakConfig,
  pub paperless:    PaperlessConfig,
  pub ollama:       OllamaConfig,
  #[serde(default)]
  pub generation:   GenerationConfig,
  #[serde(default)]
  pub reservations: ReservationConfig,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct GenerationConfig {
  pub document_max_tokens: u32,
  pub query_max_tokens:    u32,
}

impl Default for GenerationConfig {
  fn default() -> Self {
    let budget = TokenBudget::default();
    Self {
      document_max_tokens: budget.document,
      query_max_tokens:    budget.query,
    }
  }
}

impl From<GenerationConfig> for TokenBudget {
  fn from(cfg: GenerationConfig) -> Self {
    Self {
      document: cfg.document_max_tokens,
      query:    cfg.query_max_tokens,
    }
  }
}

/// How often abandoned reservations are swept, and how old a pending
/// reservation must be before it counts as abandoned.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ReservationConfig {
  pub sweep_interval_secs: u64,
  pub stale_after_secs:    u64,
  /// How long settled reservations are kept before the sweeper deletes them.
  pub retain_settled_secs: u64,
}

impl Default for ReservationConfig {
  fn default() -> Self {
    Self {
      sweep_interval_secs: 60,
      stale_after_secs:    600,
      retain_settled_secs: 7 * 24 * 60 * 60,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<B: Backend> {
  pub services: Services<B>,
}

impl<B: Backend> AppState<B> {
  pub fn new(services: Services<B>) -> Self { Self { services } }
}

impl<B: Backend> Clone for AppState<B> {
  fn clone(&self) -> Self {
    Self {
      services: self.services.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: `/`, `/health` and the `/api/v1` API.
pub fn router<B: Backend>(state: AppState<B>) -> Router {
  let api = Router::new()
    // Auth
    .route("/auth/login", post(handlers::auth::login::<B>))
    .route("/auth/me", get(handlers::auth::me))
    .route("/auth/logout", post(handlers::auth::logout))
    // Chat
    .route("/chat/generate-document", post(chat::generate_document::<B>))
    .route("/chat/query", post(chat::query::<B>))
    .route("/chat/models", get(chat::models::<B>))
    // Families
    .route("/families", post(families::create::<B>))
    .route("/families/{id}/subscription", get(families::subscription::<B>))
    .route(
      "/families/{id}/members",
      get(families::list_members::<B>).post(families::add_member::<B>),
    )
    .route(
      "/families/{id}/members/{member_id}",
      delete(families::remove_member::<B>),
    )
    .route("/members/{id}/documents", get(families::member_documents::<B>));

  Router::new()
    .route("/", get(health::root))
    .route("/health", get(health::health))
    .nest("/api/v1", api)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
