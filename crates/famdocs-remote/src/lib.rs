//! HTTP clients for the remote collaborators.
//!
//! - [`KeycloakIdentity`]: password login and token introspection.
//! - [`OllamaGenerator`]: non-streaming text generation.
//! - [`PaperlessArchive`]: document upload with tag resolution.
//!
//! Every client is cheap to clone; the inner [`reqwest::Client`] is
//! reference-counted.

mod error;
mod keycloak;
mod ollama;
mod paperless;

pub use self::{
  error::{RemoteError, Result},
  keycloak::{KeycloakConfig, KeycloakIdentity},
  ollama::{OllamaConfig, OllamaGenerator},
  paperless::{PaperlessArchive, PaperlessConfig},
};


/// Join a base URL and an absolute path without doubling the slash.
fn join(base: &str, path: &str) -> String {
  format!("{}{}", base.trim_end_matches('/'), path)
}
