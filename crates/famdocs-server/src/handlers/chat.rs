//! Handlers for `/chat` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/chat/generate-document` | Body: `{"memberId":1,"documentKind":"declaration","additionalInfo":"…","title":"…"}` |
//! | `POST` | `/chat/query` | Body: `{"message":"…","contextMemberId":1}`; member optional |
//! | `GET`  | `/chat/models` | Configured model and its availability |

use axum::{Json, extract::State};
use famdocs_core::{document::DocumentRequest, services::ModelStatus};
use famdocs_workflow::{Backend, ChatAnswer, ChatQuery};
use serde::Serialize;

use crate::{AppState, auth::Caller, error::ApiError};

// ─── Generate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
  pub success:     bool,
  pub message:     String,
  pub archive_url: Option<String>,
  pub document_id: Option<i64>,
}

/// `POST /chat/generate-document`
pub async fn generate_document<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Json(body): Json<DocumentRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
  let generated = state
    .services
    .orchestrator()
    .generate(&claims, body)
    .await?;
  Ok(Json(GenerateResponse {
    success:     true,
    message:     format!("Document '{}' generated and archived", generated.document.title),
    archive_url: Some(generated.archive.url),
    document_id: Some(generated.document.document_id),
  }))
}

// ─── Query ────────────────────────────────────────────────────────────────────

/// `POST /chat/query`
pub async fn query<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Json(body): Json<ChatQuery>,
) -> Result<Json<ChatAnswer>, ApiError> {
  let answer = state.services.query_handler().answer(&claims, body).await?;
  Ok(Json(answer))
}

// ─── Models ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModelEntry {
  pub name:      String,
  pub available: bool,
  /// `ready` once the backend has the model, `downloading` before that.
  pub status:    &'static str,
}

impl From<ModelStatus> for ModelEntry {
  fn from(m: ModelStatus) -> Self {
    Self {
      status:    if m.available { "ready" } else { "downloading" },
      name:      m.name,
      available: m.available,
    }
  }
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
  pub models: Vec<ModelEntry>,
}

/// `GET /chat/models`
pub async fn models<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
) -> Result<Json<ModelsResponse>, ApiError> {
  let status = state.services.query_handler().models(&claims).await?;
  Ok(Json(ModelsResponse {
    models: vec![status.into()],
  }))
}
