//! Handlers for `/auth` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/login` | Body: `{"username":"…","password":"…"}` |
//! | `GET`  | `/auth/me` | The caller's claim set |
//! | `POST` | `/auth/logout` | Tokens are stateless; acknowledgement only |

use axum::{Json, extract::State};
use famdocs_core::claims::{ClaimSet, Credential};
use famdocs_workflow::Backend;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::{AppState, auth::Caller, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub username: String,
  pub password: String,
}

/// `POST /auth/login`
pub async fn login<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<LoginBody>,
) -> Result<Json<Credential>, ApiError> {
  let credential = state
    .services
    .guard()
    .authenticate(&body.username, &body.password)
    .await?;
  info!(username = %body.username, "login succeeded");
  Ok(Json(credential))
}

/// `GET /auth/me`
pub async fn me(Caller(claims): Caller) -> Json<ClaimSet> { Json(claims) }

/// `POST /auth/logout`
pub async fn logout(Caller(claims): Caller) -> Json<Value> {
  info!(identity = %claims.identity_id, "logout");
  Json(json!({ "success": true, "message": "logged out" }))
}
