//! Handlers for family administration.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/families` | `platform_admin` only; creates the subscription too |
//! | `GET`    | `/families/{id}/subscription` | Family scope |
//! | `GET`    | `/families/{id}/members` | Family scope |
//! | `POST`   | `/families/{id}/members` | `family_admin`; path wins over body `family_id` |
//! | `DELETE` | `/families/{id}/members/{member_id}` | `family_admin`; cascades documents |
//! | `GET`    | `/members/{id}/documents` | Scope of the member's family |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use famdocs_core::{
  document::Document,
  family::{Family, FamilyId, FamilyMember, MemberId, NewFamily, NewMember},
  subscription::Subscription,
};
use famdocs_workflow::Backend;
use serde::Serialize;

use crate::{AppState, auth::Caller, error::ApiError};

#[derive(Debug, Serialize)]
pub struct CreatedFamily {
  pub family:       Family,
  pub subscription: Subscription,
}

/// `POST /families`
pub async fn create<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Json(body): Json<NewFamily>,
) -> Result<impl IntoResponse, ApiError> {
  let (family, subscription) = state
    .services
    .family_admin()
    .create_family(&claims, body)
    .await?;
  Ok((StatusCode::CREATED, Json(CreatedFamily { family, subscription })))
}

/// `GET /families/{id}/subscription`
pub async fn subscription<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Path(family_id): Path<FamilyId>,
) -> Result<Json<Subscription>, ApiError> {
  let sub = state
    .services
    .family_admin()
    .subscription(&claims, family_id)
    .await?;
  Ok(Json(sub))
}

/// `GET /families/{id}/members`
pub async fn list_members<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Path(family_id): Path<FamilyId>,
) -> Result<Json<Vec<FamilyMember>>, ApiError> {
  let members = state
    .services
    .family_admin()
    .list_members(&claims, family_id)
    .await?;
  Ok(Json(members))
}

/// `POST /families/{id}/members`
pub async fn add_member<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Path(family_id): Path<FamilyId>,
  Json(body): Json<NewMember>,
) -> Result<impl IntoResponse, ApiError> {
  let member = state
    .services
    .family_admin()
    .add_member(&claims, family_id, body)
    .await?;
  Ok((StatusCode::CREATED, Json(member)))
}

/// `DELETE /families/{id}/members/{member_id}`
pub async fn remove_member<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Path((family_id, member_id)): Path<(FamilyId, MemberId)>,
) -> Result<StatusCode, ApiError> {
  state
    .services
    .family_admin()
    .remove_member(&claims, family_id, member_id)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /members/{id}/documents`
pub async fn member_documents<B: Backend>(
  State(state): State<AppState<B>>,
  Caller(claims): Caller,
  Path(member_id): Path<MemberId>,
) -> Result<Json<Vec<Document>>, ApiError> {
  let documents = state
    .services
    .family_admin()
    .member_documents(&claims, member_id)
    .await?;
  Ok(Json(documents))
}
