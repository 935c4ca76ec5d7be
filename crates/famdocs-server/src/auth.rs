//! Bearer-token extractor.

use axum::{
  extract::FromRequestParts,
  http::{header, request::Parts},
};
use famdocs_core::claims::ClaimSet;
use famdocs_workflow::Backend;

use crate::{AppState, error::ApiError};

/// The authenticated caller. Present in a handler means the bearer token
/// verified and the claim set was built.
pub struct Caller(pub ClaimSet);

impl<B: Backend> FromRequestParts<AppState<B>> for Caller {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<B>,
  ) -> Result<Self, Self::Rejection> {
    let header = parts
      .headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok());
    let claims = state.services.guard().resolve(header).await?;
    Ok(Caller(claims))
  }
}
