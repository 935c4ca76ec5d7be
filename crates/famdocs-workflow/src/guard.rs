//! Authorization Guard: credential resolution and role/family checks.

use std::sync::Arc;

use famdocs_core::{
  claims::{ClaimSet, Credential, Role},
  family::FamilyId,
  services::IdentityProvider,
  store::FamilyStore,
};
use tracing::{debug, warn};

use crate::{Result, WorkflowError};

/// Extract the token from an `Authorization` header value.
///
/// Only the `Bearer` scheme is accepted; the scheme name is matched
/// case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
  let (scheme, token) = header.trim().split_once(' ')?;
  if !scheme.eq_ignore_ascii_case("bearer") {
    return None;
  }
  let token = token.trim();
  (!token.is_empty()).then_some(token)
}

/// Succeeds for platform admins, otherwise iff the caller holds at least one
/// of `required`.
pub fn authorize(claims: &ClaimSet, required: &[Role]) -> Result<()> {
  if claims.is_platform_admin() || claims.has_any_role(required) {
    return Ok(());
  }
  debug!(identity = %claims.identity_id, ?required, "role check failed");
  Err(WorkflowError::Forbidden("insufficient role"))
}

/// Succeeds for platform admins, otherwise iff the caller belongs to
/// `family_id`.
pub fn authorize_family_scope(claims: &ClaimSet, family_id: FamilyId) -> Result<()> {
  if claims.is_platform_admin() || claims.family_id == Some(family_id) {
    return Ok(());
  }
  debug!(identity = %claims.identity_id, family_id, "family scope check failed");
  Err(WorkflowError::Forbidden("family scope mismatch"))
}

pub struct AuthorizationGuard<I, S> {
  identity: Arc<I>,
  store:    Arc<S>,
}

impl<I, S> AuthorizationGuard<I, S>
where
  I: IdentityProvider,
  S: FamilyStore,
{
  pub fn new(identity: Arc<I>, store: Arc<S>) -> Self { Self { identity, store } }

  /// Exchange a username and password for tokens at the identity backend.
  pub async fn authenticate(&self, username: &str, password: &str) -> Result<Credential> {
    if username.trim().is_empty() || password.is_empty() {
      return Err(WorkflowError::Unauthorized);
    }
    match self.identity.authenticate(username, password).await {
      Ok(Some(credential)) => Ok(credential),
      Ok(None) => {
        debug!(username, "login rejected");
        Err(WorkflowError::Unauthorized)
      }
      Err(e) => {
        warn!(error = %e, "identity backend failed during login");
        Err(WorkflowError::internal(e))
      }
    }
  }

  /// Build the caller's claim set from a raw `Authorization` header value.
  pub async fn resolve(&self, header: Option<&str>) -> Result<ClaimSet> {
    let token = header
      .and_then(bearer_token)
      .ok_or(WorkflowError::Unauthorized)?;

    let identity = match self.identity.verify_token(token).await {
      Ok(Some(identity)) => identity,
      Ok(None) => return Err(WorkflowError::Unauthorized),
      Err(e) => {
        warn!(error = %e, "identity backend failed during verification");
        return Err(WorkflowError::internal(e));
      }
    };

    let family_id = self
      .store
      .member_by_identity(&identity.identity_id)
      .await
      .map_err(WorkflowError::from_store)?
      .map(|m| m.family_id);

    Ok(ClaimSet::from_identity(identity, family_id))
  }
}
