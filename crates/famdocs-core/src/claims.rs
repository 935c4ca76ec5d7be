//! Roles, claim sets and credentials.
//!
//! A [`ClaimSet`] is rebuilt on every request from a verified bearer token plus
//! a member lookup keyed by the identity id. It is never persisted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::family::FamilyId;

// ─── Roles ───────────────────────────────────────────────────────────────────

/// The closed set of application roles.
///
/// Identity backends hand out arbitrary role strings; anything that does not
/// parse into one of these variants is dropped rather than carried along.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
  PlatformAdmin,
  FamilyAdmin,
  FamilyMember,
}

impl Role {
  /// Keep only the role strings that name an application role.
  pub fn from_identity_roles<I, T>(raw: I) -> BTreeSet<Role>
  where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
  {
    raw
      .into_iter()
      .filter_map(|r| r.as_ref().parse().ok())
      .collect()
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// What the identity backend vouches for once a token verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
  pub identity_id:  String,
  pub username:     String,
  pub display_name: String,
  pub email:        Option<String>,
  pub roles:        BTreeSet<Role>,
}

/// Tokens issued by the identity backend on a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
  pub access_token:  String,
  pub token_type:    String,
  pub refresh_token: Option<String>,
  pub expires_in:    Option<u64>,
}

impl Credential {
  pub fn bearer(access_token: impl Into<String>) -> Self {
    Self {
      access_token:  access_token.into(),
      token_type:    "bearer".to_owned(),
      refresh_token: None,
      expires_in:    None,
    }
  }
}

// ─── Claim set ───────────────────────────────────────────────────────────────

/// The verified identity, roles and family scope of a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSet {
  pub identity_id:  String,
  pub username:     String,
  pub display_name: String,
  pub email:        Option<String>,
  pub roles:        BTreeSet<Role>,
  /// Absent until the identity is linked to a family member record.
  pub family_id:    Option<FamilyId>,
}

impl ClaimSet {
  pub fn from_identity(identity: VerifiedIdentity, family_id: Option<FamilyId>) -> Self {
    Self {
      identity_id: identity.identity_id,
      username: identity.username,
      display_name: identity.display_name,
      email: identity.email,
      roles: identity.roles,
      family_id,
    }
  }

  pub fn is_platform_admin(&self) -> bool { self.roles.contains(&Role::PlatformAdmin) }

  pub fn has_any_role(&self, roles: &[Role]) -> bool {
    roles.iter().any(|r| self.roles.contains(r))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_identity_roles_are_dropped() {
    let roles = Role::from_identity_roles([
      "offline_access",
      "family_admin",
      "uma_authorization",
      "FAMILY_MEMBER",
    ]);
    assert_eq!(roles.into_iter().collect::<Vec<_>>(), vec![Role::FamilyAdmin]);
  }

  #[test]
  fn role_round_trips_through_its_tag() {
    for role in [Role::PlatformAdmin, Role::FamilyAdmin, Role::FamilyMember] {
      let tag: &'static str = role.into();
      assert_eq!(tag.parse::<Role>().unwrap(), role);
    }
  }
}
