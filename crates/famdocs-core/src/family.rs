//! Families and their members.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  error::require,
  subscription::Plan,
};

pub type FamilyId = i64;
pub type MemberId = i64;

// ─── Family ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
  pub family_id:   FamilyId,
  pub name:        String,
  pub description: Option<String>,
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::FamilyStore::create_family`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewFamily {
  pub name:        String,
  pub description: Option<String>,
  #[serde(default)]
  pub plan:        Plan,
}

impl NewFamily {
  pub fn validate(&self) -> Result<()> { require("name", &self.name) }
}

// ─── Members ─────────────────────────────────────────────────────────────────

/// In-family privilege of a member record.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemberRole {
  Admin,
  #[default]
  Member,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Gender {
  Male,
  Female,
  Other,
}

/// Postal address of a member; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
  pub street:       Option<String>,
  pub number:       Option<String>,
  pub complement:   Option<String>,
  pub neighborhood: Option<String>,
  pub city:         Option<String>,
  pub state:        Option<String>,
  pub country:      Option<String>,
  pub zipcode:      Option<String>,
}

/// A person belonging to exactly one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
  pub member_id:   MemberId,
  pub family_id:   FamilyId,
  /// Subject id at the identity backend; `None` until the member logs in.
  pub identity_id: Option<String>,
  pub full_name:   String,
  pub birth_date:  NaiveDate,
  pub gender:      Gender,
  pub nationality: String,
  /// Globally unique.
  pub email:       String,
  #[serde(default)]
  pub address:     PostalAddress,
  pub role:        MemberRole,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::FamilyStore::add_member`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewMember {
  /// Filled from the request path when the member is added over HTTP.
  #[serde(default)]
  pub family_id:   FamilyId,
  pub identity_id: Option<String>,
  pub full_name:   String,
  pub birth_date:  NaiveDate,
  pub gender:      Gender,
  pub nationality: String,
  pub email:       String,
  #[serde(default)]
  pub address:     PostalAddress,
  #[serde(default)]
  pub role:        MemberRole,
}

impl NewMember {
  pub fn validate(&self) -> Result<()> {
    require("full_name", &self.full_name)?;
    require("nationality", &self.nationality)?;
    require("email", &self.email)
  }
}
