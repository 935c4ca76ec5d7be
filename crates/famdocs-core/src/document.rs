//! Document records and generation requests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  error::require,
  family::{FamilyId, MemberId},
};

pub type DocumentId = i64;

/// `document_number` carried by every AI-generated document.
pub const GENERATED_DOCUMENT_NUMBER: &str = "GENERATED";

/// Tag marking a document as produced by the text generator.
pub const GENERATED_TAG: &str = "generated_by_ai";

// ─── Stored documents ────────────────────────────────────────────────────────

/// Category of an identity or administrative document.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentType {
  Passport,
  IdCard,
  DriverLicense,
  BirthCertificate,
  MarriageCertificate,
  Diploma,
  Visa,
  WorkPermit,
  ResidencePermit,
  TaxDocument,
  BankStatement,
  Insurance,
  MedicalRecord,
  Other,
}

/// Where a document lives in the external archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRef {
  pub id:  i64,
  pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id:       DocumentId,
  pub family_id:         FamilyId,
  pub member_id:         MemberId,
  pub document_type:     DocumentType,
  pub document_number:   String,
  pub issuing_country:   String,
  pub issuing_authority: Option<String>,
  pub issue_date:        Option<NaiveDate>,
  pub expiration_date:   Option<NaiveDate>,
  pub archive:           Option<ArchiveRef>,
  pub title:             String,
  pub description:       Option<String>,
  pub tags:              Vec<String>,
  pub created_at:        DateTime<Utc>,
}

impl Document {
  pub fn is_generated(&self) -> bool {
    self.document_number == GENERATED_DOCUMENT_NUMBER
      && self.tags.iter().any(|t| t == GENERATED_TAG)
  }
}

/// Input to the document-creating store operations.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
  pub family_id:         FamilyId,
  pub member_id:         MemberId,
  pub document_type:     DocumentType,
  pub document_number:   String,
  pub issuing_country:   String,
  pub issuing_authority: Option<String>,
  pub issue_date:        Option<NaiveDate>,
  pub expiration_date:   Option<NaiveDate>,
  pub archive:           Option<ArchiveRef>,
  pub title:             String,
  pub description:       Option<String>,
  #[serde(default)]
  pub tags:              Vec<String>,
}

// ─── Generation requests ─────────────────────────────────────────────────────

/// Template family used to generate a document.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentKind {
  Authorization,
  Declaration,
  Certificate,
}

impl DocumentKind {
  /// Map a requested kind onto a template. Unrecognised kinds use the
  /// declaration template and never error.
  pub fn resolve(requested: &str) -> Self {
    requested
      .trim()
      .parse()
      .unwrap_or(Self::Declaration)
  }
}

/// A caller's request for an AI-generated document. Not persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
  #[serde(alias = "member_id")]
  pub member_id:       MemberId,
  #[serde(alias = "document_type", alias = "document_kind")]
  pub document_kind:   String,
  #[serde(default, alias = "additional_info")]
  pub additional_info: String,
  pub title:           String,
}

impl DocumentRequest {
  pub fn validate(&self) -> Result<()> {
    require("title", &self.title)?;
    require("document_kind", &self.document_kind)
  }

  pub fn kind(&self) -> DocumentKind { DocumentKind::resolve(&self.document_kind) }
}
