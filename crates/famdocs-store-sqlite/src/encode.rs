//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are fixed-width RFC 3339 UTC strings (microseconds, `Z`) so they
//! order correctly as text. Dates are `YYYY-MM-DD`. Closed enumerations are
//! stored as their snake_case tags. Tags are a compact JSON array.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use famdocs_core::{
  document::{ArchiveRef, Document},
  family::{Family, FamilyMember, PostalAddress},
  subscription::{
    QuotaKind, QuotaLimits, QuotaReservation, QuotaUsage, ReservationToken,
    Subscription,
  },
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_token(token: ReservationToken) -> String {
  token.0.hyphenated().to_string()
}

pub fn decode_token(s: &str) -> Result<ReservationToken> {
  Ok(ReservationToken(Uuid::parse_str(s)?))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

/// Parse a stored enumeration tag.
pub fn decode_tag<T: FromStr>(what: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

/// Column pair `(usage, ceiling)` holding the counter for `kind`.
pub fn counter_columns(kind: QuotaKind) -> (&'static str, &'static str) {
  match kind {
    QuotaKind::AiRequest => {
      ("current_ai_requests_this_month", "max_ai_requests_per_month")
    }
    QuotaKind::Document => ("current_documents", "max_documents"),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const FAMILY_COLUMNS: &str =
  "family_id, name, description, is_active, created_at";

/// Raw values read directly from a `families` row.
pub struct RawFamily {
  pub family_id:   i64,
  pub name:        String,
  pub description: Option<String>,
  pub is_active:   bool,
  pub created_at:  String,
}

impl RawFamily {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      family_id:   row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      is_active:   row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_family(self) -> Result<Family> {
    Ok(Family {
      family_id:   self.family_id,
      name:        self.name,
      description: self.description,
      is_active:   self.is_active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const SUBSCRIPTION_COLUMNS: &str = "subscription_id, family_id, plan, status,
   max_members, max_documents, max_ai_requests_per_month, max_storage_mb,
   current_members, current_documents, current_ai_requests_this_month,
   current_storage_mb, billing_cycle_start, created_at";

/// Raw values read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub subscription_id:     i64,
  pub family_id:           i64,
  pub plan:                String,
  pub status:              String,
  pub limits:              QuotaLimits,
  pub usage:               QuotaUsage,
  pub billing_cycle_start: String,
  pub created_at:          String,
}

impl RawSubscription {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id:     row.get(0)?,
      family_id:           row.get(1)?,
      plan:                row.get(2)?,
      status:              row.get(3)?,
      limits:              QuotaLimits {
        max_members:               row.get(4)?,
        max_documents:             row.get(5)?,
        max_ai_requests_per_month: row.get(6)?,
        max_storage_mb:            row.get(7)?,
      },
      usage:               QuotaUsage {
        current_members:                row.get(8)?,
        current_documents:              row.get(9)?,
        current_ai_requests_this_month: row.get(10)?,
        current_storage_mb:             row.get(11)?,
      },
      billing_cycle_start: row.get(12)?,
      created_at:          row.get(13)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id:     self.subscription_id,
      family_id:           self.family_id,
      plan:                decode_tag("plan", &self.plan)?,
      status:              decode_tag("subscription status", &self.status)?,
      limits:              self.limits,
      usage:               self.usage,
      billing_cycle_start: decode_dt(&self.billing_cycle_start)?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

pub const MEMBER_COLUMNS: &str = "member_id, family_id, identity_id, full_name,
   birth_date, gender, nationality, email, address_street, address_number,
   address_complement, address_neighborhood, address_city, address_state,
   address_country, address_zipcode, role, created_at";

/// Raw values read directly from a `family_members` row.
pub struct RawMember {
  pub member_id:   i64,
  pub family_id:   i64,
  pub identity_id: Option<String>,
  pub full_name:   String,
  pub birth_date:  String,
  pub gender:      String,
  pub nationality: String,
  pub email:       String,
  pub address:     PostalAddress,
  pub role:        String,
  pub created_at:  String,
}

impl RawMember {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:   row.get(0)?,
      family_id:   row.get(1)?,
      identity_id: row.get(2)?,
      full_name:   row.get(3)?,
      birth_date:  row.get(4)?,
      gender:      row.get(5)?,
      nationality: row.get(6)?,
      email:       row.get(7)?,
      address:     PostalAddress {
        street:       row.get(8)?,
        number:       row.get(9)?,
        complement:   row.get(10)?,
        neighborhood: row.get(11)?,
        city:         row.get(12)?,
        state:        row.get(13)?,
        country:      row.get(14)?,
        zipcode:      row.get(15)?,
      },
      role:        row.get(16)?,
      created_at:  row.get(17)?,
    })
  }

  pub fn into_member(self) -> Result<FamilyMember> {
    Ok(FamilyMember {
      member_id:   self.member_id,
      family_id:   self.family_id,
      identity_id: self.identity_id,
      full_name:   self.full_name,
      birth_date:  decode_date(&self.birth_date)?,
      gender:      decode_tag("gender", &self.gender)?,
      nationality: self.nationality,
      email:       self.email,
      address:     self.address,
      role:        decode_tag("member role", &self.role)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const DOCUMENT_COLUMNS: &str = "document_id, family_id, member_id,
   document_type, document_number, issuing_country, issuing_authority,
   issue_date, expiration_date, archive_id, archive_url, title, description,
   tags, created_at";

/// Raw values read directly from a `documents` row.
pub struct RawDocument {
  pub document_id:       i64,
  pub family_id:         i64,
  pub member_id:         i64,
  pub document_type:     String,
  pub document_number:   String,
  pub issuing_country:   String,
  pub issuing_authority: Option<String>,
  pub issue_date:        Option<String>,
  pub expiration_date:   Option<String>,
  pub archive_id:        Option<i64>,
  pub archive_url:       Option<String>,
  pub title:             String,
  pub description:       Option<String>,
  pub tags:              String,
  pub created_at:        String,
}

impl RawDocument {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:       row.get(0)?,
      family_id:         row.get(1)?,
      member_id:         row.get(2)?,
      document_type:     row.get(3)?,
      document_number:   row.get(4)?,
      issuing_country:   row.get(5)?,
      issuing_authority: row.get(6)?,
      issue_date:        row.get(7)?,
      expiration_date:   row.get(8)?,
      archive_id:        row.get(9)?,
      archive_url:       row.get(10)?,
      title:             row.get(11)?,
      description:       row.get(12)?,
      tags:              row.get(13)?,
      created_at:        row.get(14)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    let archive = match (self.archive_id, self.archive_url) {
      (Some(id), Some(url)) => Some(ArchiveRef { id, url }),
      _ => None,
    };

    Ok(Document {
      document_id: self.document_id,
      family_id: self.family_id,
      member_id: self.member_id,
      document_type: decode_tag("document type", &self.document_type)?,
      document_number: self.document_number,
      issuing_country: self.issuing_country,
      issuing_authority: self.issuing_authority,
      issue_date: self.issue_date.as_deref().map(decode_date).transpose()?,
      expiration_date: self
        .expiration_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      archive,
      title: self.title,
      description: self.description,
      tags: decode_tags(&self.tags)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const RESERVATION_COLUMNS: &str = "token, family_id, kind, state, created_at";

/// Raw values read directly from a `quota_reservations` row.
pub struct RawReservation {
  pub token:      String,
  pub family_id:  i64,
  pub kind:       String,
  pub state:      String,
  pub created_at: String,
}

impl RawReservation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      token:      row.get(0)?,
      family_id:  row.get(1)?,
      kind:       row.get(2)?,
      state:      row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_reservation(self) -> Result<QuotaReservation> {
    Ok(QuotaReservation {
      token:      decode_token(&self.token)?,
      family_id:  self.family_id,
      kind:       decode_tag("quota kind", &self.kind)?,
      state:      decode_tag("reservation state", &self.state)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
