//! [`SqliteStore`]: the SQLite implementation of [`FamilyStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use famdocs_core::{
  document::{Document, DocumentId, NewDocument},
  family::{Family, FamilyId, FamilyMember, MemberId, NewFamily, NewMember},
  store::FamilyStore,
  subscription::{
    QuotaKind, QuotaReservation, ReservationToken,
    ReserveOutcome, Subscription, SubscriptionStatus,
  },
};
use rusqlite::{OptionalExtension as _, Transaction, TransactionBehavior, params};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{
    DOCUMENT_COLUMNS, FAMILY_COLUMNS, MEMBER_COLUMNS, RESERVATION_COLUMNS,
    RawDocument, RawFamily, RawMember, RawReservation, RawSubscription,
    SUBSCRIPTION_COLUMNS, counter_columns, decode_tag, encode_date, encode_dt,
    encode_tags, encode_token,
  },
  schema::SCHEMA,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

/// Bump the usage counter for `kind` unless it already sits at its ceiling.
/// Returns `false` when the guard held the row back.
fn increment_counter(
  tx: &Transaction<'_>,
  family_id: FamilyId,
  usage: &str,
  ceiling: &str,
) -> rusqlite::Result<bool> {
  let changed = tx.execute(
    &format!(
      "UPDATE subscriptions SET {usage} = {usage} + 1
       WHERE family_id = ?1 AND {usage} < {ceiling}"
    ),
    params![family_id],
  )?;
  Ok(changed == 1)
}

fn read_ceiling(
  tx: &Transaction<'_>,
  family_id: FamilyId,
  ceiling: &str,
) -> rusqlite::Result<Option<i64>> {
  tx.query_row(
    &format!("SELECT {ceiling} FROM subscriptions WHERE family_id = ?1"),
    params![family_id],
    |r| r.get(0),
  )
  .optional()
}

/// Release one pending reservation inside an open transaction, undoing its
/// increment. Settled reservations are left alone.
fn release_pending(
  tx: &Transaction<'_>,
  token: &str,
  settled_at: &str,
) -> rusqlite::Result<bool> {
  let row: Option<(FamilyId, String)> = tx
    .query_row(
      "SELECT family_id, kind FROM quota_reservations
       WHERE token = ?1 AND state = 'pending'",
      params![token],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  let Some((family_id, kind)) = row else {
    return Ok(false);
  };
  let kind: QuotaKind = kind.parse().map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(
      2,
      rusqlite::types::Type::Text,
      Box::new(e),
    )
  })?;

  tx.execute(
    "UPDATE quota_reservations SET state = 'released', settled_at = ?2
     WHERE token = ?1",
    params![token, settled_at],
  )?;

  let (usage, _) = counter_columns(kind);
  tx.execute(
    &format!(
      "UPDATE subscriptions SET {usage} = {usage} - 1
       WHERE family_id = ?1 AND {usage} > 0"
    ),
    params![family_id],
  )?;
  Ok(true)
}

fn insert_document(
  tx: &Transaction<'_>,
  input: &NewDocument,
  tags: &str,
  created_at: &str,
) -> rusqlite::Result<DocumentId> {
  let document_type: &'static str = input.document_type.into();
  tx.execute(
    "INSERT INTO documents (
       family_id, member_id, document_type, document_number, issuing_country,
       issuing_authority, issue_date, expiration_date, archive_id, archive_url,
       title, description, tags, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    params![
      input.family_id,
      input.member_id,
      document_type,
      input.document_number,
      input.issuing_country,
      input.issuing_authority,
      input.issue_date.map(encode_date),
      input.expiration_date.map(encode_date),
      input.archive.as_ref().map(|a| a.id),
      input.archive.as_ref().map(|a| a.url.clone()),
      input.title,
      input.description,
      tags,
      created_at,
    ],
  )?;
  Ok(tx.last_insert_rowid())
}

fn build_document(
  id: DocumentId,
  input: NewDocument,
  created_at: DateTime<Utc>,
) -> Document {
  Document {
    document_id:       id,
    family_id:         input.family_id,
    member_id:         input.member_id,
    document_type:     input.document_type,
    document_number:   input.document_number,
    issuing_country:   input.issuing_country,
    issuing_authority: input.issuing_authority,
    issue_date:        input.issue_date,
    expiration_date:   input.expiration_date,
    archive:           input.archive,
    title:             input.title,
    description:       input.description,
    tags:              input.tags,
    created_at,
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A famdocs datastore backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── FamilyStore impl ────────────────────────────────────────────────────────

impl FamilyStore for SqliteStore {
  type Error = Error;

  // ── Families ──────────────────────────────────────────────────────────────

  async fn create_family(&self, input: NewFamily) -> Result<(Family, Subscription)> {
    input.validate()?;

    let now    = Utc::now();
    let now_s  = encode_dt(now);
    let limits = input.plan.limits();
    let plan: &'static str = input.plan.into();
    let status: &'static str = SubscriptionStatus::Active.into();
    let name        = input.name.clone();
    let description = input.description.clone();

    let (family_id, subscription_id) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO families (name, description, is_active, created_at)
           VALUES (?1, ?2, 1, ?3)",
          params![name, description, now_s],
        )?;
        let family_id = tx.last_insert_rowid();

        tx.execute(
          "INSERT INTO subscriptions (
             family_id, plan, status, max_members, max_documents,
             max_ai_requests_per_month, max_storage_mb,
             billing_cycle_start, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          params![
            family_id,
            plan,
            status,
            limits.max_members,
            limits.max_documents,
            limits.max_ai_requests_per_month,
            limits.max_storage_mb,
            now_s,
          ],
        )?;
        let subscription_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok((family_id, subscription_id))
      })
      .await?;

    debug!(family_id, plan, "created family");

    let family = Family {
      family_id,
      name: input.name,
      description: input.description,
      is_active: true,
      created_at: now,
    };
    let subscription = Subscription {
      subscription_id,
      family_id,
      plan: input.plan,
      status: SubscriptionStatus::Active,
      limits,
      usage: Default::default(),
      billing_cycle_start: now,
      created_at: now,
    };
    Ok((family, subscription))
  }

  async fn get_family(&self, id: FamilyId) -> Result<Option<Family>> {
    let raw: Option<RawFamily> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {FAMILY_COLUMNS} FROM families WHERE family_id = ?1"),
            params![id],
            RawFamily::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawFamily::into_family).transpose()
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn get_subscription(&self, family_id: FamilyId) -> Result<Option<Subscription>> {
    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE family_id = ?1"
            ),
            params![family_id],
            RawSubscription::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn set_subscription_status(
    &self,
    family_id: FamilyId,
    status:    SubscriptionStatus,
  ) -> Result<Option<Subscription>> {
    let status_str: &'static str = status.into();

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE subscriptions SET status = ?2 WHERE family_id = ?1",
          params![family_id, status_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let raw = tx.query_row(
          &format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE family_id = ?1"
          ),
          params![family_id],
          RawSubscription::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn reset_monthly_ai_requests(&self, family_id: FamilyId) -> Result<bool> {
    let now_s = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Requests admitted before the rollover keep their pending unit, so
        // the new cycle starts at the number still in flight.
        let changed = tx.execute(
          "UPDATE subscriptions
           SET current_ai_requests_this_month = (
                 SELECT COUNT(*) FROM quota_reservations
                 WHERE family_id = ?1 AND kind = 'ai_request' AND state = 'pending'
               ),
               billing_cycle_start = ?2
           WHERE family_id = ?1",
          params![family_id, now_s],
        )?;
        tx.commit()?;
        Ok(changed == 1)
      })
      .await?;

    Ok(changed)
  }

  // ── Members ───────────────────────────────────────────────────────────────

  async fn add_member(&self, input: NewMember) -> Result<FamilyMember> {
    input.validate()?;

    let now    = Utc::now();
    let now_s  = encode_dt(now);
    let family_id = input.family_id;
    let row    = input.clone();

    // Domain failures come back as the inner `Err`; database failures as the
    // outer one.
    let member_id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let family_exists = tx
          .query_row(
            "SELECT 1 FROM families WHERE family_id = ?1",
            params![family_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !family_exists {
          return Ok(Err(Error::FamilyNotFound(family_id)));
        }

        if !increment_counter(&tx, family_id, "current_members", "max_members")? {
          return Ok(Err(match read_ceiling(&tx, family_id, "max_members")? {
            Some(ceiling) => Error::LimitReached { family_id, what: "member", ceiling },
            None => Error::NoSubscription(family_id),
          }));
        }

        let gender: &'static str = row.gender.into();
        let role: &'static str = row.role.into();
        let inserted = tx.execute(
          "INSERT INTO family_members (
             family_id, identity_id, full_name, birth_date, gender, nationality,
             email, address_street, address_number, address_complement,
             address_neighborhood, address_city, address_state, address_country,
             address_zipcode, role, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17)",
          params![
            family_id,
            row.identity_id,
            row.full_name,
            encode_date(row.birth_date),
            gender,
            row.nationality,
            row.email,
            row.address.street,
            row.address.number,
            row.address.complement,
            row.address.neighborhood,
            row.address.city,
            row.address.state,
            row.address.country,
            row.address.zipcode,
            role,
            now_s,
          ],
        );
        match inserted {
          Ok(_) => {}
          Err(e) if is_constraint_violation(&e) => {
            return Ok(Err(Error::DuplicateMember(row.email)));
          }
          Err(e) => return Err(e.into()),
        }
        let member_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Ok(member_id))
      })
      .await??;

    debug!(family_id, member_id, "added member");

    Ok(FamilyMember {
      member_id,
      family_id,
      identity_id: input.identity_id,
      full_name: input.full_name,
      birth_date: input.birth_date,
      gender: input.gender,
      nationality: input.nationality,
      email: input.email,
      address: input.address,
      role: input.role,
      created_at: now,
    })
  }

  async fn get_member(&self, id: MemberId) -> Result<Option<FamilyMember>> {
    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM family_members WHERE member_id = ?1"),
            params![id],
            RawMember::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMember::into_member).transpose()
  }

  async fn member_by_identity(&self, identity_id: &str) -> Result<Option<FamilyMember>> {
    let identity_id = identity_id.to_owned();

    let raw: Option<RawMember> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {MEMBER_COLUMNS} FROM family_members WHERE identity_id = ?1"
            ),
            params![identity_id],
            RawMember::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMember::into_member).transpose()
  }

  async fn list_members(&self, family_id: FamilyId) -> Result<Vec<FamilyMember>> {
    let raws: Vec<RawMember> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MEMBER_COLUMNS} FROM family_members
           WHERE family_id = ?1 ORDER BY member_id"
        ))?;
        let rows = stmt
          .query_map(params![family_id], RawMember::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMember::into_member).collect()
  }

  async fn delete_member(&self, id: MemberId) -> Result<bool> {
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let family_id: Option<FamilyId> = tx
          .query_row(
            "SELECT family_id FROM family_members WHERE member_id = ?1",
            params![id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(family_id) = family_id else {
          return Ok(false);
        };

        let documents: i64 = tx.query_row(
          "SELECT COUNT(*) FROM documents WHERE member_id = ?1",
          params![id],
          |r| r.get(0),
        )?;

        // Documents go with the member through ON DELETE CASCADE.
        tx.execute("DELETE FROM family_members WHERE member_id = ?1", params![id])?;
        tx.execute(
          "UPDATE subscriptions SET
             current_members   = MAX(current_members - 1, 0),
             current_documents = MAX(current_documents - ?2, 0)
           WHERE family_id = ?1",
          params![family_id, documents],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(deleted)
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn add_document(&self, input: NewDocument) -> Result<Document> {
    let now   = Utc::now();
    let now_s = encode_dt(now);
    let tags  = encode_tags(&input.tags)?;
    let family_id = input.family_id;
    let member_id = input.member_id;
    let row   = input.clone();

    let document_id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let member_in_family = tx
          .query_row(
            "SELECT 1 FROM family_members WHERE member_id = ?1 AND family_id = ?2",
            params![member_id, family_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !member_in_family {
          return Ok(Err(Error::MemberNotFound { family_id, member_id }));
        }

        let (usage, ceiling) = counter_columns(QuotaKind::Document);
        if !increment_counter(&tx, family_id, usage, ceiling)? {
          return Ok(Err(match read_ceiling(&tx, family_id, ceiling)? {
            Some(c) => Error::LimitReached { family_id, what: "document", ceiling: c },
            None => Error::NoSubscription(family_id),
          }));
        }

        let id = insert_document(&tx, &row, &tags, &now_s)?;
        tx.commit()?;
        Ok(Ok(id))
      })
      .await??;

    Ok(build_document(document_id, input, now))
  }

  async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = ?1"),
            params![id],
            RawDocument::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn list_member_documents(&self, member_id: MemberId) -> Result<Vec<Document>> {
    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
           WHERE member_id = ?1 ORDER BY document_id"
        ))?;
        let rows = stmt
          .query_map(params![member_id], RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn record_generated_document(
    &self,
    input:  NewDocument,
    tokens: &[ReservationToken],
  ) -> Result<Document> {
    let now    = Utc::now();
    let now_s  = encode_dt(now);
    let tags   = encode_tags(&input.tags)?;
    let tokens = tokens.to_vec();
    let row    = input.clone();

    let document_id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for token in &tokens {
          let changed = tx.execute(
            "UPDATE quota_reservations SET state = 'committed', settled_at = ?2
             WHERE token = ?1 AND state = 'pending'",
            params![encode_token(*token), now_s],
          )?;
          if changed != 1 {
            // Dropping `tx` rolls back the commits made so far.
            return Ok(Err(Error::ReservationNotPending(*token)));
          }
        }

        let id = insert_document(&tx, &row, &tags, &now_s)?;
        tx.commit()?;
        Ok(Ok(id))
      })
      .await??;

    Ok(build_document(document_id, input, now))
  }

  // ── Quota reservations ────────────────────────────────────────────────────

  async fn reserve_quota(
    &self,
    family_id: FamilyId,
    kind:      QuotaKind,
    token:     ReservationToken,
  ) -> Result<ReserveOutcome> {
    let token_s = encode_token(token);
    let kind_s: &'static str = kind.into();
    let now_s   = encode_dt(Utc::now());
    let (usage, ceiling) = counter_columns(kind);

    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status: Option<String> = tx
          .query_row(
            "SELECT status FROM subscriptions WHERE family_id = ?1",
            params![family_id],
            |r| r.get(0),
          )
          .optional()?;
        let status: SubscriptionStatus = match status {
          None => return Ok(Ok(ReserveOutcome::NoSubscription)),
          Some(s) => match decode_tag("subscription status", &s) {
            Ok(status) => status,
            Err(e) => return Ok(Err(e)),
          },
        };
        if status != SubscriptionStatus::Active {
          return Ok(Ok(ReserveOutcome::Inactive(status)));
        }

        // The ceiling check and the write are one statement against this
        // family's row.
        if !increment_counter(&tx, family_id, usage, ceiling)? {
          let ceiling = read_ceiling(&tx, family_id, ceiling)?.unwrap_or_default();
          return Ok(Ok(ReserveOutcome::Exhausted { ceiling }));
        }

        tx.execute(
          "INSERT INTO quota_reservations (token, family_id, kind, state, created_at)
           VALUES (?1, ?2, ?3, 'pending', ?4)",
          params![token_s, family_id, kind_s, now_s],
        )?;
        tx.commit()?;
        Ok(Ok(ReserveOutcome::Reserved(token)))
      })
      .await??;

    debug!(family_id, kind = kind_s, ?result, "reserve quota");
    Ok(result)
  }

  async fn commit_reservation(&self, token: ReservationToken) -> Result<bool> {
    let token_s = encode_token(token);
    let now_s   = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE quota_reservations SET state = 'committed', settled_at = ?2
           WHERE token = ?1 AND state = 'pending'",
          params![token_s, now_s],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn release_reservation(&self, token: ReservationToken) -> Result<bool> {
    let token_s = encode_token(token);
    let now_s   = encode_dt(Utc::now());

    let released = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let released = release_pending(&tx, &token_s, &now_s)?;
        tx.commit()?;
        Ok(released)
      })
      .await?;

    Ok(released)
  }

  async fn get_reservation(
    &self,
    token: ReservationToken,
  ) -> Result<Option<QuotaReservation>> {
    let token_s = encode_token(token);

    let raw: Option<RawReservation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {RESERVATION_COLUMNS} FROM quota_reservations WHERE token = ?1"
            ),
            params![token_s],
            RawReservation::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawReservation::into_reservation).transpose()
  }

  async fn release_stale_reservations(&self, older_than: DateTime<Utc>) -> Result<usize> {
    let cutoff = encode_dt(older_than);
    let now_s  = encode_dt(Utc::now());

    let released = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let tokens: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT token FROM quota_reservations
             WHERE state = 'pending' AND created_at < ?1",
          )?;
          stmt
            .query_map(params![cutoff], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut released = 0;
        for token in &tokens {
          if release_pending(&tx, token, &now_s)? {
            released += 1;
          }
        }
        tx.commit()?;
        Ok(released)
      })
      .await?;

    Ok(released)
  }

  async fn prune_settled_reservations(&self, settled_before: DateTime<Utc>) -> Result<usize> {
    let cutoff = encode_dt(settled_before);
    let pruned = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM quota_reservations
           WHERE state IN ('committed', 'released') AND settled_at < ?1",
          params![cutoff],
        )?)
      })
      .await?;
    Ok(pruned)
  }
}
