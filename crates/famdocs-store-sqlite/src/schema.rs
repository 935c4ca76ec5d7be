//! SQL schema for the famdocs SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS families (
    family_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    description TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);

-- One row per family. Usage counters never leave [0, ceiling] once a
-- statement commits; reservations move the ai_requests and documents pair.
CREATE TABLE IF NOT EXISTS subscriptions (
    subscription_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    family_id                      INTEGER NOT NULL UNIQUE
                                     REFERENCES families(family_id) ON DELETE CASCADE,
    plan                           TEXT NOT NULL,  -- 'free' | 'premium'
    status                         TEXT NOT NULL,  -- 'active' | 'expired' | 'cancelled' | 'pending'
    max_members                    INTEGER NOT NULL,
    max_documents                  INTEGER NOT NULL,
    max_ai_requests_per_month      INTEGER NOT NULL,
    max_storage_mb                 INTEGER NOT NULL,
    current_members                INTEGER NOT NULL DEFAULT 0,
    current_documents              INTEGER NOT NULL DEFAULT 0,
    current_ai_requests_this_month INTEGER NOT NULL DEFAULT 0,
    current_storage_mb             INTEGER NOT NULL DEFAULT 0,
    billing_cycle_start            TEXT NOT NULL,
    created_at                     TEXT NOT NULL,
    CHECK (current_members                BETWEEN 0 AND max_members),
    CHECK (current_documents              BETWEEN 0 AND max_documents),
    CHECK (current_ai_requests_this_month BETWEEN 0 AND max_ai_requests_per_month),
    CHECK (current_storage_mb             BETWEEN 0 AND max_storage_mb)
);

CREATE TABLE IF NOT EXISTS family_members (
    member_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    family_id            INTEGER NOT NULL REFERENCES families(family_id) ON DELETE CASCADE,
    identity_id          TEXT UNIQUE,
    full_name            TEXT NOT NULL,
    birth_date           TEXT NOT NULL,   -- YYYY-MM-DD
    gender               TEXT NOT NULL,
    nationality          TEXT NOT NULL,
    email                TEXT NOT NULL UNIQUE,
    address_street       TEXT,
    address_number       TEXT,
    address_complement   TEXT,
    address_neighborhood TEXT,
    address_city         TEXT,
    address_state        TEXT,
    address_country      TEXT,
    address_zipcode      TEXT,
    role                 TEXT NOT NULL DEFAULT 'member',
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    document_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    family_id         INTEGER NOT NULL REFERENCES families(family_id) ON DELETE CASCADE,
    member_id         INTEGER NOT NULL REFERENCES family_members(member_id) ON DELETE CASCADE,
    document_type     TEXT NOT NULL,
    document_number   TEXT NOT NULL,
    issuing_country   TEXT NOT NULL,
    issuing_authority TEXT,
    issue_date        TEXT,
    expiration_date   TEXT,
    archive_id        INTEGER,
    archive_url       TEXT,
    title             TEXT NOT NULL,
    description       TEXT,
    tags              TEXT NOT NULL DEFAULT '[]',  -- JSON array
    created_at        TEXT NOT NULL
);

-- One row per reserved unit of quota. Only 'pending' rows ever transition.
CREATE TABLE IF NOT EXISTS quota_reservations (
    token      TEXT PRIMARY KEY,
    family_id  INTEGER NOT NULL REFERENCES families(family_id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,   -- 'ai_request' | 'document'
    state      TEXT NOT NULL,   -- 'pending' | 'committed' | 'released'
    created_at TEXT NOT NULL,
    settled_at TEXT
);

CREATE INDEX IF NOT EXISTS members_family_idx       ON family_members(family_id);
CREATE INDEX IF NOT EXISTS documents_member_idx     ON documents(member_id);
CREATE INDEX IF NOT EXISTS reservations_pending_idx ON quota_reservations(state, created_at);

PRAGMA user_version = 1;
";
