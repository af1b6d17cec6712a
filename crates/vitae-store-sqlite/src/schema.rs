//! SQL schema for the Vitae SQLite store.
//!
//! Executed at every connection startup; the DDL is idempotent via
//! `IF NOT EXISTS`. `PRAGMA user_version` records the schema revision so a
//! later migration step has something to compare against.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Entity versions are append-only. The only UPDATE ever issued against this
-- table flips is_active when the active pointer advances to the next version.
CREATE TABLE IF NOT EXISTS entities (
    logical_id        TEXT    NOT NULL,
    version           INTEGER NOT NULL,
    owner_id          TEXT    NOT NULL,
    entity_type       TEXT    NOT NULL,
    payload_json      TEXT    NOT NULL,   -- JSON payload (inner data only)
    source            TEXT    NOT NULL,   -- 'user_manual' | 'ai_extraction'
    source_confidence REAL,
    is_active         INTEGER NOT NULL DEFAULT 0,
    recorded_at       TEXT    NOT NULL,   -- ISO 8601 UTC; server-assigned
    PRIMARY KEY (logical_id, version),
    CHECK (version >= 1)
);

-- At most one active version per logical entity.
CREATE UNIQUE INDEX IF NOT EXISTS entities_one_active_idx
    ON entities(logical_id) WHERE is_active = 1;

CREATE INDEX IF NOT EXISTS entities_owner_idx
    ON entities(owner_id, entity_type);

-- Extraction output for a resume version, as handed over by the pipeline.
-- Replaced wholesale when a version is re-ingested.
CREATE TABLE IF NOT EXISTS candidates (
    version_id       TEXT NOT NULL,
    parsed_entity_id TEXT NOT NULL,
    owner_id         TEXT NOT NULL,
    entity_type      TEXT NOT NULL,
    fields_json      TEXT NOT NULL,
    confidence       REAL,
    ingested_at      TEXT NOT NULL,
    PRIMARY KEY (version_id, parsed_entity_id)
);

-- The merge decision ledger: one row per field per candidate per review
-- cycle. Upsert on the key tuple; recording never touches entity rows.
CREATE TABLE IF NOT EXISTS decisions (
    version_id           TEXT NOT NULL,
    parsed_entity_id     TEXT NOT NULL,
    field_name           TEXT NOT NULL,
    entity_type          TEXT NOT NULL,
    profile_entity_id    TEXT,
    decision             TEXT NOT NULL,   -- 'accept' | 'reject' | 'override'
    parsed_value_json    TEXT NOT NULL,
    confirmed_value_json TEXT,
    justification        TEXT,
    confidence           REAL,
    applied              INTEGER NOT NULL DEFAULT 0,
    recorded_at          TEXT NOT NULL,
    PRIMARY KEY (version_id, parsed_entity_id, field_name)
);

CREATE INDEX IF NOT EXISTS decisions_pending_idx
    ON decisions(version_id, applied);

PRAGMA user_version = 1;
";
