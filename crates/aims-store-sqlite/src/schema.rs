//! SQL schema for the AIMS SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number. Materialized
//! projections are deliberately not declared here: they are created and
//! dropped at runtime by the Materializer, one table per registered
//! (row expression, schema version) pair.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The Document Store: one row per activity, raw XML in `content`.
-- `id` is the slugified identifier and never changes once created;
-- re-fetching the same natural identifier replaces body and version.
CREATE TABLE IF NOT EXISTS iati_activities (
    id              TEXT PRIMARY KEY,
    iati_identifier TEXT NOT NULL UNIQUE,
    content         TEXT NOT NULL,
    iati_version    TEXT NOT NULL,   -- canonical 'major.minor', e.g. '2.03'
    updated_at      TEXT NOT NULL    -- RFC 3339 UTC
);

-- The row/column expression registry. Uniqueness of
-- (row_expression, iati_version) is intentionally not enforced: duplicate
-- declarations overwrite the same materialized name.
CREATE TABLE IF NOT EXISTS xml_tables (
    table_id        INTEGER PRIMARY KEY,
    row_expression  TEXT NOT NULL,
    iati_version    TEXT NOT NULL,
    kind            TEXT NOT NULL,   -- 'iati' | 'narrative'
    narrative_type  TEXT             -- discriminator for narrative tables
);

CREATE TABLE IF NOT EXISTS xml_columns (
    column_id       INTEGER PRIMARY KEY,
    table_id        INTEGER NOT NULL REFERENCES xml_tables(table_id)
                    ON DELETE CASCADE,
    col_expression  TEXT NOT NULL,
    col_name        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS xml_tables_row_idx   ON xml_tables(row_expression);
CREATE INDEX IF NOT EXISTS xml_columns_tbl_idx  ON xml_columns(table_id);

-- Codelist reference data, fetched best-effort per supported version.
CREATE TABLE IF NOT EXISTS iati_codelists (
    name         TEXT NOT NULL,
    iati_version TEXT NOT NULL,
    content      TEXT NOT NULL,
    fetched_at   TEXT NOT NULL,
    PRIMARY KEY (name, iati_version)
);

CREATE TABLE IF NOT EXISTS iati_codelist_mappings (
    iati_version TEXT PRIMARY KEY,
    content      TEXT NOT NULL,
    fetched_at   TEXT NOT NULL
);

PRAGMA user_version = 1;
";
