//! [`SqliteStore`] — the SQLite implementation of [`ProjectionStore`].

use chrono::{DateTime, Utc};
use std::path::Path;

use aims_core::{
  document::{Document, NewDocument},
  index::VersionIndex,
  source::{ActivitySource, CodelistSource, QueryParams},
  sql::quote_ident,
  store::{
    IngestReport, MaterializeReport, ProjectionStore, SqlValue, StoredTable,
    TableData,
  },
  table::{ColumnDef, DocumentTable, TableKind, XmlTableDef},
  version::{Version, VersionConfig},
};

use crate::{Error, Result, functions, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An AIMS projection store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
  docs: DocumentTable,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, register the projection SQL
  /// functions, and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, docs: DocumentTable::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, docs: DocumentTable::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// The document table layout generated queries are bound to.
  pub fn document_table(&self) -> &DocumentTable {
    &self.docs
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        functions::register(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  /// Upsert a document, keyed by its natural identifier. The derived `id`
  /// is written on insert and left untouched on update.
  pub async fn upsert_document(&self, input: NewDocument) -> Result<Document> {
    let document = Document {
      id:              input.id(),
      iati_identifier: input.iati_identifier,
      content:         input.content,
      iati_version:    input.iati_version,
      updated_at:      Utc::now(),
    };

    let id = document.id.clone();
    let identifier = document.iati_identifier.clone();
    let content = document.content.clone();
    let version = document.iati_version.to_string();
    let updated_at = document.updated_at.to_rfc3339();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO iati_activities
             (id, iati_identifier, content, iati_version, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(iati_identifier) DO UPDATE SET
             content      = excluded.content,
             iati_version = excluded.iati_version,
             updated_at   = excluded.updated_at",
          rusqlite::params![id, identifier, content, version, updated_at],
        )?;
        Ok(())
      })
      .await?;

    Ok(document)
  }

  /// Fetch one document by natural identifier (trimmed before matching).
  pub async fn document(&self, iati_identifier: &str) -> Result<Option<Document>> {
    let identifier = iati_identifier.trim().to_owned();
    let raw: Option<(String, String, String, String, String)> = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT id, iati_identifier, content, iati_version, updated_at
               FROM iati_activities WHERE iati_identifier = ?1",
              rusqlite::params![identifier],
              |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw
      .map(|(id, iati_identifier, content, version, updated_at)| {
        Ok(Document {
          id,
          iati_identifier,
          content,
          iati_version: version.parse()?,
          updated_at: decode_dt(&updated_at)?,
        })
      })
      .transpose()
  }

  pub async fn document_count(&self) -> Result<usize> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM iati_activities", [], |row| row.get(0))?)
      })
      .await?;
    Ok(count as usize)
  }

  /// Fetch activity elements from `source` and upsert them all.
  ///
  /// Per-element failures (missing identifier, bad version, malformed XML)
  /// are logged and counted; the sweep always completes. A transport-level
  /// failure of the fetch itself is surfaced.
  pub async fn fetch_documents<S: ActivitySource>(
    &self,
    source: &S,
    params: &QueryParams,
  ) -> Result<IngestReport> {
    let elements = source
      .activities(params)
      .await
      .map_err(|e| Error::Source(Box::new(e)))?;

    let mut report = IngestReport { fetched: elements.len(), ..Default::default() };
    for xml in &elements {
      match parse_source_activity(xml) {
        Ok(input) => match self.upsert_document(input).await {
          Ok(_) => report.stored += 1,
          Err(error) => {
            tracing::error!(%error, "failed to store activity");
            report.failed += 1;
          }
        },
        Err(error) => {
          tracing::warn!(%error, "skipping activity element");
          report.failed += 1;
        }
      }
    }
    Ok(report)
  }

  // ── Expression registry ───────────────────────────────────────────────────

  /// Register a table declaration and its column expressions.
  pub async fn register_table(&self, def: &XmlTableDef) -> Result<StoredTable> {
    let row_expression = def.row_expression().to_owned();
    let version = def.version().to_string();
    let kind = def.kind().to_string();
    let narrative_type = match def {
      XmlTableDef::Narrative { narrative_type, .. } => Some(narrative_type.clone()),
      XmlTableDef::Iati { .. } => None,
    };
    let columns: Vec<(String, String)> = def
      .columns()
      .iter()
      .map(|c| (c.expression.clone(), c.name.clone()))
      .collect();

    let table_id = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO xml_tables (row_expression, iati_version, kind, narrative_type)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![row_expression, version, kind, narrative_type],
        )?;
        let table_id = tx.last_insert_rowid();
        for (expression, name) in &columns {
          tx.execute(
            "INSERT INTO xml_columns (table_id, col_expression, col_name)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![table_id, expression, name],
          )?;
        }
        tx.commit()?;
        Ok(table_id)
      })
      .await?;

    Ok(StoredTable { table_id, def: def.clone() })
  }

  /// Fetch one registered declaration by id.
  pub async fn get_table(&self, table_id: i64) -> Result<Option<StoredTable>> {
    let raw = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        let table = conn
          .query_row(
            "SELECT table_id, row_expression, iati_version, kind, narrative_type
             FROM xml_tables WHERE table_id = ?1",
            rusqlite::params![table_id],
            raw_table,
          )
          .optional()?;
        let columns = match &table {
          Some(_) => table_columns(conn, table_id)?,
          None => Vec::new(),
        };
        Ok(table.map(|t| (t, columns)))
      })
      .await?;

    raw.map(|(table, columns)| stored_table(table, columns)).transpose()
  }

  /// List registered declarations, optionally restricted to one row
  /// expression, in registration order.
  pub async fn list_tables(&self, row_expression: Option<&str>) -> Result<Vec<StoredTable>> {
    let filter = row_expression.map(str::to_owned);
    let raw = self
      .conn
      .call(move |conn| {
        let mut out = Vec::new();
        let tables: Vec<RawTable> = match &filter {
          Some(row) => {
            let mut stmt = conn.prepare(
              "SELECT table_id, row_expression, iati_version, kind, narrative_type
               FROM xml_tables WHERE row_expression = ?1 ORDER BY table_id",
            )?;
            let rows = stmt.query_map(rusqlite::params![row], raw_table)?;
            rows.collect::<rusqlite::Result<_>>()?
          }
          None => {
            let mut stmt = conn.prepare(
              "SELECT table_id, row_expression, iati_version, kind, narrative_type
               FROM xml_tables ORDER BY table_id",
            )?;
            let rows = stmt.query_map([], raw_table)?;
            rows.collect::<rusqlite::Result<_>>()?
          }
        };
        for table in tables {
          let columns = table_columns(conn, table.table_id)?;
          out.push((table, columns));
        }
        Ok(out)
      })
      .await?;

    raw
      .into_iter()
      .map(|(table, columns)| stored_table(table, columns))
      .collect()
  }

  // ── Materializer ──────────────────────────────────────────────────────────

  /// Drop and recreate the materialized projection for `def`.
  ///
  /// Creation failure leaves the projection absent: the error is logged
  /// here with the full offending SQL and returned for the caller to
  /// decide — batch sweeps continue, read paths retry once.
  pub async fn materialize(&self, def: &XmlTableDef) -> Result<()> {
    let name = def.view_name();
    let sql = def.sql(&self.docs);

    let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&name));
    let create_sql = format!("CREATE TABLE {} AS {}", quote_ident(&name), sql);

    let failure: Option<String> = self
      .conn
      .call(move |conn| {
        conn.execute(&drop_sql, [])?;
        match conn.execute(&create_sql, []) {
          Ok(_) => Ok(None),
          Err(e) => Ok(Some(e.to_string())),
        }
      })
      .await?;

    match failure {
      None => {
        tracing::debug!(view = %name, "materialized");
        Ok(())
      }
      Some(message) => {
        tracing::error!(view = %name, error = %message, %sql, "unable to materialize");
        Err(Error::Materialize { name, message, sql })
      }
    }
  }

  /// Drop the materialized projection for `def`, if present.
  pub async fn drop_projection(&self, def: &XmlTableDef) -> Result<()> {
    let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&def.view_name()));
    self
      .conn
      .call(move |conn| {
        conn.execute(&drop_sql, [])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Rebuild every registered projection. One bad declaration never aborts
  /// the sweep.
  pub async fn materialize_all(&self) -> Result<MaterializeReport> {
    let tables = self.list_tables(None).await?;
    let mut report = MaterializeReport::default();
    for stored in &tables {
      let name = stored.def.view_name();
      match self.materialize(&stored.def).await {
        Ok(()) => report.created.push(name),
        Err(error) => {
          tracing::error!(%error, view = %name, "continuing sweep past failed view");
          report.failed.push(name);
        }
      }
    }
    Ok(report)
  }

  /// Whether a projection with this name currently exists.
  pub async fn projection_exists(&self, name: &str) -> Result<bool> {
    let name = name.to_owned();
    let found: bool = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
              rusqlite::params![name],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(found)
  }

  /// Read a projection's rows and columns.
  ///
  /// A missing projection triggers exactly one on-demand materialization
  /// and one retry; a second failure is surfaced. No further retries, so a
  /// declaration that cannot build terminates instead of looping.
  pub async fn execute_with_columns(&self, def: &XmlTableDef) -> Result<TableData> {
    let name = def.view_name();
    let select = format!("SELECT * FROM {}", quote_ident(&name));

    match self.query(&select).await {
      Ok(data) => Ok(data),
      Err(error) if error.is_missing_relation() => {
        tracing::warn!(view = %name, "projection absent; materializing on demand");
        if let Err(error) = self.materialize(def).await {
          tracing::error!(%error, view = %name, "on-demand materialization failed");
        }
        self.query(&select).await
      }
      Err(error) => Err(error),
    }
  }

  /// Execute a read-only query and collect columns and rows.
  pub async fn query(&self, sql: &str) -> Result<TableData> {
    let sql = sql.to_owned();
    let data = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> =
          stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
          let mut values = Vec::with_capacity(width);
          for i in 0..width {
            values.push(decode_value(row.get_ref(i)?));
          }
          out.push(values);
        }
        Ok(TableData { columns, rows: out })
      })
      .await?;
    Ok(data)
  }

  // ── Version reconciliation ────────────────────────────────────────────────

  /// Aggregate, per column name, the distinct schema versions of all
  /// registered tables sharing `row_expression`.
  pub async fn versions_for(&self, row_expression: &str) -> Result<VersionIndex> {
    let row = row_expression.to_owned();
    let pairs: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.col_name, t.iati_version
           FROM xml_tables t
           JOIN xml_columns c ON c.table_id = t.table_id
           WHERE t.row_expression = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![row], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
      })
      .await?;

    let mut index = VersionIndex::default();
    for (name, version) in pairs {
      index.observe(&name, version.parse::<Version>()?);
    }
    Ok(index)
  }

  // ── Codelists ─────────────────────────────────────────────────────────────

  pub async fn upsert_codelist(
    &self,
    name: &str,
    version: Version,
    content: &str,
  ) -> Result<()> {
    let name = name.to_owned();
    let version = version.to_string();
    let content = content.to_owned();
    let fetched_at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO iati_codelists (name, iati_version, content, fetched_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(name, iati_version) DO UPDATE SET
             content = excluded.content, fetched_at = excluded.fetched_at",
          rusqlite::params![name, version, content, fetched_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn codelist(&self, name: &str, version: Version) -> Result<Option<String>> {
    let name = name.to_owned();
    let version = version.to_string();
    let content = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT content FROM iati_codelists WHERE name = ?1 AND iati_version = ?2",
              rusqlite::params![name, version],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(content)
  }

  pub async fn codelist_mapping(&self, version: Version) -> Result<Option<String>> {
    let version = version.to_string();
    let content = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT content FROM iati_codelist_mappings WHERE iati_version = ?1",
              rusqlite::params![version],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(content)
  }

  /// Refresh codelists and mappings for every supported version.
  ///
  /// Not-found is a normal condition ("this codelist does not exist for
  /// this version") and is skipped; fetch failures are logged and counted.
  /// The sweep always completes.
  pub async fn refresh_codelists<S: CodelistSource>(
    &self,
    source: &S,
    names: &[&str],
    cfg: &VersionConfig,
  ) -> Result<CodelistReport> {
    let mut report = CodelistReport::default();

    for &version in &cfg.supported {
      match source.codelist_mapping(version).await {
        Ok(Some(content)) => {
          self.upsert_codelist_mapping(version, &content).await?;
          report.stored += 1;
        }
        Ok(None) => {
          tracing::debug!(%version, "no codelist mapping for version");
          report.missing += 1;
        }
        Err(error) => {
          tracing::warn!(%error, %version, "codelist mapping fetch failed");
          report.failed += 1;
        }
      }

      for &name in names {
        match source.codelist(name, version).await {
          Ok(Some(content)) => {
            self.upsert_codelist(name, version, &content).await?;
            report.stored += 1;
          }
          Ok(None) => {
            tracing::debug!(name, %version, "codelist absent for version");
            report.missing += 1;
          }
          Err(error) => {
            tracing::warn!(%error, name, %version, "codelist fetch failed");
            report.failed += 1;
          }
        }
      }
    }
    Ok(report)
  }

  pub async fn upsert_codelist_mapping(
    &self,
    version: Version,
    content: &str,
  ) -> Result<()> {
    let version = version.to_string();
    let content = content.to_owned();
    let fetched_at = Utc::now().to_rfc3339();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO iati_codelist_mappings (iati_version, content, fetched_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(iati_version) DO UPDATE SET
             content = excluded.content, fetched_at = excluded.fetched_at",
          rusqlite::params![version, content, fetched_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Outcome of a codelist refresh sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodelistReport {
  pub stored:  usize,
  pub missing: usize,
  pub failed:  usize,
}

// ─── Decoding helpers ────────────────────────────────────────────────────────

type RawTableRow = (i64, String, String, String, Option<String>);

struct RawTable {
  table_id:       i64,
  row_expression: String,
  iati_version:   String,
  kind:           String,
  narrative_type: Option<String>,
}

fn raw_table(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTable> {
  let (table_id, row_expression, iati_version, kind, narrative_type): RawTableRow =
    (row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?);
  Ok(RawTable { table_id, row_expression, iati_version, kind, narrative_type })
}

fn table_columns(
  conn: &rusqlite::Connection,
  table_id: i64,
) -> rusqlite::Result<Vec<(String, String)>> {
  let mut stmt = conn.prepare(
    "SELECT col_expression, col_name FROM xml_columns
     WHERE table_id = ?1 ORDER BY column_id",
  )?;
  let rows = stmt.query_map(rusqlite::params![table_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
  rows.collect()
}

fn stored_table(raw: RawTable, columns: Vec<(String, String)>) -> Result<StoredTable> {
  let version: Version = raw.iati_version.parse()?;
  let kind: TableKind = raw
    .kind
    .parse()
    .map_err(|_| aims_core::Error::UnknownTableKind(raw.kind.clone()))?;

  let def = match kind {
    TableKind::Iati => XmlTableDef::iati(
      &raw.row_expression,
      version,
      columns
        .into_iter()
        .map(|(expression, name)| ColumnDef { expression, name })
        .collect(),
    ),
    TableKind::Narrative => XmlTableDef::narrative(
      &raw.row_expression,
      raw.narrative_type.as_deref().unwrap_or_default(),
      version,
    ),
  };
  Ok(StoredTable { table_id: raw.table_id, def })
}

fn decode_value(value: rusqlite::types::ValueRef<'_>) -> SqlValue {
  use rusqlite::types::ValueRef;
  match value {
    ValueRef::Null => SqlValue::Null,
    ValueRef::Integer(n) => SqlValue::Integer(n),
    ValueRef::Real(f) => SqlValue::Real(f),
    ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
  }
}

fn decode_dt(raw: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Extract the natural identifier and schema version from one raw activity
/// element, as the datastore annotates it.
fn parse_source_activity(xml: &str) -> Result<NewDocument> {
  let root = aims_xml::parse(xml)?;

  let identifier = root
    .child("iati-identifier")
    .map(|e| e.text())
    .filter(|text| !text.trim().is_empty())
    .ok_or(Error::MissingIdentifier)?;

  let version: Version = root
    .attr_local("version")
    .ok_or(Error::MissingVersion)?
    .parse()?;

  Ok(NewDocument::new(&identifier, xml, version))
}

// ─── ProjectionStore impl ────────────────────────────────────────────────────

impl ProjectionStore for SqliteStore {
  type Error = Error;

  async fn list_tables(&self, row_expression: Option<&str>) -> Result<Vec<StoredTable>> {
    SqliteStore::list_tables(self, row_expression).await
  }

  async fn versions_for(&self, row_expression: &str) -> Result<VersionIndex> {
    SqliteStore::versions_for(self, row_expression).await
  }

  async fn materialize(&self, def: &XmlTableDef) -> Result<()> {
    SqliteStore::materialize(self, def).await
  }

  async fn projection_exists(&self, name: &str) -> Result<bool> {
    SqliteStore::projection_exists(self, name).await
  }

  async fn execute_with_columns(&self, def: &XmlTableDef) -> Result<TableData> {
    SqliteStore::execute_with_columns(self, def).await
  }

  async fn query(&self, sql: &str) -> Result<TableData> {
    SqliteStore::query(self, sql).await
  }
}
