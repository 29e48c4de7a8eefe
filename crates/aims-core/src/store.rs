//! The `ProjectionStore` trait and supporting query result types.
//!
//! The trait is implemented by storage backends (e.g. `aims-store-sqlite`).
//! The query surface (`aims-views`) depends on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use serde::Serialize;

use crate::{index::VersionIndex, table::XmlTableDef};

// ─── Result types ────────────────────────────────────────────────────────────

/// A single value read back from a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
}

impl SqlValue {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      SqlValue::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      SqlValue::Integer(n) => Some(*n),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, SqlValue::Null)
  }

  fn to_json(&self) -> serde_json::Value {
    match self {
      SqlValue::Null => serde_json::Value::Null,
      SqlValue::Integer(n) => (*n).into(),
      SqlValue::Real(f) => serde_json::Number::from_f64(*f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null),
      SqlValue::Text(s) => serde_json::Value::String(s.clone()),
    }
  }
}

/// One keyed record: column name → value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Columns and rows read from a projection or an aggregation query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableData {
  pub columns: Vec<String>,
  pub rows:    Vec<Vec<SqlValue>>,
}

impl TableData {
  /// The rows as a keyed record sequence.
  pub fn records(&self) -> Vec<Record> {
    self
      .rows
      .iter()
      .map(|row| {
        self
          .columns
          .iter()
          .zip(row)
          .map(|(name, value)| (name.clone(), value.to_json()))
          .collect()
      })
      .collect()
  }

  /// Index of a named column, if present.
  pub fn column(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c == name)
  }
}

/// A registered table declaration with its storage identity.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
  pub table_id: i64,
  pub def:      XmlTableDef,
}

/// Outcome of a document ingestion sweep. Per-item failures are logged and
/// counted; the sweep always completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
  pub fetched: usize,
  pub stored:  usize,
  pub failed:  usize,
}

/// Outcome of a materialize-all sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
  /// View names created.
  pub created: Vec<String>,
  /// View names whose creation failed (failures were logged with the
  /// offending SQL and left the projection absent).
  pub failed:  Vec<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a projection store backend.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait ProjectionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// List registered table declarations, optionally restricted to one row
  /// expression.
  fn list_tables<'a>(
    &'a self,
    row_expression: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<StoredTable>, Self::Error>> + Send + 'a;

  /// The version reconciliation index for a row expression.
  fn versions_for<'a>(
    &'a self,
    row_expression: &'a str,
  ) -> impl Future<Output = Result<VersionIndex, Self::Error>> + Send + 'a;

  /// Drop and recreate the materialized projection for `def`. A creation
  /// failure leaves the projection absent and is reported as an error the
  /// caller is expected to log (batch sweeps continue past it).
  fn materialize<'a>(
    &'a self,
    def: &'a XmlTableDef,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Whether a projection with this name currently exists.
  fn projection_exists<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Read a projection's rows and columns, materializing on demand: a
  /// missing projection triggers exactly one rebuild attempt and one retry.
  fn execute_with_columns<'a>(
    &'a self,
    def: &'a XmlTableDef,
  ) -> impl Future<Output = Result<TableData, Self::Error>> + Send + 'a;

  /// Execute a generated aggregation query.
  fn query<'a>(
    &'a self,
    sql: &'a str,
  ) -> impl Future<Output = Result<TableData, Self::Error>> + Send + 'a;
}
