//! Read surface over registered tables and their projections.

use aims_core::{
  store::{ProjectionStore, Record, StoredTable, TableData},
  table::TableKind,
  version::Version,
};
use serde::Serialize;

use crate::{Error, Result};

/// One registered table as presented to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
  pub table_id:       i64,
  pub row_expression: String,
  pub iati_version:   Version,
  pub kind:           TableKind,
  pub view_name:      String,
  pub columns:        Vec<String>,
  /// Whether the projection currently exists in storage. Reads rebuild it
  /// on demand, so `false` only means "not built yet".
  pub materialized:   bool,
}

/// List registered tables, optionally restricted to one row expression.
pub async fn tables<S: ProjectionStore>(
  store: &S,
  row_expression: Option<&str>,
) -> Result<Vec<TableSummary>> {
  let stored = store
    .list_tables(row_expression)
    .await
    .map_err(Error::store)?;

  let mut out = Vec::with_capacity(stored.len());
  for table in stored {
    let view_name = table.def.view_name();
    let materialized = store
      .projection_exists(&view_name)
      .await
      .map_err(Error::store)?;
    out.push(TableSummary {
      table_id: table.table_id,
      row_expression: table.def.row_expression().to_owned(),
      iati_version: table.def.version(),
      kind: table.def.kind(),
      columns: table.def.columns().iter().map(|c| c.name.clone()).collect(),
      view_name,
      materialized,
    });
  }
  Ok(out)
}

/// A table's projection as columns plus rows.
pub async fn table_data<S: ProjectionStore>(
  store: &S,
  table: &StoredTable,
) -> Result<TableData> {
  store
    .execute_with_columns(&table.def)
    .await
    .map_err(Error::store)
}

/// A table's projection as a keyed record sequence.
pub async fn table_records<S: ProjectionStore>(
  store: &S,
  table: &StoredTable,
) -> Result<Vec<Record>> {
  Ok(table_data(store, table).await?.records())
}
