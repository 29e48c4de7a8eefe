//! Cross-version aggregation views.
//!
//! Each aggregation UNIONs the per-version projections sharing a row
//! expression, one member per registered schema version, restricted to
//! columns the reconciliation index proves present in every member. Member
//! queries therefore always agree on arity and column names, and version
//! skew can never surface as a malformed UNION at execution time.

use std::collections::BTreeSet;

use aims_core::{
  index::VersionIndex,
  sql::{Expr, FromItem, Query, Select},
  store::{ProjectionStore, TableData},
  table::XmlTableDef,
  version::{Version, VersionConfig},
};

use crate::{Error, Result};

pub const ACTIVITY_ROW: &str = "/iati-activity";
pub const TRANSACTION_ROW: &str = "/iati-activity/transaction";
pub const PARTICIPATING_ORG_ROW: &str = "/iati-activity/participating-org";

/// Donor-internal reporting columns (forward spending, CRS++) excluded from
/// the activities aggregation.
pub const ACTIVITY_EXCLUDED_PREFIXES: &[&str] = &["fss", "crs"];

/// Column names the transactions aggregation selects when the caller does
/// not supply its own list.
pub const DEFAULT_TRANSACTION_COLUMNS: &[&str] = &[
  "value",
  "value_currency",
  "value_value_date",
  "transaction_type_code",
];

// Generated by every projection, never part of the declared column set.
const MEMBER: &str = "t";
const UNION: &str = "u";
const SEQ: &str = "x";

/// UNION of `/iati-activity` projections across registered versions,
/// selecting `iati_identifier, iati_version` first and then the common
/// declared columns with [`ACTIVITY_EXCLUDED_PREFIXES`] applied.
pub async fn activities<S: ProjectionStore>(
  store: &S,
  cfg: &VersionConfig,
) -> Result<TableData> {
  common_union(store, ACTIVITY_ROW, cfg, ACTIVITY_EXCLUDED_PREFIXES).await
}

/// Common-column UNION of `/iati-activity/participating-org` projections.
pub async fn participating_organisations<S: ProjectionStore>(
  store: &S,
  cfg: &VersionConfig,
) -> Result<TableData> {
  common_union(store, PARTICIPATING_ORG_ROW, cfg, &[]).await
}

/// UNION of `/iati-activity/transaction` projections, wrapped in a window
/// that numbers each activity's transactions across versions and derives a
/// stable `transaction_id`: the transaction's own `ref` where present,
/// otherwise `iati_identifier || '-' || seq`.
pub async fn transactions<S: ProjectionStore>(
  store: &S,
  cfg: &VersionConfig,
  columns: Option<&[&str]>,
) -> Result<TableData> {
  let members = members(store, TRANSACTION_ROW, cfg).await?;
  let index = store
    .versions_for(TRANSACTION_ROW)
    .await
    .map_err(Error::store)?;
  ensure_materialized(store, &members.defs).await?;

  let query = transactions_query(
    &members.defs,
    &index,
    &members.versions,
    columns.unwrap_or(DEFAULT_TRANSACTION_COLUMNS),
  );
  store.query(&query.sql()).await.map_err(Error::store)
}

// ─── Member selection ────────────────────────────────────────────────────────

struct Members {
  defs:     Vec<XmlTableDef>,
  versions: BTreeSet<Version>,
}

/// The registered tables participating in an aggregation: one per supported
/// schema version (first registration wins; duplicates share a projection
/// name anyway).
async fn members<S: ProjectionStore>(
  store: &S,
  row_expression: &str,
  cfg: &VersionConfig,
) -> Result<Members> {
  let stored = store
    .list_tables(Some(row_expression))
    .await
    .map_err(Error::store)?;

  let mut defs = Vec::new();
  let mut versions = BTreeSet::new();
  for table in stored {
    if !cfg.supported.contains(&table.def.version()) {
      continue;
    }
    if versions.insert(table.def.version()) {
      defs.push(table.def);
    }
  }

  if defs.is_empty() {
    return Err(Error::NoTables(row_expression.to_owned()));
  }
  Ok(Members { defs, versions })
}

async fn ensure_materialized<S: ProjectionStore>(
  store: &S,
  defs: &[XmlTableDef],
) -> Result<()> {
  for def in defs {
    let name = def.view_name();
    if !store.projection_exists(&name).await.map_err(Error::store)? {
      tracing::debug!(view = %name, "materializing absent aggregation member");
      store.materialize(def).await.map_err(Error::store)?;
    }
  }
  Ok(())
}

// ─── Query construction ──────────────────────────────────────────────────────

async fn common_union<S: ProjectionStore>(
  store: &S,
  row_expression: &str,
  cfg: &VersionConfig,
  excluded_prefixes: &[&str],
) -> Result<TableData> {
  let members = members(store, row_expression, cfg).await?;
  let index = store
    .versions_for(row_expression)
    .await
    .map_err(Error::store)?;
  ensure_materialized(store, &members.defs).await?;

  let query = common_union_query(
    &members.defs,
    &index,
    &members.versions,
    excluded_prefixes,
  );
  store.query(&query.sql()).await.map_err(Error::store)
}

/// Identifier columns first, then the common declared columns (sorted,
/// exclusions applied).
fn union_columns(
  index: &VersionIndex,
  versions: &BTreeSet<Version>,
  excluded_prefixes: &[&str],
) -> Vec<String> {
  let mut columns =
    vec!["iati_identifier".to_owned(), "iati_version".to_owned()];
  for name in index.common_columns(versions, excluded_prefixes) {
    if !columns.contains(&name) {
      columns.push(name);
    }
  }
  columns
}

fn member_select(def: &XmlTableDef, columns: &[String]) -> Select {
  Select {
    items:        columns
      .iter()
      .map(|c| Expr::col(MEMBER, c).item())
      .collect(),
    from:         vec![FromItem::table(&def.view_name(), MEMBER)],
    where_clause: vec![],
  }
}

fn common_union_query(
  defs: &[XmlTableDef],
  index: &VersionIndex,
  versions: &BTreeSet<Version>,
  excluded_prefixes: &[&str],
) -> Query {
  let columns = union_columns(index, versions, excluded_prefixes);
  Query::Union(defs.iter().map(|def| member_select(def, &columns)).collect())
}

fn transactions_query(
  defs: &[XmlTableDef],
  index: &VersionIndex,
  versions: &BTreeSet<Version>,
  requested: &[&str],
) -> Query {
  let common = index.common_columns(versions, &[]);
  let has_ref = common.iter().any(|name| name == "ref");
  let value_columns: Vec<String> = requested
    .iter()
    .filter(|name| common.iter().any(|c| c == *name))
    .map(|name| (*name).to_owned())
    .collect();

  // Members carry the identifiers, the within-document ordinality, and the
  // transaction's own reference (NULL where no version declares one).
  let member = |def: &XmlTableDef| {
    let mut items = vec![
      Expr::col(MEMBER, "iati_identifier").item(),
      Expr::col(MEMBER, "iati_version").item(),
      Expr::col(MEMBER, "ordinality").item(),
      if has_ref {
        Expr::col(MEMBER, "ref").item()
      } else {
        Expr::Null.alias("ref")
      },
    ];
    items.extend(value_columns.iter().map(|c| Expr::col(MEMBER, c).item()));
    Select {
      items,
      from: vec![FromItem::table(&def.view_name(), MEMBER)],
      where_clause: vec![],
    }
  };
  let union = Query::Union(defs.iter().map(member).collect());

  let mut passthrough = vec![
    "iati_identifier".to_owned(),
    "iati_version".to_owned(),
    "ordinality".to_owned(),
    "ref".to_owned(),
  ];
  passthrough.extend(value_columns);

  // Number each activity's transactions across versions. (version,
  // ordinality) is unique within a partition, so the numbering is total.
  let mut seq_items: Vec<_> = passthrough
    .iter()
    .map(|c| Expr::col(UNION, c).item())
    .collect();
  seq_items.push(
    Expr::RowNumber {
      partition_by: vec![Expr::col(UNION, "iati_identifier")],
      order_by:     vec![
        Expr::col(UNION, "iati_version"),
        Expr::col(UNION, "ordinality"),
      ],
    }
    .alias("seq"),
  );
  let numbered = Select {
    items:        seq_items,
    from:         vec![FromItem::derived(union, UNION)],
    where_clause: vec![],
  };

  let mut items: Vec<_> = passthrough
    .iter()
    .map(|c| Expr::col(SEQ, c).item())
    .collect();
  items.push(Expr::col(SEQ, "seq").item());
  items.push(
    Expr::coalesce(vec![
      Expr::col(SEQ, "ref"),
      Expr::concat(
        Expr::concat(Expr::col(SEQ, "iati_identifier"), Expr::str_lit("-")),
        Expr::cast_text(Expr::col(SEQ, "seq")),
      ),
    ])
    .alias("transaction_id"),
  );

  Query::Select(Select {
    items,
    from: vec![FromItem::derived(Query::Select(numbered), SEQ)],
    where_clause: vec![],
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(s: &str) -> Version {
    s.parse().unwrap()
  }

  fn index(observations: &[(&str, &str)]) -> VersionIndex {
    observations
      .iter()
      .map(|(name, version)| ((*name).to_owned(), v(version)))
      .collect()
  }

  fn defs(row: &str, versions: &[&str]) -> Vec<XmlTableDef> {
    versions
      .iter()
      .map(|s| XmlTableDef::iati(row, v(s), vec![]))
      .collect()
  }

  #[test]
  fn common_union_has_one_member_per_version() {
    let defs = defs(ACTIVITY_ROW, &["2.02", "2.03"]);
    let idx = index(&[
      ("hierarchy", "2.02"),
      ("hierarchy", "2.03"),
      ("capital_spend", "2.03"),
    ]);
    let versions: BTreeSet<Version> = [v("2.02"), v("2.03")].into_iter().collect();

    let sql = common_union_query(&defs, &idx, &versions, &[]).sql();
    assert_eq!(sql.matches(" UNION ").count(), 1);
    assert!(sql.contains("\"iati_activity2-02\""));
    assert!(sql.contains("\"iati_activity2-03\""));
    // Common across both versions.
    assert!(sql.contains("\"t\".\"hierarchy\""));
    // Present in only one version: dropped.
    assert!(!sql.contains("capital_spend"));
  }

  #[test]
  fn identifier_columns_come_first() {
    let defs = defs(ACTIVITY_ROW, &["2.03"]);
    let idx = index(&[("hierarchy", "2.03")]);
    let versions: BTreeSet<Version> = [v("2.03")].into_iter().collect();

    let sql = common_union_query(&defs, &idx, &versions, &[]).sql();
    assert!(sql.starts_with("SELECT \"t\".\"iati_identifier\", \"t\".\"iati_version\""));
  }

  #[test]
  fn excluded_prefixes_drop_reporting_columns() {
    let defs = defs(ACTIVITY_ROW, &["2.03"]);
    let idx = index(&[
      ("hierarchy", "2.03"),
      ("fss_extraction_date", "2.03"),
      ("crs_other_flags", "2.03"),
    ]);
    let versions: BTreeSet<Version> = [v("2.03")].into_iter().collect();

    let sql =
      common_union_query(&defs, &idx, &versions, ACTIVITY_EXCLUDED_PREFIXES)
        .sql();
    assert!(sql.contains("hierarchy"));
    assert!(!sql.contains("fss_extraction_date"));
    assert!(!sql.contains("crs_other_flags"));
  }

  #[test]
  fn transactions_query_numbers_and_derives_ids() {
    let defs = defs(TRANSACTION_ROW, &["2.02", "2.03"]);
    let idx = index(&[
      ("ref", "2.02"),
      ("ref", "2.03"),
      ("value", "2.02"),
      ("value", "2.03"),
      ("value_currency", "2.03"),
    ]);
    let versions: BTreeSet<Version> = [v("2.02"), v("2.03")].into_iter().collect();

    let sql =
      transactions_query(&defs, &idx, &versions, DEFAULT_TRANSACTION_COLUMNS)
        .sql();
    assert!(sql.contains(
      "ROW_NUMBER() OVER (PARTITION BY \"u\".\"iati_identifier\" \
       ORDER BY \"u\".\"iati_version\", \"u\".\"ordinality\") AS \"seq\""
    ));
    assert!(sql.contains(
      "COALESCE(\"x\".\"ref\", ((\"x\".\"iati_identifier\" || '-') || \
       CAST(\"x\".\"seq\" AS TEXT))) AS \"transaction_id\""
    ));
    // Requested but not common across both versions: dropped.
    assert!(!sql.contains("value_currency"));
    assert!(sql.contains("\"t\".\"value\""));
  }

  #[test]
  fn transactions_query_nulls_ref_when_undeclared() {
    let defs = defs(TRANSACTION_ROW, &["2.03"]);
    let idx = index(&[("value", "2.03")]);
    let versions: BTreeSet<Version> = [v("2.03")].into_iter().collect();

    let sql = transactions_query(&defs, &idx, &versions, &["value"]).sql();
    assert!(sql.contains("NULL AS \"ref\""));
  }
}
