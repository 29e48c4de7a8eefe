//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;

use aims_core::{
  document::NewDocument,
  source::{ActivitySource, CodelistSource, QueryParams},
  store::{SqlValue, TableData},
  table::{ColumnDef, XmlTableDef},
  version::{Version, VersionConfig},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  // Surface store logs under --nocapture; repeated init attempts are fine.
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn v(s: &str) -> Version {
  s.parse().unwrap()
}

/// One activity as the upstream datastore returns it: the natural
/// identifier deliberately padded, the schema version in the datastore's
/// attribute namespace, and a default language on the activity element.
fn sample_activity() -> &'static str {
  r#"<iati-activity xmlns:dsv="http://datastore.iatistandard.org/ns" dsv:version="2.02" xml:lang="fr">
  <iati-identifier> XM-DAC-41114-Output 1 </iati-identifier>
  <title>
    <narrative xml:lang="en">Output one</narrative>
    <narrative>Produit un</narrative>
  </title>
  <transaction ref="T-1">
    <transaction-type code="3"/>
    <value currency="USD" value-date="2024-01-15">1000</value>
    <description>
      <narrative>Support costs</narrative>
    </description>
  </transaction>
  <transaction>
    <transaction-type code="2"/>
    <value currency="EUR" value-date="2024-02-01">250.5</value>
  </transaction>
</iati-activity>"#
}

fn transaction_def(version: &str) -> XmlTableDef {
  XmlTableDef::iati("/iati-activity/transaction", v(version), vec![
    ColumnDef::new("@ref", "ref"),
    ColumnDef::new("value", "value"),
    ColumnDef::new("value/@currency", "value_currency"),
    ColumnDef::new("value/@value-date", "value_value_date"),
    ColumnDef::new("transaction-type/@code", "transaction_type_code"),
  ])
}

fn cell<'a>(data: &'a TableData, row: usize, col: &str) -> &'a SqlValue {
  let idx = data.column(col).unwrap_or_else(|| panic!("no column {col}"));
  &data.rows[row][idx]
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_replaces_in_place() {
  let s = store().await;

  let first = s
    .upsert_document(NewDocument::new(" XM-1 ", "<iati-activity>a</iati-activity>", v("2.02")))
    .await
    .unwrap();
  let second = s
    .upsert_document(NewDocument::new("XM-1", "<iati-activity>b</iati-activity>", v("2.03")))
    .await
    .unwrap();

  assert_eq!(first.id, second.id);
  assert_eq!(s.document_count().await.unwrap(), 1);

  let stored = s.document("XM-1").await.unwrap().unwrap();
  assert_eq!(stored.id, first.id);
  assert_eq!(stored.content, "<iati-activity>b</iati-activity>");
  assert_eq!(stored.iati_version, v("2.03"));
}

#[tokio::test]
async fn document_missing_returns_none() {
  let s = store().await;
  assert!(s.document("nope").await.unwrap().is_none());
}

struct StaticSource(Vec<String>);

impl ActivitySource for StaticSource {
  type Error = std::convert::Infallible;

  async fn activities(&self, _params: &QueryParams) -> Result<Vec<String>, Self::Error> {
    Ok(self.0.clone())
  }
}

#[tokio::test]
async fn fetch_documents_counts_per_item_failures() {
  let s = store().await;
  let source = StaticSource(vec![
    sample_activity().to_owned(),
    // No iati-identifier: skipped, never stored.
    r#"<iati-activity xmlns:dsv="http://datastore.iatistandard.org/ns" dsv:version="2.02"/>"#
      .to_owned(),
  ]);

  let report = s.fetch_documents(&source, &Vec::new()).await.unwrap();
  assert_eq!(report.fetched, 2);
  assert_eq!(report.stored, 1);
  assert_eq!(report.failed, 1);
  assert_eq!(s.document_count().await.unwrap(), 1);

  let stored = s.document("XM-DAC-41114-Output 1").await.unwrap().unwrap();
  assert_eq!(stored.id, "xm-dac-41114-output-1");
  assert_eq!(stored.iati_version, v("2.02"));
}

// ─── Expression registry ─────────────────────────────────────────────────────

#[tokio::test]
async fn register_and_list_round_trip() {
  let s = store().await;

  let a = s.register_table(&transaction_def("2.03")).await.unwrap();
  let b = s
    .register_table(&XmlTableDef::narrative("/iati-activity", "title", v("2.03")))
    .await
    .unwrap();
  assert_ne!(a.table_id, b.table_id);

  let all = s.list_tables(None).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].def, transaction_def("2.03"));
  assert_eq!(all[1].def, XmlTableDef::narrative("/iati-activity", "title", v("2.03")));

  let filtered = s.list_tables(Some("/iati-activity/transaction")).await.unwrap();
  assert_eq!(filtered.len(), 1);
  assert_eq!(filtered[0].table_id, a.table_id);

  let fetched = s.get_table(b.table_id).await.unwrap().unwrap();
  assert_eq!(fetched.def, b.def);
  assert!(s.get_table(9999).await.unwrap().is_none());
}

// ─── Materializer ────────────────────────────────────────────────────────────

async fn seeded_store() -> SqliteStore {
  let s = store().await;
  s.upsert_document(NewDocument::new(
    "XM-DAC-41114-Output 1",
    sample_activity(),
    v("2.02"),
  ))
  .await
  .unwrap();
  s
}

#[tokio::test]
async fn transaction_projection_end_to_end() {
  let s = seeded_store().await;
  // A malformed document contributes no rows and poisons nothing.
  s.upsert_document(NewDocument::new("BAD-1", "<oops", v("2.02")))
    .await
    .unwrap();

  let def = transaction_def("2.02");
  s.materialize(&def).await.unwrap();
  assert!(s.projection_exists("iati_activity-transaction2-02").await.unwrap());

  let data = s.execute_with_columns(&def).await.unwrap();
  assert_eq!(data.rows.len(), 2);

  assert_eq!(cell(&data, 0, "aims_identifier"), &SqlValue::Text("xm-dac-41114-output-1".into()));
  assert_eq!(cell(&data, 0, "iati_identifier"), &SqlValue::Text("XM-DAC-41114-Output 1".into()));
  assert_eq!(cell(&data, 0, "iati_version"), &SqlValue::Text("2.02".into()));
  assert_eq!(cell(&data, 0, "ordinality"), &SqlValue::Integer(1));
  assert_eq!(cell(&data, 0, "ref"), &SqlValue::Text("T-1".into()));
  assert_eq!(cell(&data, 0, "value"), &SqlValue::Text("1000".into()));
  assert_eq!(cell(&data, 0, "value_currency"), &SqlValue::Text("USD".into()));
  assert_eq!(cell(&data, 0, "value_value_date"), &SqlValue::Text("2024-01-15".into()));
  assert_eq!(cell(&data, 0, "transaction_type_code"), &SqlValue::Text("3".into()));

  assert_eq!(cell(&data, 1, "ordinality"), &SqlValue::Integer(2));
  assert!(cell(&data, 1, "ref").is_null());
  assert_eq!(cell(&data, 1, "value_currency"), &SqlValue::Text("EUR".into()));
}

#[tokio::test]
async fn rematerialize_is_idempotent() {
  let s = seeded_store().await;
  let def = transaction_def("2.02");

  s.materialize(&def).await.unwrap();
  let before = s.execute_with_columns(&def).await.unwrap();
  s.materialize(&def).await.unwrap();
  let after = s.execute_with_columns(&def).await.unwrap();

  assert_eq!(before, after);
  assert_eq!(after.rows.len(), 2);
}

#[tokio::test]
async fn version_filter_excludes_other_documents() {
  let s = seeded_store().await;
  // Same projection shape, wrong version: no rows, but the table exists.
  let def = transaction_def("2.03");
  let data = s.execute_with_columns(&def).await.unwrap();
  assert!(data.rows.is_empty());
  assert!(data.column("value_currency").is_some());
}

#[tokio::test]
async fn read_materializes_on_demand() {
  let s = seeded_store().await;
  let def = transaction_def("2.02");
  let name = def.view_name();

  assert!(!s.projection_exists(&name).await.unwrap());
  let data = s.execute_with_columns(&def).await.unwrap();
  assert_eq!(data.rows.len(), 2);
  assert!(s.projection_exists(&name).await.unwrap());

  s.drop_projection(&def).await.unwrap();
  assert!(!s.projection_exists(&name).await.unwrap());
}

#[tokio::test]
async fn unbuildable_projection_fails_after_one_retry() {
  let s = seeded_store().await;
  // The row expression slugifies into SQLite's reserved `sqlite_` table
  // namespace, so CREATE TABLE fails every time.
  let def = XmlTableDef::iati("/sqlite_activity", v("2.02"), vec![
    ColumnDef::new("value", "value"),
  ]);

  let err = s.materialize(&def).await.unwrap_err();
  match err {
    crate::Error::Materialize { ref name, ref sql, .. } => {
      assert_eq!(name, &def.view_name());
      assert!(sql.contains("xml_rowset"));
    }
    other => panic!("expected Materialize, got {other}"),
  }

  // The read path retries exactly once and then surfaces the missing
  // relation instead of looping.
  let err = s.execute_with_columns(&def).await.unwrap_err();
  assert!(err.is_missing_relation());
  assert!(!s.projection_exists(&def.view_name()).await.unwrap());
}

#[tokio::test]
async fn materialize_all_continues_past_failures() {
  let s = seeded_store().await;
  s.register_table(&transaction_def("2.02")).await.unwrap();
  // Reserved `sqlite_` view name: this one can never materialize.
  s.register_table(&XmlTableDef::iati("/sqlite_activity", v("2.02"), vec![
    ColumnDef::new("value", "value"),
  ]))
  .await
  .unwrap();

  let report = s.materialize_all().await.unwrap();
  assert_eq!(report.created, vec!["iati_activity-transaction2-02".to_owned()]);
  assert_eq!(report.failed, vec!["sqlite_activity2-02".to_owned()]);
}

// ─── Narratives ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn narrative_language_falls_back_to_activity_language() {
  let s = seeded_store().await;
  let def = XmlTableDef::narrative("/iati-activity", "title", v("2.02"));

  let data = s.execute_with_columns(&def).await.unwrap();
  // All narrative descendants of the activity: two titles, one description.
  assert_eq!(data.rows.len(), 3);

  let text_idx = data.column("text").unwrap();
  let lang_idx = data.column("lang").unwrap();
  let lang_of = |text: &str| {
    data
      .rows
      .iter()
      .find(|row| row[text_idx].as_str() == Some(text))
      .unwrap_or_else(|| panic!("no narrative {text:?}"))[lang_idx]
      .clone()
  };

  // Locally declared language wins; undeclared inherits the activity's.
  assert_eq!(lang_of("Output one"), SqlValue::Text("en".into()));
  assert_eq!(lang_of("Produit un"), SqlValue::Text("fr".into()));
  assert_eq!(lang_of("Support costs"), SqlValue::Text("fr".into()));
}

#[tokio::test]
async fn nested_narratives_do_not_inherit_language() {
  let s = seeded_store().await;
  let def = XmlTableDef::narrative("/iati-activity/transaction", "description", v("2.02"));

  let data = s.execute_with_columns(&def).await.unwrap();
  // Only the first transaction carries a narrative.
  assert_eq!(data.rows.len(), 1);
  assert_eq!(cell(&data, 0, "text"), &SqlValue::Text("Support costs".into()));
  assert_eq!(cell(&data, 0, "ordinality"), &SqlValue::Integer(1));
  assert!(cell(&data, 0, "lang").is_null());
}

// ─── Version reconciliation ──────────────────────────────────────────────────

#[tokio::test]
async fn versions_index_aggregates_registered_columns() {
  let s = store().await;
  s.register_table(&XmlTableDef::iati("/iati-activity/transaction", v("2.02"), vec![
    ColumnDef::new("value", "value"),
    ColumnDef::new("value/@currency", "value_currency"),
  ]))
  .await
  .unwrap();
  s.register_table(&XmlTableDef::iati("/iati-activity/transaction", v("2.03"), vec![
    ColumnDef::new("value", "value"),
    ColumnDef::new("value/@currency", "value_currency"),
    ColumnDef::new("fss/@extraction-date", "fss_extraction_date"),
  ]))
  .await
  .unwrap();
  // Unrelated row expression, must not leak in.
  s.register_table(&XmlTableDef::iati("/iati-activity/budget", v("2.03"), vec![
    ColumnDef::new("period-start/@iso-date", "period_start"),
  ]))
  .await
  .unwrap();

  let index = s.versions_for("/iati-activity/transaction").await.unwrap();
  assert_eq!(index.versions("value").unwrap().len(), 2);
  assert_eq!(index.versions("fss_extraction_date").unwrap().len(), 1);
  assert!(index.versions("period_start").is_none());

  let required: BTreeSet<Version> = [v("2.02"), v("2.03")].into_iter().collect();
  assert_eq!(index.common_columns(&required, &[]), vec!["value", "value_currency"]);
  let latest: BTreeSet<Version> = [v("2.03")].into_iter().collect();
  assert_eq!(
    index.common_columns(&latest, &["fss", "crs"]),
    vec!["value", "value_currency"]
  );
}

// ─── Codelists ───────────────────────────────────────────────────────────────

struct FlakyCodelists;

impl CodelistSource for FlakyCodelists {
  type Error = std::io::Error;

  async fn codelist(&self, name: &str, version: Version) -> Result<Option<String>, Self::Error> {
    match version.to_string().as_str() {
      "2.03" => Ok(Some(format!("<codelist name={name:?}/>"))),
      "2.02" => Err(std::io::Error::other("datastore timeout")),
      _ => Ok(None),
    }
  }

  async fn codelist_mapping(&self, version: Version) -> Result<Option<String>, Self::Error> {
    match version.to_string().as_str() {
      "2.03" => Ok(Some("<mappings/>".to_owned())),
      "2.02" => Ok(None),
      _ => Err(std::io::Error::other("datastore timeout")),
    }
  }
}

#[tokio::test]
async fn codelist_refresh_sweep_always_completes() {
  let s = store().await;
  let cfg = VersionConfig::default();

  let report = s
    .refresh_codelists(&FlakyCodelists, &["Currency"], &cfg)
    .await
    .unwrap();
  // Per version (2.01, 2.02, 2.03): one mapping fetch and one codelist fetch.
  assert_eq!(report.stored, 2);
  assert_eq!(report.missing, 2);
  assert_eq!(report.failed, 2);

  assert!(s.codelist("Currency", v("2.03")).await.unwrap().is_some());
  assert!(s.codelist("Currency", v("2.01")).await.unwrap().is_none());
  assert!(s.codelist_mapping(v("2.03")).await.unwrap().is_some());
  assert!(s.codelist_mapping(v("2.02")).await.unwrap().is_none());
}
