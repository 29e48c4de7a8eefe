//! Versioned XML table declarations and the SQL generator.
//!
//! A table declaration describes how repeating elements of stored activity
//! documents are flattened into rows and columns. Three shapes exist:
//!
//! - [`GenericTable`] — a bare row-set extraction over a caller-supplied
//!   document expression; no document-store join, no version restriction.
//! - [`XmlTableDef::Iati`] — wraps a `GenericTable`, joining the document
//!   store, adding the identifier/version columns and the version filter.
//!   Composition, not inheritance: the wrapper delegates to the generic
//!   table for the row-set machinery and augments the result.
//! - [`XmlTableDef::Narrative`] — the two-stage extraction for `narrative`
//!   sub-elements, including language inheritance from an ancestor
//!   `xml:lang` attribute.
//!
//! Generation is pure: the same declaration always renders byte-identical
//! SQL. Execution is the storage layer's concern.

use serde::{Deserialize, Serialize};

use crate::{
  slug::slugify,
  sql::{Expr, FromItem, Select},
  version::Version,
};

// Aliases used inside generated queries.
const DOC: &str = "d";
const ROWSET: &str = "r";
const NARRATIVE: &str = "n";
const PARENT: &str = "parent";

// ─── Document table description ──────────────────────────────────────────────

/// Where the Document Store lives and what its columns are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTable {
  pub name:              String,
  pub identifier_column: String,
  pub version_column:    String,
  pub content_column:    String,
}

impl Default for DocumentTable {
  fn default() -> Self {
    Self {
      name:              "iati_activities".to_owned(),
      identifier_column: "iati_identifier".to_owned(),
      version_column:    "iati_version".to_owned(),
      content_column:    "content".to_owned(),
    }
  }
}

// ─── Declarations ────────────────────────────────────────────────────────────

/// A column expression scoped to a row expression, and the name of the
/// generated output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
  pub expression: String,
  pub name:       String,
}

impl ColumnDef {
  pub fn new(expression: &str, name: &str) -> Self {
    Self { expression: expression.to_owned(), name: name.to_owned() }
  }
}

/// A bare row-set extraction: one output row per element matched by the row
/// expression, one output column per [`ColumnDef`], plus an ordinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericTable {
  pub row_expression: String,
  pub columns:        Vec<ColumnDef>,
}

impl GenericTable {
  pub fn new(row_expression: &str, columns: Vec<ColumnDef>) -> Self {
    Self { row_expression: row_expression.to_owned(), columns }
  }

  /// The FROM fragment producing one row per matched element: the
  /// `xml_rowset` locator array exploded by `json_each`.
  fn from_item(&self, doc: Expr, alias: &str) -> FromItem {
    FromItem::function(
      Expr::func("json_each", vec![Expr::func("xml_rowset", vec![
        doc,
        Expr::str_lit(self.row_expression.clone()),
      ])]),
      alias,
    )
  }

  /// Select-list items for the ordinality and the declared columns, with
  /// column values fetched by `xml_path` against the row's node locator.
  fn select_items(&self, doc: &Expr, alias: &str) -> Vec<crate::sql::SelectItem> {
    let mut items = vec![
      Expr::add(Expr::col(alias, "key"), Expr::Num(1)).alias("ordinality"),
    ];
    for column in &self.columns {
      items.push(
        Expr::func("xml_path", vec![
          doc.clone(),
          Expr::col(alias, "value"),
          Expr::str_lit(column.expression.clone()),
        ])
        .alias(&column.name),
      );
    }
    items
  }

  /// A standalone SELECT over an arbitrary document expression.
  pub fn select(&self, doc: Expr) -> Select {
    Select {
      items:        self.select_items(&doc, ROWSET),
      from:         vec![self.from_item(doc, ROWSET)],
      where_clause: vec![],
    }
  }

  pub fn sql(&self, doc: Expr) -> String {
    self.select(doc).sql()
  }
}

/// Discriminator for stored table declarations.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
  Iati,
  Narrative,
}

/// A versioned table declaration — the unit the Materializer builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmlTableDef {
  /// An IATI table: a [`GenericTable`] joined to the document store and
  /// restricted to one schema version.
  Iati {
    table:   GenericTable,
    version: Version,
  },
  /// A narrative table: rows are `narrative` children of the elements the
  /// row expression matches, with text, language (locally declared or
  /// inherited), and the parent's `ref`/`type` attributes.
  Narrative {
    row_expression: String,
    narrative_type: String,
    version:        Version,
  },
}

impl XmlTableDef {
  pub fn iati(row_expression: &str, version: Version, columns: Vec<ColumnDef>) -> Self {
    XmlTableDef::Iati { table: GenericTable::new(row_expression, columns), version }
  }

  pub fn narrative(row_expression: &str, narrative_type: &str, version: Version) -> Self {
    XmlTableDef::Narrative {
      row_expression: row_expression.to_owned(),
      narrative_type: narrative_type.to_owned(),
      version,
    }
  }

  pub fn row_expression(&self) -> &str {
    match self {
      XmlTableDef::Iati { table, .. } => &table.row_expression,
      XmlTableDef::Narrative { row_expression, .. } => row_expression,
    }
  }

  pub fn version(&self) -> Version {
    match self {
      XmlTableDef::Iati { version, .. } | XmlTableDef::Narrative { version, .. } => *version,
    }
  }

  pub fn kind(&self) -> TableKind {
    match self {
      XmlTableDef::Iati { .. } => TableKind::Iati,
      XmlTableDef::Narrative { .. } => TableKind::Narrative,
    }
  }

  pub fn columns(&self) -> &[ColumnDef] {
    match self {
      XmlTableDef::Iati { table, .. } => &table.columns,
      XmlTableDef::Narrative { .. } => &[],
    }
  }

  /// The deterministic materialized view name:
  /// `slugify((row_expression + version) with '-' → '_')`.
  ///
  /// Pre-converting hyphens keeps the row expression's own word boundaries
  /// (`iati_activity`) distinct from the path separators, which slugify to
  /// hyphens, so distinct expressions cannot collide.
  pub fn view_name(&self) -> String {
    let joined = format!("{}{}", self.row_expression(), self.version());
    slugify(&joined.replace('-', "_"))
  }

  /// Build the defining query against `docs`.
  pub fn select(&self, docs: &DocumentTable) -> Select {
    match self {
      XmlTableDef::Iati { table, version } => iati_select(table, *version, docs),
      XmlTableDef::Narrative { row_expression, version, .. } => {
        narrative_select(row_expression, *version, docs)
      }
    }
  }

  /// Render the defining query to SQL text. Deterministic.
  pub fn sql(&self, docs: &DocumentTable) -> String {
    self.select(docs).sql()
  }
}

/// The spec-level generator entry point: one call, one SQL string.
pub fn generate(
  row_expression: &str,
  columns: &[ColumnDef],
  docs: &DocumentTable,
  version: Version,
  narrative: bool,
) -> String {
  let def = if narrative {
    XmlTableDef::narrative(row_expression, "", version)
  } else {
    XmlTableDef::iati(row_expression, version, columns.to_vec())
  };
  def.sql(docs)
}

// ─── Generation internals ────────────────────────────────────────────────────

/// Identifier select-items shared by both table shapes. Identifiers are
/// trimmed before any use: source documents have been observed with
/// whitespace-padded `iati-identifier` elements, and joins must not care.
fn identifier_items(docs: &DocumentTable) -> Vec<crate::sql::SelectItem> {
  let identifier = Expr::trim(Expr::col(DOC, &docs.identifier_column));
  vec![
    Expr::func("slugify", vec![identifier.clone()]).alias("aims_identifier"),
    identifier.alias(&docs.identifier_column),
    Expr::col(DOC, &docs.version_column).alias(&docs.version_column),
  ]
}

fn version_filter(docs: &DocumentTable, alias: &str, version: Version) -> Expr {
  Expr::eq(
    Expr::col(alias, &docs.version_column),
    Expr::str_lit(version.to_string()),
  )
}

fn iati_select(table: &GenericTable, version: Version, docs: &DocumentTable) -> Select {
  let doc = Expr::col(DOC, &docs.content_column);

  let mut items = identifier_items(docs);
  items.extend(table.select_items(&doc, ROWSET));

  Select {
    items,
    from: vec![
      FromItem::table(&docs.name, DOC),
      table.from_item(doc, ROWSET),
    ],
    where_clause: vec![version_filter(docs, DOC, version)],
  }
}

/// Number of `../` hops from the row element to the activity element's
/// `xml:lang`, or `None` when language inheritance is disabled.
///
/// Inheritance only applies when the row expression's final segment is the
/// activity element itself; narrative rows selected deeper in the tree get
/// a literal NULL placeholder and no ancestor walk.
pub fn language_hops(row_expression: &str) -> Option<usize> {
  let segments: Vec<&str> = row_expression.split('/').collect();
  if segments.last().copied() == Some("iati-activity") {
    Some(segments.len().saturating_sub(2))
  } else {
    None
  }
}

fn narrative_select(row_expression: &str, version: Version, docs: &DocumentTable) -> Select {
  let doc = Expr::col(DOC, &docs.content_column);

  let activity_lang = match language_hops(row_expression) {
    Some(hops) => Expr::func("xml_path", vec![
      doc.clone(),
      Expr::col(ROWSET, "value"),
      Expr::str_lit(format!("{}@xml:lang", "../".repeat(hops))),
    ]),
    None => Expr::Null,
  };

  let parent_col = |expr: &str, name: &str| {
    Expr::func("xml_path", vec![
      doc.clone(),
      Expr::col(ROWSET, "value"),
      Expr::str_lit(expr),
    ])
    .alias(name)
  };

  // Stage one: one row per element matched by the row expression, carrying
  // the full document and the node locator so the narrative extraction and
  // any ancestor lookups keep their context.
  let mut inner_items = identifier_items(docs);
  inner_items.extend([
    Expr::add(Expr::col(ROWSET, "key"), Expr::Num(1)).alias("ordinality"),
    doc.clone().alias("content"),
    Expr::col(ROWSET, "value").alias("node"),
    activity_lang.alias("activity_lang"),
    parent_col("../@ref", "ref"),
    parent_col("../@type", "type"),
  ]);

  let inner = Select {
    items:        inner_items,
    from:         vec![
      FromItem::table(&docs.name, DOC),
      FromItem::function(
        Expr::func("json_each", vec![Expr::func("xml_rowset", vec![
          doc,
          Expr::str_lit(row_expression),
        ])]),
        ROWSET,
      ),
    ],
    where_clause: vec![],
  };

  // Stage two: explode `narrative` descendants of each matched element into
  // (text, lang) pairs, falling back to the inherited language.
  let narrative_path = |expr: &str| {
    Expr::func("xml_path", vec![
      Expr::col(PARENT, "content"),
      Expr::col(NARRATIVE, "value"),
      Expr::str_lit(expr),
    ])
  };

  Select {
    items:        vec![
      Expr::col(PARENT, "aims_identifier").item(),
      Expr::col(PARENT, &docs.identifier_column).item(),
      Expr::col(PARENT, &docs.version_column).item(),
      Expr::col(PARENT, "ordinality").item(),
      narrative_path(".").alias("text"),
      Expr::coalesce(vec![
        narrative_path("@xml:lang"),
        Expr::col(PARENT, "activity_lang"),
      ])
      .alias("lang"),
      Expr::col(PARENT, "ref").item(),
      Expr::col(PARENT, "type").item(),
    ],
    from:         vec![
      FromItem::derived(crate::sql::Query::Select(inner), PARENT),
      FromItem::function(
        Expr::func("json_each", vec![Expr::func("xml_rowset", vec![
          Expr::col(PARENT, "content"),
          Expr::col(PARENT, "node"),
          Expr::str_lit(".//narrative"),
        ])]),
        NARRATIVE,
      ),
    ],
    where_clause: vec![version_filter(docs, PARENT, version)],
  }
}
