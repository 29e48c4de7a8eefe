//! Registered SQL functions backing the generated projection queries.
//!
//! The original deployment installed a `slugify` function and relied on the
//! engine's built-in XML row-set capability; here both sides are supplied
//! as deterministic scalar functions on the connection:
//!
//! - `slugify(text)` — same transform as [`aims_core::slugify`].
//! - `xml_rowset(doc, row_expr)` and `xml_rowset(doc, base, row_expr)` —
//!   JSON array of node locators, exploded into rows by the built-in
//!   `json_each` (its `key + 1` is the row ordinality).
//! - `xml_path(doc, locator, col_expr)` — a column expression evaluated at
//!   the located node; SQL NULL when absent.
//!
//! Malformed documents or expressions yield an empty row set / NULL with a
//! warning instead of failing the whole statement, so one bad document
//! cannot poison a materialization sweep.

use rusqlite::functions::{Context, FunctionFlags};

use crate::error::Result as StoreResult;

pub fn register(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

  conn.create_scalar_function("slugify", 1, flags, |ctx| {
    let value: String = ctx.get(0)?;
    Ok(aims_core::slugify(&value))
  })?;

  conn.create_scalar_function("xml_rowset", 2, flags, |ctx| {
    let doc: String = ctx.get(0)?;
    let expr: String = ctx.get(1)?;
    Ok(rowset(&doc, "", &expr))
  })?;

  conn.create_scalar_function("xml_rowset", 3, flags, |ctx| {
    let doc: String = ctx.get(0)?;
    let base: String = ctx.get(1)?;
    let expr: String = ctx.get(2)?;
    Ok(rowset(&doc, &base, &expr))
  })?;

  conn.create_scalar_function("xml_path", 3, flags, xml_path)?;

  Ok(())
}

// TODO: cache the parsed document across calls within a statement; every
// xml_path call currently re-parses the row's XML.
fn rowset(doc: &str, base: &str, expr: &str) -> String {
  let locators = match parse_and_locate(doc, base, expr) {
    Ok(locators) => locators,
    Err(error) => {
      tracing::warn!(%error, expr, "xml_rowset: skipping document");
      Vec::new()
    }
  };
  serde_json::to_string(&locators).unwrap_or_else(|_| "[]".to_owned())
}

fn parse_and_locate(doc: &str, base: &str, expr: &str) -> StoreResult<Vec<String>> {
  let root = aims_xml::parse(doc)?;
  Ok(aims_xml::row_locators_at(&root, base, expr)?)
}

fn xml_path(ctx: &Context<'_>) -> rusqlite::Result<Option<String>> {
  let doc: String = ctx.get(0)?;
  let locator: String = ctx.get(1)?;
  let expr: String = ctx.get(2)?;

  let root = match aims_xml::parse(&doc) {
    Ok(root) => root,
    Err(error) => {
      tracing::warn!(%error, "xml_path: unparseable document");
      return Ok(None);
    }
  };
  match aims_xml::eval_column(&root, &locator, &expr) {
    Ok(value) => Ok(value),
    Err(error) => {
      tracing::warn!(%error, expr, "xml_path: bad expression");
      Ok(None)
    }
  }
}
