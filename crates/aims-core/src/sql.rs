//! A small SQL fragment builder.
//!
//! The projection engine never splices caller strings into SQL directly.
//! Row and column expressions enter generated queries only as quoted string
//! literals, and every identifier is double-quoted, so an expression like
//! `value/@currency` can never escape its lexical position. Rendering is
//! pure template substitution: identical trees always render to identical
//! text.

use std::fmt::Write as _;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
  format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_str(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Eq,
  Add,
  Concat,
}

impl BinOp {
  fn token(self) -> &'static str {
    match self {
      BinOp::Eq => "=",
      BinOp::Add => "+",
      BinOp::Concat => "||",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// `"table"."column"`, or a bare `"column"` when `table` is `None`.
  Col {
    table:  Option<String>,
    column: String,
  },
  /// A single-quoted string literal.
  Str(String),
  /// An integer literal.
  Num(i64),
  Null,
  /// A function call; the name is rendered verbatim and must come from a
  /// fixed set known to the generator, never from caller input.
  Func { name: &'static str, args: Vec<Expr> },
  Bin {
    op:  BinOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Cast { expr: Box<Expr>, ty: &'static str },
  /// `ROW_NUMBER() OVER (PARTITION BY … ORDER BY …)`.
  RowNumber {
    partition_by: Vec<Expr>,
    order_by:     Vec<Expr>,
  },
}

impl Expr {
  pub fn col(table: &str, column: &str) -> Self {
    Expr::Col { table: Some(table.to_owned()), column: column.to_owned() }
  }

  pub fn bare(column: &str) -> Self {
    Expr::Col { table: None, column: column.to_owned() }
  }

  pub fn str_lit(value: impl Into<String>) -> Self {
    Expr::Str(value.into())
  }

  pub fn func(name: &'static str, args: Vec<Expr>) -> Self {
    Expr::Func { name, args }
  }

  pub fn eq(lhs: Expr, rhs: Expr) -> Self {
    Expr::Bin { op: BinOp::Eq, lhs: Box::new(lhs), rhs: Box::new(rhs) }
  }

  pub fn add(lhs: Expr, rhs: Expr) -> Self {
    Expr::Bin { op: BinOp::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) }
  }

  pub fn concat(lhs: Expr, rhs: Expr) -> Self {
    Expr::Bin { op: BinOp::Concat, lhs: Box::new(lhs), rhs: Box::new(rhs) }
  }

  pub fn coalesce(args: Vec<Expr>) -> Self {
    Expr::func("COALESCE", args)
  }

  pub fn trim(arg: Expr) -> Self {
    Expr::func("TRIM", vec![arg])
  }

  pub fn cast_text(expr: Expr) -> Self {
    Expr::Cast { expr: Box::new(expr), ty: "TEXT" }
  }

  /// Alias this expression, producing a select-list item.
  pub fn alias(self, alias: &str) -> SelectItem {
    SelectItem { expr: self, alias: Some(alias.to_owned()) }
  }

  /// Use this expression unaliased in a select list.
  pub fn item(self) -> SelectItem {
    SelectItem { expr: self, alias: None }
  }

  fn render(&self, out: &mut String) {
    match self {
      Expr::Col { table, column } => {
        if let Some(table) = table {
          out.push_str(&quote_ident(table));
          out.push('.');
        }
        out.push_str(&quote_ident(column));
      }
      Expr::Str(value) => out.push_str(&quote_str(value)),
      Expr::Num(n) => {
        let _ = write!(out, "{n}");
      }
      Expr::Null => out.push_str("NULL"),
      Expr::Func { name, args } => {
        out.push_str(name);
        out.push('(');
        render_list(args, out);
        out.push(')');
      }
      Expr::Bin { op, lhs, rhs } => {
        out.push('(');
        lhs.render(out);
        out.push(' ');
        out.push_str(op.token());
        out.push(' ');
        rhs.render(out);
        out.push(')');
      }
      Expr::Cast { expr, ty } => {
        out.push_str("CAST(");
        expr.render(out);
        out.push_str(" AS ");
        out.push_str(ty);
        out.push(')');
      }
      Expr::RowNumber { partition_by, order_by } => {
        out.push_str("ROW_NUMBER() OVER (");
        if !partition_by.is_empty() {
          out.push_str("PARTITION BY ");
          render_list(partition_by, out);
        }
        if !order_by.is_empty() {
          if !partition_by.is_empty() {
            out.push(' ');
          }
          out.push_str("ORDER BY ");
          render_list(order_by, out);
        }
        out.push(')');
      }
    }
  }
}

fn render_list(exprs: &[Expr], out: &mut String) {
  for (i, expr) in exprs.iter().enumerate() {
    if i > 0 {
      out.push_str(", ");
    }
    expr.render(out);
  }
}

// ─── Select ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
  pub expr:  Expr,
  pub alias: Option<String>,
}

impl SelectItem {
  fn render(&self, out: &mut String) {
    self.expr.render(out);
    if let Some(alias) = &self.alias {
      out.push_str(" AS ");
      out.push_str(&quote_ident(alias));
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
  Table { name: String, alias: String },
  /// A table-valued function call, e.g. `json_each(…) AS "r"`. SQLite lets
  /// its arguments reference columns of earlier items in the same FROM list.
  Function { call: Expr, alias: String },
  Derived { query: Box<Query>, alias: String },
}

impl FromItem {
  pub fn table(name: &str, alias: &str) -> Self {
    FromItem::Table { name: name.to_owned(), alias: alias.to_owned() }
  }

  pub fn function(call: Expr, alias: &str) -> Self {
    FromItem::Function { call, alias: alias.to_owned() }
  }

  pub fn derived(query: Query, alias: &str) -> Self {
    FromItem::Derived { query: Box::new(query), alias: alias.to_owned() }
  }

  fn render(&self, out: &mut String) {
    match self {
      FromItem::Table { name, alias } => {
        out.push_str(&quote_ident(name));
        out.push_str(" AS ");
        out.push_str(&quote_ident(alias));
      }
      FromItem::Function { call, alias } => {
        call.render(out);
        out.push_str(" AS ");
        out.push_str(&quote_ident(alias));
      }
      FromItem::Derived { query, alias } => {
        out.push('(');
        out.push_str(&query.sql());
        out.push_str(") AS ");
        out.push_str(&quote_ident(alias));
      }
    }
  }
}

/// A single SELECT. `from` items are joined with commas; `where_clause`
/// predicates are ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
  pub items:        Vec<SelectItem>,
  pub from:         Vec<FromItem>,
  pub where_clause: Vec<Expr>,
}

impl Select {
  pub fn sql(&self) -> String {
    let mut out = String::new();
    out.push_str("SELECT ");
    for (i, item) in self.items.iter().enumerate() {
      if i > 0 {
        out.push_str(", ");
      }
      item.render(&mut out);
    }
    if !self.from.is_empty() {
      out.push_str(" FROM ");
      for (i, from) in self.from.iter().enumerate() {
        if i > 0 {
          out.push_str(", ");
        }
        from.render(&mut out);
      }
    }
    if !self.where_clause.is_empty() {
      out.push_str(" WHERE ");
      for (i, pred) in self.where_clause.iter().enumerate() {
        if i > 0 {
          out.push_str(" AND ");
        }
        pred.render(&mut out);
      }
    }
    out
  }
}

/// A SELECT or a UNION of SELECTs (plain UNION, as the aggregations use).
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
  Select(Select),
  Union(Vec<Select>),
}

impl Query {
  pub fn sql(&self) -> String {
    match self {
      Query::Select(select) => select.sql(),
      Query::Union(members) => members
        .iter()
        .map(Select::sql)
        .collect::<Vec<_>>()
        .join(" UNION "),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quoting_escapes_embedded_quotes() {
    assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    assert_eq!(quote_str("it's"), "'it''s'");
  }

  #[test]
  fn renders_a_basic_select() {
    let select = Select {
      items:        vec![
        Expr::col("d", "iati_identifier").alias("iati_identifier"),
        Expr::add(Expr::col("r", "key"), Expr::Num(1)).alias("ordinality"),
      ],
      from:         vec![FromItem::table("iati_activities", "d")],
      where_clause: vec![Expr::eq(
        Expr::col("d", "iati_version"),
        Expr::str_lit("2.03"),
      )],
    };
    assert_eq!(
      select.sql(),
      "SELECT \"d\".\"iati_identifier\" AS \"iati_identifier\", \
       (\"r\".\"key\" + 1) AS \"ordinality\" \
       FROM \"iati_activities\" AS \"d\" \
       WHERE (\"d\".\"iati_version\" = '2.03')"
    );
  }

  #[test]
  fn renders_function_from_items_and_literals() {
    let select = Select {
      items:        vec![Expr::col("r", "value").item()],
      from:         vec![FromItem::function(
        Expr::func("json_each", vec![Expr::func(
          "xml_rowset",
          vec![Expr::col("d", "content"), Expr::str_lit("/a/b'c")],
        )]),
        "r",
      )],
      where_clause: vec![],
    };
    assert_eq!(
      select.sql(),
      "SELECT \"r\".\"value\" FROM \
       json_each(xml_rowset(\"d\".\"content\", '/a/b''c')) AS \"r\""
    );
  }

  #[test]
  fn union_joins_members() {
    let one = Select {
      items: vec![Expr::bare("x").item()],
      from: vec![FromItem::table("t1", "t1")],
      where_clause: vec![],
    };
    let two = Select {
      items: vec![Expr::bare("x").item()],
      from: vec![FromItem::table("t2", "t2")],
      where_clause: vec![],
    };
    let sql = Query::Union(vec![one, two]).sql();
    assert_eq!(sql.matches(" UNION ").count(), 1);
  }

  #[test]
  fn row_number_window() {
    let mut out = String::new();
    let expr = Expr::RowNumber {
      partition_by: vec![Expr::bare("iati_identifier")],
      order_by:     vec![Expr::bare("ordinality")],
    };
    expr.render(&mut out);
    assert_eq!(
      out,
      "ROW_NUMBER() OVER (PARTITION BY \"iati_identifier\" ORDER BY \"ordinality\")"
    );
  }
}
