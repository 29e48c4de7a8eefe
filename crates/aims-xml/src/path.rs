//! Row and column path evaluation.
//!
//! Row expressions select repeating elements and come in two forms:
//! absolute paths (`/iati-activity/transaction`, matched from the document
//! root) and descendant searches (`//narrative` or `.//narrative`, matched
//! anywhere at or below the context node).
//!
//! Matches are reported as locators: `/`-separated child-element indexes
//! from the document root, the root itself being the empty string (e.g.
//! `/2/0` is the first element child of the root's third element child).
//! Column expressions are then evaluated relative to a locator, which keeps
//! ancestor steps (`..`) available — the context Postgres `xmltable` keeps
//! implicitly.
//!
//! Column expression grammar, per `/`-separated step: `.` (self), `..`
//! (parent), `@name` (attribute, final step only), `name` (first matching
//! child element). A final element step yields the element's text.

use crate::{
  dom::Element,
  error::{Error, Result},
};

// ─── Locators ────────────────────────────────────────────────────────────────

fn locator_indexes(locator: &str) -> Result<Vec<usize>> {
  locator
    .split('/')
    .filter(|s| !s.is_empty())
    .map(|s| {
      s.parse()
        .map_err(|_| Error::InvalidLocator(locator.to_owned()))
    })
    .collect()
}

/// Resolve a locator to its element, if the path exists in this document.
pub fn resolve<'a>(root: &'a Element, locator: &str) -> Result<Option<&'a Element>> {
  let mut current = root;
  for index in locator_indexes(locator)? {
    match current.children.get(index) {
      Some(child) => current = child,
      None => return Ok(None),
    }
  }
  Ok(Some(current))
}

/// The chain of elements from the root to the located node, inclusive.
fn resolve_chain<'a>(root: &'a Element, locator: &str) -> Result<Option<Vec<&'a Element>>> {
  let mut chain = vec![root];
  for index in locator_indexes(locator)? {
    let Some(child) = chain[chain.len() - 1].children.get(index) else {
      return Ok(None);
    };
    chain.push(child);
  }
  Ok(Some(chain))
}

// ─── Row expressions ─────────────────────────────────────────────────────────

enum RowExpr<'a> {
  /// `/a/b/c` — matched from the document root; the first segment must be
  /// the root element's name.
  Absolute(Vec<&'a str>),
  /// `//name` or `.//name` — any descendant-or-self element with the name.
  Descendant(&'a str),
}

fn parse_row_expr(expr: &str) -> Result<RowExpr<'_>> {
  let invalid = || Error::InvalidExpression(expr.to_owned());

  if let Some(name) = expr.strip_prefix(".//").or_else(|| expr.strip_prefix("//")) {
    if name.is_empty() || name.contains('/') || name.starts_with('@') {
      return Err(invalid());
    }
    return Ok(RowExpr::Descendant(name));
  }

  let Some(rest) = expr.strip_prefix('/') else {
    return Err(invalid());
  };
  let segments: Vec<&str> = rest.split('/').collect();
  if segments.iter().any(|s| s.is_empty() || s.starts_with('@') || *s == "." || *s == "..") {
    return Err(invalid());
  }
  Ok(RowExpr::Absolute(segments))
}

/// Locators of all elements matched by `expr`, in document order, relative
/// to the document root.
pub fn row_locators(root: &Element, expr: &str) -> Result<Vec<String>> {
  row_locators_at(root, "", expr)
}

/// Locators of all elements matched by `expr` at or below the node
/// addressed by `base`. Returned locators are absolute (rooted at the
/// document root), so they remain valid `xml_path` context arguments.
pub fn row_locators_at(root: &Element, base: &str, expr: &str) -> Result<Vec<String>> {
  let Some(context) = resolve(root, base)? else {
    return Ok(Vec::new());
  };

  let mut out = Vec::new();
  match parse_row_expr(expr)? {
    RowExpr::Descendant(name) => {
      collect_descendants(context, base, name, &mut out);
    }
    RowExpr::Absolute(segments) => {
      // Absolute expressions are anchored at the context node: its name
      // must match the first segment.
      if context.name == segments[0] {
        collect_path(context, base, &segments[1..], &mut out);
      }
    }
  }
  Ok(out)
}

fn collect_descendants(element: &Element, locator: &str, name: &str, out: &mut Vec<String>) {
  if element.name == name {
    out.push(locator.to_owned());
  }
  for (index, child) in element.children.iter().enumerate() {
    collect_descendants(child, &format!("{locator}/{index}"), name, out);
  }
}

fn collect_path(element: &Element, locator: &str, segments: &[&str], out: &mut Vec<String>) {
  let Some((next, rest)) = segments.split_first() else {
    out.push(locator.to_owned());
    return;
  };
  for (index, child) in element.children.iter().enumerate() {
    if child.name == *next {
      collect_path(child, &format!("{locator}/{index}"), rest, out);
    }
  }
}

// ─── Column expressions ──────────────────────────────────────────────────────

/// Evaluate a column expression against the node addressed by `locator`.
///
/// Returns `Ok(None)` when any step fails to match (absent child, absent
/// attribute, parent step above the root) — the relational NULL. Errors are
/// reserved for unparseable inputs.
pub fn eval_column(root: &Element, locator: &str, expr: &str) -> Result<Option<String>> {
  let Some(mut chain) = resolve_chain(root, locator)? else {
    return Ok(None);
  };

  let mut steps = expr
    .split('/')
    .filter(|s| !s.is_empty() && *s != ".")
    .peekable();

  while let Some(step) = steps.next() {
    if step == ".." {
      chain.pop();
      if chain.is_empty() {
        return Ok(None);
      }
    } else if let Some(attr) = step.strip_prefix('@') {
      if steps.peek().is_some() {
        return Err(Error::InvalidExpression(expr.to_owned()));
      }
      return Ok(chain[chain.len() - 1].attr(attr).map(str::to_owned));
    } else {
      match chain[chain.len() - 1].child(step) {
        Some(child) => chain.push(child),
        None => return Ok(None),
      }
    }
  }

  Ok(Some(chain[chain.len() - 1].text()))
}
