//! A minimal element tree built from `quick-xml` events.
//!
//! Only what path evaluation needs: element names as written (prefixes
//! kept), attributes in document order, child elements, and text content.
//! Comments and processing instructions are dropped.

use quick_xml::{Reader, events::Event};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
  /// Qualified name as written in the source, e.g. `transaction` or
  /// `dsns:version`-style prefixed names.
  pub name:     String,
  /// Attributes in document order, keys as written.
  pub attrs:    Vec<(String, String)>,
  /// Child elements in document order. Text is not interleaved; see
  /// [`Element::text`].
  pub children: Vec<Element>,
  /// Direct text content, concatenated.
  pub direct_text: String,
}

impl Element {
  fn new(name: String, attrs: Vec<(String, String)>) -> Self {
    Self { name, attrs, children: Vec::new(), direct_text: String::new() }
  }

  /// Attribute value by exact qualified name.
  pub fn attr(&self, name: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  /// Attribute value by local name, ignoring any namespace prefix. Used for
  /// the datastore's namespaced `version` attribute, whose prefix is
  /// whatever the upstream serializer chose.
  pub fn attr_local(&self, local: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| k.rsplit(':').next() == Some(local))
      .map(|(_, v)| v.as_str())
  }

  /// First child element with the given name.
  pub fn child(&self, name: &str) -> Option<&Element> {
    self.children.iter().find(|c| c.name == name)
  }

  /// Text content: this element's direct text followed by its descendants',
  /// in tree order.
  pub fn text(&self) -> String {
    let mut out = String::new();
    self.collect_text(&mut out);
    out
  }

  fn collect_text(&self, out: &mut String) {
    out.push_str(&self.direct_text);
    for child in &self.children {
      child.collect_text(out);
    }
  }
}

/// Parse a well-formed XML document (or fragment with a single root
/// element) into an [`Element`] tree.
pub fn parse(xml: &str) -> Result<Element> {
  let mut reader = Reader::from_str(xml);
  reader.config_mut().trim_text(true);

  let mut stack: Vec<Element> = Vec::new();
  let mut root: Option<Element> = None;

  loop {
    match reader.read_event()? {
      Event::Start(start) => {
        stack.push(element_from(&start)?);
      }
      Event::Empty(start) => {
        let element = element_from(&start)?;
        attach(&mut stack, &mut root, element)?;
      }
      Event::End(end) => {
        let element = stack.pop().ok_or_else(|| {
          Error::Unbalanced(String::from_utf8_lossy(end.name().as_ref()).into_owned())
        })?;
        attach(&mut stack, &mut root, element)?;
      }
      Event::Text(text) => {
        if let Some(open) = stack.last_mut() {
          open.direct_text.push_str(&text.unescape()?);
        }
      }
      Event::CData(cdata) => {
        if let Some(open) = stack.last_mut() {
          open.direct_text.push_str(&String::from_utf8_lossy(&cdata));
        }
      }
      Event::Eof => break,
      _ => {}
    }
  }

  if let Some(open) = stack.pop() {
    return Err(Error::Unbalanced(open.name));
  }
  root.ok_or(Error::NoRoot)
}

fn element_from(start: &quick_xml::events::BytesStart<'_>) -> Result<Element> {
  let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
  let mut attrs = Vec::new();
  for attr in start.attributes() {
    let attr = attr?;
    attrs.push((
      String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
      attr.unescape_value()?.into_owned(),
    ));
  }
  Ok(Element::new(name, attrs))
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
  match stack.last_mut() {
    Some(parent) => parent.children.push(element),
    None => {
      if root.is_some() {
        return Err(Error::Unbalanced(element.name));
      }
      *root = Some(element);
    }
  }
  Ok(())
}
