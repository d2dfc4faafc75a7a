//! XML-as-tree conversion.
//!
//! The document root becomes the single top-level key. Child elements nest
//! as contexts, repeated sibling names collapse into lists, text-only
//! elements become strings and attributes become string entries.

use super::{Context, Value};
use crate::errors::UnitError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Key holding the text of an element that also has children or attributes.
const TEXT_KEY: &str = "#text";

struct Node {
    name: String,
    children: Context,
    text: String,
}

impl Node {
    fn open(start: &BytesStart<'_>) -> Result<Self, UnitError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut children = Context::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| UnitError::Xml(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| UnitError::Xml(e.to_string()))?;
            children.insert(key, value.into_owned());
        }
        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim().to_string();
        if self.children.is_empty() {
            return (self.name, Value::String(text));
        }
        let mut children = self.children;
        if !text.is_empty() {
            children.insert(TEXT_KEY, text);
        }
        (self.name, Value::Map(children))
    }
}

fn attach(parent: &mut Context, name: &str, value: Value) {
    match parent.get_mut(name) {
        Some(Value::List(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::take(existing);
            *existing = Value::List(vec![first, value]);
        }
        None => {
            parent.insert(name, value);
        }
    }
}

impl Context {
    /// Parses an XML document into a context tree.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::Xml`] for malformed documents.
    pub fn from_xml_str(text: &str) -> Result<Self, UnitError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Node> = Vec::new();
        let mut root = Self::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Node::open(&start)?),
                Ok(Event::Empty(start)) => {
                    let (name, value) = Node::open(&start)?.close();
                    match stack.last_mut() {
                        Some(parent) => attach(&mut parent.children, &name, value),
                        None => attach(&mut root, &name, value),
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| UnitError::Xml("unbalanced end tag".to_string()))?;
                    let (name, value) = node.close();
                    match stack.last_mut() {
                        Some(parent) => attach(&mut parent.children, &name, value),
                        None => attach(&mut root, &name, value),
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some(node) = stack.last_mut() {
                        let text = t.unescape().map_err(|e| UnitError::Xml(e.to_string()))?;
                        node.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(UnitError::Xml(format!(
                        "at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
            }
        }

        if !stack.is_empty() {
            return Err(UnitError::Xml("unexpected end of document".to_string()));
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_elements_and_attributes() {
        let ctx = Context::from_xml_str(
            r#"<Catalog version="2"><Item sku="A1"><Name>Bolt</Name></Item></Catalog>"#,
        )
        .unwrap();

        assert_eq!(ctx.get_string("catalog.version"), "2");
        assert_eq!(ctx.get_string("catalog.item.sku"), "A1");
        assert_eq!(ctx.get_string("catalog.item.name"), "Bolt");
    }

    #[test]
    fn test_repeated_siblings_become_list() {
        let ctx = Context::from_xml_str(
            "<rows><row><id>1</id></row><row><id>2</id></row><row><id>3</id></row></rows>",
        )
        .unwrap();

        let rows = ctx.select_values("rows.row").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(ctx.get_string("rows.row.2.id"), "3");
    }

    #[test]
    fn test_mixed_text_is_kept() {
        let ctx = Context::from_xml_str(r#"<note lang="it">ciao</note>"#).unwrap();
        assert_eq!(ctx.get_string("note.#text"), "ciao");
        assert_eq!(ctx.get_string("note.lang"), "it");
    }

    #[test]
    fn test_malformed_document() {
        assert!(Context::from_xml_str("<a><b></a>").is_err());
    }
}
