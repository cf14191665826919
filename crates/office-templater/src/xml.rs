//! A2: a small owned, mutable XML tree, built and re-serialized with
//! `quick-xml`.
//!
//! Grounded on `src/parser/chart.rs::parse_chart_xml`, which already walks
//! OOXML fragments with `quick_xml::Reader`/`Event` pattern matching; this
//! generalizes the same event loop into a DOM that can be mutated (text
//! substitution, row cloning, shape removal) and written back out rather
//! than only ever being read.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::error::RenderError;

/// An XML element: a qualified tag name, its attributes in document order,
/// and an ordered list of child nodes (text or nested elements).
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value.into();
        } else {
            self.attrs.push((key, value.into()));
        }
    }

    /// Concatenated text of every direct and nested `Text` descendant.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Replace all text content with a single text node.
    pub fn set_text_content(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    /// Depth-first search for descendant elements whose tag name matches
    /// `name` exactly (qualified, e.g. `"a:t"`).
    pub fn find_all(&self, name: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.find_all_into(name, &mut out);
        out
    }

    fn find_all_into<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if let XmlNode::Element(e) = child {
                if e.name == name {
                    out.push(e);
                }
                e.find_all_into(name, out);
            }
        }
    }

    /// First direct child element with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|c| match c {
            XmlNode::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|c| match c {
            XmlNode::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Mutable descendant search. Unlike [`XmlElement::find_all`], a match is
    /// not itself searched further — fine for the leaf value elements (chart
    /// `c:v`, etc.) this is used for, which never nest same-named children.
    pub fn find_all_mut(&mut self, name: &str) -> Vec<&mut XmlElement> {
        let mut out = Vec::new();
        self.find_all_into_mut(name, &mut out);
        out
    }

    fn find_all_into_mut<'a>(&'a mut self, name: &str, out: &mut Vec<&'a mut XmlElement>) {
        for child in &mut self.children {
            if let XmlNode::Element(e) = child {
                if e.name == name {
                    out.push(e);
                } else {
                    e.find_all_into_mut(name, out);
                }
            }
        }
    }

    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter_map(move |c| match c {
            XmlNode::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }
}

/// Parse a single well-formed XML document into its root element.
pub fn parse(xml: &[u8]) -> Result<XmlElement, RenderError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| RenderError::Xml(e.to_string()))?
        {
            Event::Start(e) => stack.push(element_from_start(&e)?),
            Event::Empty(e) => {
                let el = element_from_start(&e)?;
                push_child(&mut stack, &mut root, el)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| RenderError::Xml(e.to_string()))?
                    .into_owned();
                if let Some(top) = stack.last_mut() {
                    top.children.push(XmlNode::Text(text));
                }
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| RenderError::Xml("unmatched closing tag".to_string()))?;
                push_child(&mut stack, &mut root, el)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| RenderError::Xml("empty document".to_string()))
}

fn push_child(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), RenderError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(el));
    } else {
        *root = Some(el);
    }
    Ok(())
}

fn element_from_start(e: &BytesStart) -> Result<XmlElement, RenderError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| RenderError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| RenderError::Xml(err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

/// Serialize an element tree back to bytes.
pub fn serialize(root: &XmlElement) -> Result<Vec<u8>, RenderError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_element(&mut writer, root)?;
    Ok(writer.into_inner().into_inner())
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    el: &XmlElement,
) -> Result<(), RenderError> {
    if el.children.is_empty() {
        let mut start = BytesStart::new(el.name.as_str());
        for (k, v) in &el.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| RenderError::Xml(e.to_string()))?;
        return Ok(());
    }

    let mut start = BytesStart::new(el.name.as_str());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    writer
        .write_event(Event::Start(start))
        .map_err(|e| RenderError::Xml(e.to_string()))?;

    for child in &el.children {
        match child {
            XmlNode::Text(t) => {
                writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(|e| RenderError::Xml(e.to_string()))?;
            }
            XmlNode::Element(child_el) => write_element(writer, child_el)?,
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| RenderError::Xml(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let xml = b"<a:p><a:r><a:t>Hello</a:t></a:r></a:p>";
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "a:p");
        let t = root.find_all("a:t");
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].text_content(), "Hello");
    }

    #[test]
    fn round_trips_simple_document() {
        let xml = b"<root attr=\"1\"><child>text</child></root>";
        let root = parse(xml).unwrap();
        let out = serialize(&root).unwrap();
        let reparsed = parse(&out).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn preserves_attributes() {
        let xml = b"<a:t xml:space=\"preserve\">hi</a:t>";
        let root = parse(xml).unwrap();
        assert_eq!(root.attr("xml:space"), Some("preserve"));
    }

    #[test]
    fn empty_elements_round_trip_as_self_closing() {
        let xml = b"<a:graphicFrame/>";
        let root = parse(xml).unwrap();
        assert!(root.children.is_empty());
        let out = serialize(&root).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("/>"));
    }

    #[test]
    fn set_text_content_replaces_children() {
        let mut el = parse(b"<a:t>old</a:t>").unwrap();
        el.set_text_content("new");
        assert_eq!(el.text_content(), "new");
    }

    #[test]
    fn find_all_mut_allows_in_place_rewriting() {
        let mut root = parse(b"<a:tbl><a:tr><a:tc><a:v>1</a:v></a:tc><a:tc><a:v>2</a:v></a:tc></a:tr></a:tbl>").unwrap();
        for v in root.find_all_mut("a:v") {
            let doubled: String = v.text_content().chars().map(|_| 'x').collect();
            v.set_text_content(doubled);
        }
        let values = root.find_all("a:v");
        assert_eq!(values[0].text_content(), "x");
        assert_eq!(values[1].text_content(), "x");
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let el = parse(b"<a:tr><a:tc><a:t>x</a:t></a:tc></a:tr>").unwrap();
        let mut clone = el.clone();
        clone.children.clear();
        assert!(!el.children.is_empty());
    }
}
