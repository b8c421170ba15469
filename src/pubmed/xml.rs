//! Minimal owned element tree over `quick-xml` events.
//!
//! Text and attribute values stay escaped until read, so a broken entity in
//! one subtree only fails lookups inside that subtree.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    /// Escaped character data.
    Text(String),
    /// CDATA content, taken literally.
    CData(String),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, ParseError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = std::str::from_utf8(&attr.value)?.to_string();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    /// Parse a whole document and return its root element.
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = root.or(Some(element)),
                    }
                }
                Event::End(_) => {
                    // quick-xml has already checked the end name matches.
                    let Some(element) = stack.pop() else {
                        continue;
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = root.or(Some(element)),
                    }
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(std::str::from_utf8(&text)?.to_string()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let raw = data.into_inner();
                        parent.children.push(Node::CData(std::str::from_utf8(&raw)?.to_string()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(ParseError::Unclosed(open.name));
        }
        root.ok_or(ParseError::Empty)
    }

    /// Unescaped attribute value.
    pub fn attr(&self, key: &str) -> Result<Option<String>, ParseError> {
        match self.attrs.iter().find(|(k, _)| k == key) {
            Some((_, raw)) => Ok(Some(unescape(raw)?.into_owned())),
            None => Ok(None),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// All descendants in document order (pre-order), excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            out.push(child);
            child.collect_descendants(out);
        }
    }

    /// First descendant named `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.child_elements().find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }

    /// Every element reached by `path` starting at any descendant matching
    /// `path[0]`, then walking direct children. Mirrors `.//A/B/C`.
    pub fn find_all(&self, path: &[&str]) -> Vec<&Element> {
        let Some((first, rest)) = path.split_first() else {
            return Vec::new();
        };
        let mut current: Vec<&Element> = self
            .descendants()
            .into_iter()
            .filter(|e| e.name == *first)
            .collect();
        for &step in rest {
            current = current
                .into_iter()
                .flat_map(move |e| e.child_elements().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    /// First element matching `path`, see [`Element::find_all`].
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// All text below this element, concatenated and unescaped.
    pub fn text(&self) -> Result<String, ParseError> {
        let mut out = String::new();
        self.append_text(&mut out)?;
        Ok(out)
    }

    fn append_text(&self, out: &mut String) -> Result<(), ParseError> {
        for node in &self.children {
            match node {
                Node::Text(raw) => out.push_str(&unescape(raw)?),
                Node::CData(data) => out.push_str(data),
                Node::Element(e) => e.append_text(out)?,
            }
        }
        Ok(())
    }
}
