//! Navigable document tree
//!
//! Markup is parsed once into an arena of nodes shared behind an `Arc`, so a
//! `Node` is a cheap handle (tree + index) that can be stored in results and
//! handed to hooks without borrowing from the caller's input.
//!
//! - XML goes through quick-xml, with namespace prefixes stripped so
//!   selectors never need to be namespace-qualified
//! - HTML goes through scraper (html5ever), which never fails

use std::fmt;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{ElementRef, Html};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::selector::{Selector, SelectorMode};

/// Markup flavour of an input document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Markup {
    /// HTML when the text starts with an HTML doctype or `<html`, XML otherwise
    #[default]
    Auto,
    Xml,
    Html,
}

impl Markup {
    fn resolve(self, text: &str) -> Markup {
        match self {
            Markup::Auto => {
                let head: String = text.trim_start().chars().take(14).collect();
                let head = head.to_ascii_lowercase();
                if head.starts_with("<!doctype html") || head.starts_with("<html") {
                    Markup::Html
                } else {
                    Markup::Xml
                }
            }
            other => other,
        }
    }
}

#[derive(Debug)]
enum NodeKind {
    Document,
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<NodeData>,
}

/// A parsed document. Cloning shares the underlying tree.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Arc<Tree>,
}

impl Document {
    /// Parse markup of the given flavour, stripping XML namespaces
    pub fn parse(text: &str, markup: Markup) -> Result<Document> {
        Self::parse_with(text, markup, true)
    }

    /// Parse markup of the given flavour. `strip_namespaces` only affects XML.
    pub fn parse_with(text: &str, markup: Markup, strip_namespaces: bool) -> Result<Document> {
        match markup.resolve(text) {
            Markup::Html => Ok(Self::parse_html(text)),
            _ => Self::parse_xml_with(text, strip_namespaces),
        }
    }

    /// Parse XML with namespace prefixes and `xmlns` declarations removed
    pub fn parse_xml(xml: &str) -> Result<Document> {
        Self::parse_xml_with(xml, true)
    }

    /// Parse XML, optionally keeping qualified names as written
    pub fn parse_xml_with(xml: &str, strip_namespaces: bool) -> Result<Document> {
        let mut reader = Reader::from_str(xml);
        let mut builder = TreeBuilder::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let (name, attributes) = element_parts(&e, strip_namespaces)?;
                    builder.open(name, attributes)?;
                }
                Event::Empty(e) => {
                    let (name, attributes) = element_parts(&e, strip_namespaces)?;
                    builder.open(name, attributes)?;
                    builder.close()?;
                }
                Event::End(_) => builder.close()?,
                Event::Text(e) => builder.text(e.unescape()?.into_owned())?,
                Event::CData(e) => {
                    builder.text(String::from_utf8_lossy(&e.into_inner()).into_owned())?
                }
                Event::Eof => break,
                _ => {}
            }
        }

        builder.finish()
    }

    /// Parse HTML. html5ever recovers from any input, so this cannot fail.
    pub fn parse_html(html: &str) -> Document {
        let parsed = Html::parse_document(html);
        let mut builder = TreeBuilder::new();
        append_html_element(&mut builder, parsed.root_element());
        Document {
            tree: Arc::new(Tree {
                nodes: builder.nodes,
            }),
        }
    }

    /// The document node itself
    pub fn root(&self) -> Node {
        Node {
            tree: Arc::clone(&self.tree),
            id: 0,
        }
    }

    /// The single top-level element
    pub fn root_element(&self) -> Option<Node> {
        self.root().element_children().next()
    }
}

fn element_parts(
    e: &BytesStart<'_>,
    strip_namespaces: bool,
) -> Result<(String, Vec<(String, String)>)> {
    let name = if strip_namespaces {
        String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
    } else {
        String::from_utf8_lossy(e.name().as_ref()).into_owned()
    };

    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key;
        let is_namespace_decl = key.as_ref() == b"xmlns"
            || key.prefix().is_some_and(|p| p.as_ref() == b"xmlns");
        let attr_name = if strip_namespaces {
            if is_namespace_decl {
                continue;
            }
            String::from_utf8_lossy(key.local_name().as_ref()).into_owned()
        } else {
            String::from_utf8_lossy(key.as_ref()).into_owned()
        };
        attributes.push((attr_name, attr.unescape_value()?.into_owned()));
    }

    Ok((name, attributes))
}

fn append_html_element(builder: &mut TreeBuilder, element: ElementRef<'_>) {
    let value = element.value();
    let attributes = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    builder.push_element(value.name().to_string(), attributes);

    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            append_html_element(builder, child_element);
        } else if let Some(text) = child.value().as_text() {
            let content: &str = text;
            builder.push_text(content.to_string());
        }
    }

    builder.stack.pop();
}

struct TreeBuilder {
    nodes: Vec<NodeData>,
    stack: Vec<usize>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: vec![],
            }],
            stack: vec![0],
        }
    }

    fn current(&self) -> usize {
        self.stack.last().copied().unwrap_or(0)
    }

    fn push_node(&mut self, kind: NodeKind) -> usize {
        let id = self.nodes.len();
        let parent = self.current();
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: vec![],
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn push_element(&mut self, name: String, attributes: Vec<(String, String)>) {
        let id = self.push_node(NodeKind::Element { name, attributes });
        self.stack.push(id);
    }

    fn push_text(&mut self, text: String) {
        let parent = self.current();
        // Adjacent text and CDATA sections collapse into one node
        if let Some(&last) = self.nodes[parent].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last].kind {
                existing.push_str(&text);
                return;
            }
        }
        self.push_node(NodeKind::Text(text));
    }

    fn open(&mut self, name: String, attributes: Vec<(String, String)>) -> Result<()> {
        if self.stack.len() == 1 && !self.nodes[0].children.is_empty() {
            return Err(Error::parse(format!(
                "unexpected second root element <{}>",
                name
            )));
        }
        self.push_element(name, attributes);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::parse("closing tag without matching open tag"));
        }
        self.stack.pop();
        Ok(())
    }

    fn text(&mut self, text: String) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if self.stack.len() == 1 {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::parse(format!(
                "text outside of the root element: {:?}",
                text.trim()
            )));
        }
        self.push_text(text);
        Ok(())
    }

    fn finish(self) -> Result<Document> {
        if self.stack.len() > 1 {
            let open = self.current();
            let name = match &self.nodes[open].kind {
                NodeKind::Element { name, .. } => name.as_str(),
                _ => "?",
            };
            return Err(Error::parse(format!("unclosed element <{}>", name)));
        }
        if self.nodes[0].children.is_empty() {
            return Err(Error::parse("document has no root element"));
        }
        Ok(Document {
            tree: Arc::new(Tree { nodes: self.nodes }),
        })
    }
}

/// Handle to one node of a parsed document
#[derive(Clone)]
pub struct Node {
    tree: Arc<Tree>,
    id: usize,
}

impl Node {
    fn data(&self) -> &NodeData {
        &self.tree.nodes[self.id]
    }

    fn at(&self, id: usize) -> Node {
        Node {
            tree: Arc::clone(&self.tree),
            id,
        }
    }

    /// Preorder index; sorting by it yields document order
    pub(crate) fn order(&self) -> usize {
        self.id
    }

    /// The document this node belongs to
    pub fn document(&self) -> Document {
        Document {
            tree: Arc::clone(&self.tree),
        }
    }

    pub fn is_document(&self) -> bool {
        matches!(self.data().kind, NodeKind::Document)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data().kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data().kind, NodeKind::Text(_))
    }

    /// Element name; `"document"` for the document node and `"text"` for text
    pub fn tag_name(&self) -> &str {
        match &self.data().kind {
            NodeKind::Document => "document",
            NodeKind::Element { name, .. } => name,
            NodeKind::Text(_) => "text",
        }
    }

    /// Concatenated text of this node and all its descendants
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(self.id, &mut out);
        out
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        let data = &self.tree.nodes[id];
        if let NodeKind::Text(text) = &data.kind {
            out.push_str(text);
        }
        for &child in &data.children {
            self.collect_text(child, out);
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.data().kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        let attrs: &[(String, String)] = match &self.data().kind {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        };
        attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn parent(&self) -> Option<Node> {
        self.data().parent.map(|id| self.at(id))
    }

    /// All child nodes, text included, in document order
    pub fn children(&self) -> impl Iterator<Item = Node> + '_ {
        self.data().children.iter().map(move |&id| self.at(id))
    }

    pub fn element_children(&self) -> impl Iterator<Item = Node> + '_ {
        self.children().filter(Node::is_element)
    }

    /// All descendants (not self) in document order
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut pending: Vec<usize> = self.data().children.iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            out.push(self.at(id));
            pending.extend(self.tree.nodes[id].children.iter().rev());
        }
        out
    }

    /// The document node's element, or the node itself
    pub fn unwrap_document(&self) -> Node {
        if self.is_document() {
            self.document()
                .root_element()
                .unwrap_or_else(|| self.clone())
        } else {
            self.clone()
        }
    }

    /// First match of `selector`, first step searched among all descendants
    pub fn find_first(&self, selector: &str) -> Result<Option<Node>> {
        Ok(Selector::parse(selector)?.first(self))
    }

    /// Every match of `selector` in document order
    pub fn find_all(&self, selector: &str, mode: SelectorMode) -> Result<Vec<Node>> {
        Ok(Selector::parse(selector)?.select(self, mode))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node(<{}>#{})", self.tag_name(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_xml_tree() {
        let doc = Document::parse_xml(
            r#"<?xml version="1.0"?>
            <album code="A1"><title>Black on Both Sides</title><empty/></album>"#,
        )
        .unwrap();

        let album = doc.root_element().unwrap();
        assert_eq!(album.tag_name(), "album");
        assert_eq!(album.attribute("code"), Some("A1"));
        assert_eq!(album.attribute("missing"), None);

        let names: Vec<String> = album
            .element_children()
            .map(|n| n.tag_name().to_string())
            .collect();
        assert_eq!(names, vec!["title", "empty"]);
        assert_eq!(album.inner_text(), "Black on Both Sides");
        assert_eq!(doc.root().tag_name(), "document");
    }

    #[test]
    fn test_namespaces_are_stripped() {
        let xml = r#"<ern:Release xmlns:ern="http://ddex.net/xml/ern/37" xmlns="urn:x">
            <ern:Title ern:lang="en">Hip Hop</ern:Title>
        </ern:Release>"#;

        let doc = Document::parse_xml(xml).unwrap();
        let release = doc.root_element().unwrap();
        assert_eq!(release.tag_name(), "Release");
        assert_eq!(release.attributes().count(), 0);

        let title = release.element_children().next().unwrap();
        assert_eq!(title.tag_name(), "Title");
        assert_eq!(title.attribute("lang"), Some("en"));

        let kept = Document::parse_xml_with(xml, false).unwrap();
        assert_eq!(kept.root_element().unwrap().tag_name(), "ern:Release");
    }

    #[test]
    fn test_entities_and_cdata() {
        let doc = Document::parse_xml("<a>Tom &amp; Jerry<![CDATA[ <3]]></a>").unwrap();
        assert_eq!(doc.root_element().unwrap().inner_text(), "Tom & Jerry <3");
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(matches!(
            Document::parse_xml("<a><b></a>"),
            Err(Error::Parse { .. })
        ));
        assert!(Document::parse_xml("<a><b></b>").is_err());
        assert!(Document::parse_xml("").is_err());
        assert!(Document::parse_xml("<a/><b/>").is_err());
    }

    #[test]
    fn test_parse_html() {
        let doc = Document::parse(
            "<!DOCTYPE html><html><body><p class=\"x\">Hi</p></body></html>",
            Markup::Auto,
        )
        .unwrap();
        let html = doc.root_element().unwrap();
        assert_eq!(html.tag_name(), "html");
        let p = html
            .descendants()
            .into_iter()
            .find(|n| n.tag_name() == "p")
            .unwrap();
        assert_eq!(p.attribute("class"), Some("x"));
        assert_eq!(p.inner_text(), "Hi");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = Document::parse_xml("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<String> = doc
            .root()
            .descendants()
            .iter()
            .map(|n| n.tag_name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_find_first_and_find_all() {
        let doc = Document::parse_xml(
            "<album><track><title>A</title></track><track><title>B</title></track></album>",
        )
        .unwrap();
        let root = doc.root();

        let title = root.find_first("track/title").unwrap().unwrap();
        assert_eq!(title.inner_text(), "A");
        assert_eq!(title.parent().map(|p| p.tag_name().to_string()), Some("track".to_string()));
        assert!(root.find_first("missing").unwrap().is_none());

        assert_eq!(root.find_all("title", SelectorMode::Search).unwrap().len(), 2);
        assert!(root.find_all("title", SelectorMode::Strict).unwrap().is_empty());
        assert!(matches!(root.find_first("track["), Err(Error::Selector { .. })));
    }

    #[test]
    fn test_unwrap_document() {
        let doc = Document::parse_xml("<album/>").unwrap();
        assert_eq!(doc.root().unwrap_document().tag_name(), "album");
        let album = doc.root_element().unwrap();
        assert_eq!(album.unwrap_document(), album);
    }
}
