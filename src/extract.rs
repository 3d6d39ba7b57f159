//! Extraction engine
//!
//! Walks a specification's entries against a node and fills a result
//! container:
//! - `many` entries recurse into their nested specification once per match
//! - `node`, `attribute`, `text`, `integer` and `boolean` entries read the
//!   first match, then run the kind's coercion and the entry's after-map chain
//! - `exists`, `not_exists`, `node_name` and `inner_text` keep their raw value
//! - a parent specification is extracted in its own pass and our result is
//!   merged over it
//!
//! Named transforms resolve against the innermost specification first, then
//! outwards through the specifications enclosing the current `many` entry.

use std::path::Path;

use tracing::{debug, trace};

use crate::attributes::Attributes;
use crate::config::MapperConfig;
use crate::document::{Document, Node};
use crate::error::{Error, Result};
use crate::mapping::{Entry, Kind, Specification};
use crate::transform::{apply_after_map, coerce, TransformTable};
use crate::value::Value;

/// Applies one specification with one configuration
#[derive(Debug, Clone)]
pub struct Extractor<'s> {
    spec: &'s Specification,
    config: MapperConfig,
}

/// Per-call state threaded through the recursion
struct Pass<'a> {
    source_path: Option<&'a str>,
    /// Key to materialize the source path under; only set for the top level
    source_key: Option<&'a str>,
}

impl<'a> Pass<'a> {
    fn nested(&self) -> Pass<'a> {
        Pass {
            source_path: self.source_path,
            source_key: None,
        }
    }
}

impl<'s> Extractor<'s> {
    pub fn new(spec: &'s Specification) -> Self {
        Self {
            spec,
            config: MapperConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Extract from `node`. A document node behaves like its root element for
    /// attribute lookups.
    pub fn extract(&self, node: &Node) -> Attributes {
        let pass = Pass {
            source_path: None,
            source_key: None,
        };
        self.extract_spec(self.spec, node, &[], &pass)
    }

    pub fn extract_document(&self, document: &Document) -> Attributes {
        self.extract(&document.root())
    }

    /// One container per node, same order
    pub fn extract_all(&self, nodes: &[Node]) -> Vec<Attributes> {
        nodes.iter().map(|node| self.extract(node)).collect()
    }

    /// Parse `text` with the configured markup, then extract
    pub fn extract_str(&self, text: &str) -> Result<Attributes> {
        let document = self.config.parse(text)?;
        Ok(self.extract_document(&document))
    }

    /// Read and parse the file at `path`, then extract. The path is carried
    /// as `source_path` metadata on every container and, when
    /// `source_path_key` is set, stored under that key at the top level.
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Result<Attributes> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document = self.config.parse(&text)?;

        let shown = path.to_string_lossy();
        let pass = Pass {
            source_path: Some(&*shown),
            source_key: self.config.source_path_key.as_deref(),
        };
        debug!(path = %shown, "extracting from file");
        Ok(self.extract_spec(self.spec, &document.root(), &[], &pass))
    }

    fn extract_spec(
        &self,
        spec: &Specification,
        node: &Node,
        outer: &[&TransformTable],
        pass: &Pass<'_>,
    ) -> Attributes {
        let mut tables: Vec<&TransformTable> = Vec::with_capacity(outer.len() + 1);
        tables.push(&spec.transforms);
        tables.extend_from_slice(outer);

        let Some(parent) = spec.parent() else {
            return self.extract_pass(spec, node, &tables, pass);
        };

        let mut attributes = self.extract_spec(parent, node, outer, pass);
        if let Some(key) = pass.source_key {
            attributes.remove(key);
        }
        let own = self.extract_pass(spec, node, &tables, pass);
        debug!(
            inherited = attributes.len(),
            own = own.len(),
            "merging over parent specification"
        );
        attributes.merge(own);
        attributes
    }

    fn extract_pass(
        &self,
        spec: &Specification,
        node: &Node,
        tables: &[&TransformTable],
        pass: &Pass<'_>,
    ) -> Attributes {
        let mut attributes =
            Attributes::from_source(pass.source_path.map(str::to_string), Some(node.clone()));
        debug!(
            entries = spec.entries.len(),
            mode = ?spec.mode(),
            node = node.tag_name(),
            "extracting"
        );

        for entry in spec.entries() {
            let value = match entry.kind {
                Kind::Many => self.extract_many(spec, entry, node, tables, pass),
                Kind::Exists | Kind::NotExists | Kind::NodeName | Kind::InnerText => {
                    read_scalar(entry, node)
                }
                kind => {
                    let value = coerce(kind, read_scalar(entry, node));
                    apply_after_map(value, &entry.options.after_map, tables)
                }
            };
            trace!(key = %entry.key, selector = entry.selector(), kind = value.kind_name(), "entry");
            attributes.insert_path(entry.key.segments(), value);
        }

        if let (Some(key), Some(path)) = (pass.source_key, pass.source_path) {
            attributes.insert(key, path);
        }

        if let Some(hook) = &spec.hook {
            hook(&mut attributes);
        }
        attributes.clear_source_node();
        attributes
    }

    fn extract_many(
        &self,
        spec: &Specification,
        entry: &Entry,
        node: &Node,
        tables: &[&TransformTable],
        pass: &Pass<'_>,
    ) -> Value {
        let matches = entry.selector.select(node, spec.mode());
        debug!(
            selector = entry.selector(),
            matches = matches.len(),
            "collection"
        );
        let Some(nested) = entry.nested() else {
            return Value::List(Vec::new());
        };
        let nested_pass = pass.nested();
        Value::List(
            matches
                .iter()
                .map(|item| Value::Map(self.extract_spec(nested, item, tables, &nested_pass)))
                .collect(),
        )
    }
}

/// Raw value of a non-`many` entry. Only `node`, `attribute`, `text`,
/// `integer` and `boolean` values go on to coercion and after-map.
fn read_scalar(entry: &Entry, node: &Node) -> Value {
    match entry.kind {
        Kind::Exists => Value::Bool(entry.selector.first(node).is_some()),
        Kind::NotExists => Value::Bool(entry.selector.first(node).is_none()),
        Kind::NodeName => Value::from(node.tag_name()),
        Kind::InnerText => Value::Text(node.inner_text()),
        Kind::Node => entry.selector.first(node).map_or(Value::Nil, Value::Node),
        Kind::Attribute => {
            let name = entry.options.attribute_name.as_deref().unwrap_or_default();
            entry
                .selector
                .first(node)
                .map(|found| found.unwrap_document())
                .and_then(|found| found.attribute(name).map(Value::from))
                .unwrap_or_default()
        }
        Kind::Text | Kind::Integer | Kind::Boolean => entry
            .selector
            .first(node)
            .map(|found| found.inner_text())
            .filter(|text| !text.is_empty())
            .map_or(Value::Nil, Value::Text),
        Kind::Many => Value::Nil,
    }
}

impl Specification {
    /// Extract with the default configuration
    pub fn extract(&self, node: &Node) -> Attributes {
        Extractor::new(self).extract(node)
    }

    pub fn extract_document(&self, document: &Document) -> Attributes {
        Extractor::new(self).extract_document(document)
    }

    pub fn extract_all(&self, nodes: &[Node]) -> Vec<Attributes> {
        Extractor::new(self).extract_all(nodes)
    }

    pub fn extract_str(&self, text: &str) -> Result<Attributes> {
        Extractor::new(self).extract_str(text)
    }

    pub fn extract_path(&self, path: impl AsRef<Path>) -> Result<Attributes> {
        Extractor::new(self).extract_path(path)
    }
}
