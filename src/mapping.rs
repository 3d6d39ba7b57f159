//! Mapping entries and specifications

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::attributes::Attributes;
use crate::selector::{Selector, SelectorMode};
use crate::transform::TransformTable;

/// What an entry derives from the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Inner text of the first match
    Text,
    /// Inner text of the first match, parsed as an integer
    Integer,
    /// Inner text of the first match, looked up in the boolean token table
    Boolean,
    /// Whether the selector matches
    Exists,
    /// Whether the selector matches nothing
    NotExists,
    /// Tag name of the context node
    NodeName,
    /// Inner text of the context node
    InnerText,
    /// The first matching node itself
    Node,
    /// A named attribute of the first match
    Attribute,
    /// One nested result per match
    Many,
}

/// Where a value lands in the result: one key, or a path through nested maps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputKey(Vec<String>);

impl OutputKey {
    pub fn new(key: impl Into<String>) -> Self {
        OutputKey(vec![key.into()])
    }

    /// `OutputKey::path(["meta", "title"])` places the value at `meta.title`
    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OutputKey(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub(crate) fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|s| !s.is_empty())
    }
}

impl From<&str> for OutputKey {
    fn from(key: &str) -> Self {
        OutputKey::new(key)
    }
}

impl From<String> for OutputKey {
    fn from(key: String) -> Self {
        OutputKey::new(key)
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Per-entry options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Transform names applied in order after the kind's own coercion
    pub after_map: Vec<String>,
    /// Attribute read by `attribute` entries
    pub attribute_name: Option<String>,
}

impl Options {
    pub fn after_map(name: impl Into<String>) -> Self {
        Options {
            after_map: vec![name.into()],
            attribute_name: None,
        }
    }

    /// Append another transform to the chain
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.after_map.push(name.into());
        self
    }
}

/// One declared rule
#[derive(Clone)]
pub struct Entry {
    pub(crate) kind: Kind,
    pub(crate) selector: Selector,
    pub(crate) key: OutputKey,
    pub(crate) options: Options,
    pub(crate) nested: Option<Arc<Specification>>,
}

impl Entry {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Scope-joined selector as declared
    pub fn selector(&self) -> &str {
        self.selector.as_str()
    }

    pub fn key(&self) -> &OutputKey {
        &self.key
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Specification applied to each match of a `many` entry
    pub fn nested(&self) -> Option<&Specification> {
        self.nested.as_deref()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.selector == other.selector
            && self.key == other.key
            && self.options == other.options
            && self.nested().map(Specification::entries) == other.nested().map(Specification::entries)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Entry");
        s.field("kind", &self.kind)
            .field("selector", &self.selector.as_str())
            .field("key", &self.key)
            .field("options", &self.options);
        if let Some(nested) = &self.nested {
            s.field("nested", &nested.entries);
        }
        s.finish()
    }
}

/// Post-extraction hook. Receives the finished container; `source_path()` and
/// `source_node()` are readable on it for the duration of the call.
pub type Hook = Arc<dyn Fn(&mut Attributes) + Send + Sync>;

/// An immutable, shareable set of mapping entries
#[derive(Clone, Default)]
pub struct Specification {
    pub(crate) entries: Vec<Entry>,
    pub(crate) hook: Option<Hook>,
    pub(crate) mode: SelectorMode,
    pub(crate) parent: Option<Arc<Specification>>,
    pub(crate) transforms: TransformTable,
}

impl Specification {
    /// Entries in declaration order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    pub fn mode(&self) -> SelectorMode {
        self.mode
    }

    /// Specification this one extends
    pub fn parent(&self) -> Option<&Specification> {
        self.parent.as_deref()
    }

    pub fn transforms(&self) -> &TransformTable {
        &self.transforms
    }
}

impl fmt::Debug for Specification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("entries", &self.entries)
            .field("mode", &self.mode)
            .field("hook", &self.hook.is_some())
            .field("parent", &self.parent)
            .field("transforms", &self.transforms)
            .finish()
    }
}
