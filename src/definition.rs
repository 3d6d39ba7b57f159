//! JSON specification definitions
//!
//! Describes a specification as data, for mappings that live in configuration
//! rather than code:
//!
//! ```json
//! {
//!   "mode": "search",
//!   "mappings": [
//!     { "kind": "text", "selector": "title" },
//!     { "kind": "text", "selector": "rights/country", "key": "country", "after_map": "upcase" },
//!     { "kind": "attribute", "selector": "track", "attribute": "code", "key": "isrc" },
//!     { "kind": "many", "selector": "tracks/track", "key": "tracks",
//!       "mappings": [ { "kind": "integer", "selector": "number", "key": "track_number" } ] }
//!   ],
//!   "within": [
//!     { "selector": "artist", "mappings": [ { "kind": "text", "selector": "name", "key": "artist_name" } ] }
//!   ]
//! }
//! ```
//!
//! Compilation goes through the builder, so definitions get the same
//! validation as specifications written in Rust.
//!
//! Entries are declared in a fixed order: the flat `mappings` first, then
//! each `within` block in turn (its own `mappings`, then its nested blocks).
//! When two entries share a key the later one wins, so a scoped entry always
//! overrides a flat one with the same key, never the other way round.

use serde::Deserialize;

use crate::builder::Builder;
use crate::error::Result;
use crate::mapping::{Kind, Options, OutputKey, Specification};
use crate::selector::SelectorMode;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpecDefinition {
    pub mode: SelectorMode,
    pub mappings: Vec<MappingDefinition>,
    pub within: Vec<ScopeDefinition>,
}

/// One mapping entry
#[derive(Debug, Clone, Deserialize)]
pub struct MappingDefinition {
    pub kind: Kind,
    #[serde(default)]
    pub selector: String,
    /// Output key; a string, or an array for a nested key path. Defaults to
    /// the selector.
    #[serde(default)]
    pub key: Option<KeyDefinition>,
    #[serde(default)]
    pub after_map: OneOrMany,
    /// Attribute name for `attribute` mappings
    #[serde(default)]
    pub attribute: Option<String>,
    /// Nested mappings of a `many` entry
    #[serde(default)]
    pub mappings: Vec<MappingDefinition>,
    /// Selector mode of a `many` entry's nested specification
    #[serde(default)]
    pub mode: Option<SelectorMode>,
}

/// A `within` block
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeDefinition {
    pub selector: String,
    #[serde(default)]
    pub mappings: Vec<MappingDefinition>,
    #[serde(default)]
    pub within: Vec<ScopeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KeyDefinition {
    Key(String),
    Path(Vec<String>),
}

impl From<KeyDefinition> for OutputKey {
    fn from(key: KeyDefinition) -> Self {
        match key {
            KeyDefinition::Key(key) => OutputKey::new(key),
            KeyDefinition::Path(path) => OutputKey::path(path),
        }
    }
}

/// A single string or a list of strings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => vec![],
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
        }
    }
}

impl SpecDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn compile(&self) -> Result<Specification> {
        self.compile_with(|_| {})
    }

    /// Compile, then let `extend` add hooks, transforms or further entries
    pub fn compile_with<F>(&self, extend: F) -> Result<Specification>
    where
        F: FnOnce(&mut Builder),
    {
        Specification::build(|m| {
            m.selector_mode(self.mode);
            declare_all(m, &self.mappings, &self.within);
            extend(m);
        })
    }
}

fn declare_all(m: &mut Builder, mappings: &[MappingDefinition], scopes: &[ScopeDefinition]) {
    for mapping in mappings {
        declare(m, mapping);
    }
    for scope in scopes {
        m.within(&scope.selector, |m| declare_all(m, &scope.mappings, &scope.within));
    }
}

fn declare(m: &mut Builder, mapping: &MappingDefinition) {
    let key: OutputKey = match &mapping.key {
        Some(key) => key.clone().into(),
        None => OutputKey::new(default_key(mapping)),
    };

    match mapping.kind {
        Kind::Many => {
            let mode = mapping.mode.unwrap_or_default();
            m.many((mapping.selector.as_str(), key), |m| {
                m.selector_mode(mode);
                declare_all(m, &mapping.mappings, &[]);
            });
        }
        Kind::Attribute => {
            // the attribute name is appended as `path/@name` for the builder
            let selector = match &mapping.attribute {
                Some(name) if mapping.selector.is_empty() => name.clone(),
                Some(name) => format!("{}/@{}", mapping.selector, name),
                None => mapping.selector.clone(),
            };
            m.scalar(Kind::Attribute, (selector.as_str(), key), options(mapping));
        }
        kind => {
            m.scalar(kind, (mapping.selector.as_str(), key), options(mapping));
        }
    }
}

fn default_key(mapping: &MappingDefinition) -> String {
    match (&mapping.kind, &mapping.attribute) {
        (Kind::Attribute, Some(name)) => name.clone(),
        _ => mapping.selector.clone(),
    }
}

fn options(mapping: &MappingDefinition) -> Options {
    Options {
        after_map: mapping.after_map.clone().into_vec(),
        attribute_name: None,
    }
}
