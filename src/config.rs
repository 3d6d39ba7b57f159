//! Extraction configuration

use serde::Deserialize;

use crate::document::{Document, Markup};
use crate::error::Result;

/// Settings for an extraction run.
///
/// ```json
/// { "source_path_key": "xml_path", "markup": "xml", "strip_namespaces": true }
/// ```
///
/// Every field is optional in JSON; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Key under which path-based extraction records the file path in the
    /// top-level result. `None` keeps the path as metadata only.
    pub source_path_key: Option<String>,
    /// Markup flavour of string and file input
    pub markup: Markup,
    /// Drop XML namespace prefixes from element and attribute names
    pub strip_namespaces: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            source_path_key: Some("xml_path".to_string()),
            markup: Markup::Auto,
            strip_namespaces: true,
        }
    }
}

impl MapperConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse input text according to this configuration
    pub fn parse(&self, text: &str) -> Result<Document> {
        Document::parse_with(text, self.markup, self.strip_namespaces)
    }
}
