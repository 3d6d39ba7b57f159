//! Declarative XML-to-record mapping
//!
//! Describes how to turn an XML (or HTML) document into a nested map of
//! typed values:
//! - Specifications built with a small DSL (`text`, `integer`, `within`,
//!   `many`, ...) or loaded from JSON definitions
//! - XPath-subset selectors over a parsed document tree
//! - Per-kind coercion plus chained after-map transforms (`upcase`,
//!   `parse_date`, `parse_duration`, user-registered functions)
//! - Post-extraction hooks, inclusion and inheritance of specifications

pub mod attributes;
pub mod builder;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod extract;
pub mod mapping;
pub mod selector;
pub mod transform;
pub mod value;

pub use attributes::Attributes;
pub use builder::{Builder, Targets};
pub use config::MapperConfig;
pub use definition::SpecDefinition;
pub use document::{Document, Markup, Node};
pub use error::{Error, Result};
pub use extract::Extractor;
pub use mapping::{Entry, Hook, Kind, Options, OutputKey, Specification};
pub use selector::{Selector, SelectorMode};
pub use transform::{parse_date, parse_duration, parse_integer, string_to_boolean, TransformTable};
pub use value::Value;
