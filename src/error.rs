//! Error types

use std::path::PathBuf;

use thiserror::Error;

/// Result type for mapping operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by parsing, specification authoring and path-based extraction.
///
/// Data gaps (missing nodes, unparsable dates, unknown transforms) are never
/// errors; they show up as nil/false/true values in the result.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed markup
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Reading the source file failed
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Selector string could not be compiled
    #[error("Invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },

    /// Specification authoring defect, reported by `Specification::build`
    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    /// Malformed JSON definition or configuration
    #[error("Definition error: {0}")]
    Definition(#[from] serde_json::Error),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.into(),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::parse(format!("XML parse error: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::parse(format!("XML attribute error: {}", err))
    }
}
