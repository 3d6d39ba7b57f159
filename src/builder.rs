//! Specification builder DSL
//!
//! ```ignore
//! let spec = Specification::build(|m| {
//!     m.text(["title", "version_title"]);
//!     m.integer("released_in");
//!     m.text_with("country", Options::after_map("upcase"));
//!     m.within("artist", |m| {
//!         m.text(("name", "artist_name"));
//!     });
//!     m.many(("tracks/track", "tracks"), |m| {
//!         m.attribute(("code", "isrc"));
//!         m.integer(("number", "track_number"));
//!     });
//!     m.after_map(|atts| {
//!         let count = atts["tracks"].as_list().map_or(0, <[_]>::len);
//!         atts.insert("tracks_count", count);
//!     });
//! })?;
//! ```
//!
//! Each builder is its own construction context: `within` scopes live on the
//! builder's stack and `many` blocks run against a fresh nested builder whose
//! result is captured into the entry.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::trace;

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::mapping::{Entry, Hook, Kind, Options, OutputKey, Specification};
use crate::selector::{join_path, Selector, SelectorMode};
use crate::transform::TransformTable;
use crate::value::Value;

/// Targets of one builder call: plain names (selector and key alike) or
/// selector→key pairs
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Names(Vec<String>),
    Mapping(Vec<(String, OutputKey)>),
}

impl Targets {
    fn into_pairs(self) -> Vec<(String, OutputKey)> {
        match self {
            Targets::Names(names) => names
                .into_iter()
                .map(|name| {
                    let key = OutputKey::new(name.clone());
                    (name, key)
                })
                .collect(),
            Targets::Mapping(pairs) => pairs,
        }
    }
}

impl From<&str> for Targets {
    fn from(name: &str) -> Self {
        Targets::Names(vec![name.to_string()])
    }
}

impl From<String> for Targets {
    fn from(name: String) -> Self {
        Targets::Names(vec![name])
    }
}

impl<const N: usize> From<[&str; N]> for Targets {
    fn from(names: [&str; N]) -> Self {
        Targets::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Vec<&str>> for Targets {
    fn from(names: Vec<&str>) -> Self {
        Targets::Names(names.into_iter().map(String::from).collect())
    }
}

impl From<(&str, &str)> for Targets {
    fn from((selector, key): (&str, &str)) -> Self {
        Targets::Mapping(vec![(selector.to_string(), OutputKey::new(key))])
    }
}

impl From<(&str, OutputKey)> for Targets {
    fn from((selector, key): (&str, OutputKey)) -> Self {
        Targets::Mapping(vec![(selector.to_string(), key)])
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Targets {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Targets::Mapping(
            pairs
                .iter()
                .map(|(s, k)| (s.to_string(), OutputKey::new(*k)))
                .collect(),
        )
    }
}

impl From<Vec<(String, OutputKey)>> for Targets {
    fn from(pairs: Vec<(String, OutputKey)>) -> Self {
        Targets::Mapping(pairs)
    }
}

/// Accumulates entries for one specification
#[derive(Default)]
pub struct Builder {
    entries: Vec<Entry>,
    hook: Option<Hook>,
    mode: SelectorMode,
    parent: Option<Arc<Specification>>,
    transforms: TransformTable,
    scopes: Vec<String>,
    errors: Vec<String>,
}

impl Specification {
    /// Run `block` against a fresh builder. Authoring mistakes are collected
    /// and reported here rather than at extraction time.
    pub fn build<F>(block: F) -> Result<Specification>
    where
        F: FnOnce(&mut Builder),
    {
        let mut builder = Builder::new();
        block(&mut builder);
        builder.finish()
    }
}

macro_rules! kind_methods {
    ($($name:ident, $with:ident => $kind:expr;)*) => {
        $(
            pub fn $name(&mut self, targets: impl Into<Targets>) -> &mut Self {
                self.scalar($kind, targets, Options::default())
            }

            pub fn $with(&mut self, targets: impl Into<Targets>, options: Options) -> &mut Self {
                self.scalar($kind, targets, options)
            }
        )*
    };
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(mut self) -> Result<Specification> {
        if !self.errors.is_empty() {
            return Err(Error::InvalidSpecification(self.errors.join("; ")));
        }
        Ok(self.take_specification())
    }

    fn take_specification(&mut self) -> Specification {
        Specification {
            entries: std::mem::take(&mut self.entries),
            hook: self.hook.take(),
            mode: self.mode,
            parent: self.parent.take(),
            transforms: std::mem::take(&mut self.transforms),
        }
    }

    fn fail(&mut self, message: String) {
        self.errors.push(message);
    }

    kind_methods! {
        text, text_with => Kind::Text;
        integer, integer_with => Kind::Integer;
        boolean, boolean_with => Kind::Boolean;
        exists, exists_with => Kind::Exists;
        not_exists, not_exists_with => Kind::NotExists;
        node_name, node_name_with => Kind::NodeName;
        inner_text, inner_text_with => Kind::InnerText;
        node, node_with => Kind::Node;
        attribute, attribute_with => Kind::Attribute;
    }

    /// Add one entry of `kind` per target, each carrying `options`
    pub fn scalar(&mut self, kind: Kind, targets: impl Into<Targets>, options: Options) -> &mut Self {
        if kind == Kind::Many {
            self.fail("many entries need a nested specification; use many()".to_string());
            return self;
        }

        for (selector, key) in self.resolve_targets(kind, targets.into()) {
            if kind == Kind::Attribute {
                let (path, name) = split_attribute(&selector);
                let options = Options {
                    attribute_name: Some(name.to_string()),
                    ..options.clone()
                };
                let scoped = self.scoped(path);
                self.push_entry(kind, scoped, key, options, None);
            } else {
                let scoped = self.scoped(&selector);
                self.push_entry(kind, scoped, key, options.clone(), None);
            }
        }
        self
    }

    /// Prefix every selector declared in `block` with `selector`
    pub fn within<F>(&mut self, selector: &str, block: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        if selector.trim().is_empty() {
            self.fail("within() needs a non-empty selector".to_string());
            return self;
        }
        {
            let mut scope = ScopeGuard::push(self, selector);
            block(&mut *scope);
        }
        self
    }

    /// One list entry per target, each element extracted with the
    /// specification `block` declares
    pub fn many<F>(&mut self, targets: impl Into<Targets>, block: F) -> &mut Self
    where
        F: FnOnce(&mut Builder),
    {
        let mut nested = Builder::new();
        block(&mut nested);

        if !nested.errors.is_empty() {
            let errors = std::mem::take(&mut nested.errors);
            self.errors
                .extend(errors.into_iter().map(|e| format!("in many block: {}", e)));
            return self;
        }

        let captured = nested.take_specification();
        self.many_with_spec(targets, captured)
    }

    /// Like `many`, with an already built nested specification
    pub fn many_with_spec(
        &mut self,
        targets: impl Into<Targets>,
        spec: impl Into<Arc<Specification>>,
    ) -> &mut Self {
        let spec = spec.into();
        for (selector, key) in self.resolve_targets(Kind::Many, targets.into()) {
            if selector.trim().is_empty() {
                self.fail(format!("many entry {} needs a selector", key));
                continue;
            }
            let scoped = self.scoped(&selector);
            self.push_entry(Kind::Many, scoped, key, Options::default(), Some(Arc::clone(&spec)));
        }
        self
    }

    /// Register the post-extraction hook (last registration wins)
    pub fn after_map<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut Attributes) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn selector_mode(&mut self, mode: SelectorMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Splice copies of `other`'s entries onto ours. Its hook is not carried
    /// over; its named transforms are, unless we define the same name.
    pub fn include(&mut self, other: &Specification) -> &mut Self {
        self.entries.extend(other.entries.iter().cloned());
        self.transforms.merge_missing(&other.transforms);
        self
    }

    /// Extend `parent`: it is extracted separately and our result is merged
    /// over its own, key by key
    pub fn inherit(&mut self, parent: impl Into<Arc<Specification>>) -> &mut Self {
        self.parent = Some(parent.into());
        self
    }

    /// Register a named after-map transform
    pub fn transform<F>(&mut self, name: impl Into<String>, transform: F) -> &mut Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transforms.register(name, transform);
        self
    }

    fn resolve_targets(&mut self, kind: Kind, targets: Targets) -> Vec<(String, OutputKey)> {
        let pairs = targets.into_pairs();
        if pairs.is_empty() {
            self.fail(format!("{:?} entry declared without targets", kind));
            return vec![];
        }

        let mut valid = Vec::with_capacity(pairs.len());
        for (selector, key) in pairs {
            if !key.is_valid() {
                self.fail(format!(
                    "{:?} entry for selector {:?} has an empty output key",
                    kind, selector
                ));
            } else if kind == Kind::Attribute && split_attribute(&selector).1.is_empty() {
                self.fail(format!("attribute entry {} has no attribute name", key));
            } else {
                valid.push((selector, key));
            }
        }
        valid
    }

    fn scoped(&self, selector: &str) -> String {
        if self.scopes.is_empty() {
            return selector.to_string();
        }
        let mut parts: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        parts.push(selector);
        join_path(&parts)
    }

    fn push_entry(
        &mut self,
        kind: Kind,
        selector: String,
        key: OutputKey,
        options: Options,
        nested: Option<Arc<Specification>>,
    ) {
        match Selector::parse(&selector) {
            Ok(selector) => {
                trace!(?kind, selector = selector.as_str(), key = %key, "mapping entry");
                self.entries.push(Entry {
                    kind,
                    selector,
                    key,
                    options,
                    nested,
                });
            }
            Err(err) => self.fail(err.to_string()),
        }
    }
}

/// `"code"` → (`""`, `"code"`); `"file/@code"` → (`"file"`, `"code"`)
fn split_attribute(selector: &str) -> (&str, &str) {
    match selector.rfind('@') {
        Some(at) => (selector[..at].trim_end_matches('/'), &selector[at + 1..]),
        None => ("", selector),
    }
}

/// Pops the scope it pushed when dropped, whether the block returned or
/// unwound
struct ScopeGuard<'a> {
    builder: &'a mut Builder,
}

impl<'a> ScopeGuard<'a> {
    fn push(builder: &'a mut Builder, selector: &str) -> Self {
        builder.scopes.push(selector.to_string());
        ScopeGuard { builder }
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = Builder;

    fn deref(&self) -> &Builder {
        self.builder
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Builder {
        self.builder
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.builder.scopes.pop();
    }
}
