//! Result container
//!
//! An insertion-ordered map of extracted values. The source path and the node
//! a container was produced from ride along as metadata; they are never map
//! keys, but a hook may copy them into the map explicitly.

use std::fmt;
use std::ops::Index;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::document::Node;
use crate::value::Value;

static NIL: Value = Value::Nil;

#[derive(Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, Value)>,
    source_path: Option<String>,
    source_node: Option<Node>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty container carrying the given metadata
    pub fn from_source(source_path: Option<String>, source_node: Option<Node>) -> Self {
        Self {
            entries: Vec::new(),
            source_path,
            source_node,
        }
    }

    /// Path of the file the top-level extraction read, if any
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Node this container was extracted from. Only set while the hook runs.
    pub fn source_node(&self) -> Option<&Node> {
        self.source_node.as_ref()
    }

    pub(crate) fn clear_source_node(&mut self) {
        self.source_node = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.position(key).map(move |i| &mut self.entries[i].1)
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Follow a key path through nested maps
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut map = self;
        for key in parents {
            map = map.get(key.as_ref())?.as_map()?;
        }
        map.get(last.as_ref())
    }

    /// Insert at a key path, creating (or replacing non-map values with)
    /// intermediate maps on the way
    pub fn insert_path<S: AsRef<str>>(&mut self, path: &[S], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut map = self;
        for key in parents {
            let key = key.as_ref();
            if !matches!(map.get(key), Some(Value::Map(_))) {
                map.insert(key, Attributes::new());
            }
            map = match map.get_mut(key) {
                Some(Value::Map(inner)) => inner,
                _ => return,
            };
        }
        map.insert(last.as_ref(), value);
    }

    /// Shallow merge: every top-level key of `other` replaces ours
    pub fn merge(&mut self, other: Attributes) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    /// Copy top-level `keys` into every map stored under `into_keys` (lists of
    /// maps or single maps). A target key counts as unset when it is absent,
    /// nil or `false`; set keys are left alone. Keys absent at the top level
    /// are skipped.
    pub fn clone_attributes_into(&mut self, keys: &[&str], into_keys: &[&str]) {
        let sources: Vec<(String, Value)> = keys
            .iter()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v.clone())))
            .collect();

        for into in into_keys {
            match self.get_mut(into) {
                Some(Value::List(items)) => {
                    for item in items.iter_mut() {
                        if let Value::Map(target) = item {
                            target.fill_missing(&sources);
                        }
                    }
                }
                Some(Value::Map(target)) => target.fill_missing(&sources),
                _ => {}
            }
        }
    }

    fn fill_missing(&mut self, sources: &[(String, Value)]) {
        for (key, value) in sources {
            let unset = matches!(self.get(key), None | Some(Value::Nil) | Some(Value::Bool(false)));
            if unset {
                self.insert(key.clone(), value.clone());
            }
        }
    }

    /// Trim every text value, recursing into maps and lists. Text that ends up
    /// empty becomes nil.
    pub fn strip_attributes(&mut self) {
        for (_, value) in self.entries.iter_mut() {
            strip_value(value);
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn strip_value(value: &mut Value) {
    match value {
        Value::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                *value = Value::Nil;
            } else if trimmed.len() != text.len() {
                *text = trimmed.to_string();
            }
        }
        Value::Map(map) => map.strip_attributes(),
        Value::List(items) => items.iter_mut().for_each(strip_value),
        _ => {}
    }
}

/// Map equality: key order and metadata do not take part
impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Index<&str> for Attributes {
    type Output = Value;

    /// Missing keys read as nil
    fn index(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NIL)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (k, v) in iter {
            attributes.insert(k, v);
        }
        attributes
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
