//! Value coercion and after-map transforms
//!
//! Transforms run in a fixed order: the built-in coercion of the entry's kind
//! (integer, boolean), then each after-map name in declaration order. A name
//! is looked up first among the operations of the current value's kind, then
//! in the named transform tables (innermost specification first), then among
//! the engine defaults. Unknown names leave the value unchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use regex::Regex;
use tracing::trace;

use crate::mapping::Kind;
use crate::value::Value;

/// A named transform registered on a specification
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Named transforms of one specification
#[derive(Clone, Default)]
pub struct TransformTable {
    transforms: HashMap<String, TransformFn>,
}

impl TransformTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, transform: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(transform));
    }

    pub fn get(&self, name: &str) -> Option<&TransformFn> {
        self.transforms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Copy in every transform of `other` whose name is not taken yet
    pub fn merge_missing(&mut self, other: &TransformTable) {
        for (name, transform) in &other.transforms {
            self.transforms
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(transform));
        }
    }
}

impl fmt::Debug for TransformTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_set().entries(names).finish()
    }
}

/// Built-in coercion for the entry kind, applied to non-nil values only
pub(crate) fn coerce(kind: Kind, value: Value) -> Value {
    match (kind, value) {
        (_, Value::Nil) => Value::Nil,
        (Kind::Integer, Value::Text(text)) => parse_integer(&text).map_or(Value::Nil, Value::Integer),
        (Kind::Boolean, Value::Text(text)) => string_to_boolean(&text).map_or(Value::Nil, Value::Bool),
        (_, value) => value,
    }
}

/// Run the after-map chain over `value`
pub(crate) fn apply_after_map(value: Value, names: &[String], tables: &[&TransformTable]) -> Value {
    let mut value = value;
    for name in names {
        if value.is_nil() {
            break;
        }
        value = apply_named(value, name, tables);
    }
    value
}

fn apply_named(value: Value, name: &str, tables: &[&TransformTable]) -> Value {
    if let Some(result) = value_operation(name, &value) {
        return result;
    }
    if let Some(transform) = tables.iter().find_map(|table| table.get(name)) {
        return transform(value);
    }
    if let Some(result) = engine_default(name, &value) {
        return result;
    }
    trace!(transform = name, kind = value.kind_name(), "unresolved after-map transform, passing value through");
    value
}

/// Operations a value exposes on itself, by kind
fn value_operation(name: &str, value: &Value) -> Option<Value> {
    match value {
        Value::Text(text) => match name {
            "upcase" => Some(Value::Text(text.to_uppercase())),
            "downcase" => Some(Value::Text(text.to_lowercase())),
            "strip" => Some(Value::Text(text.trim().to_string())),
            "capitalize" => {
                let mut chars = text.chars();
                let capitalized = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                };
                Some(Value::Text(capitalized))
            }
            "reverse" => Some(Value::Text(text.chars().rev().collect())),
            "length" => Some(Value::from(text.chars().count())),
            "to_s" => Some(value.clone()),
            "to_i" => Some(parse_integer(text).map_or(Value::Nil, Value::Integer)),
            _ => None,
        },
        Value::Node(node) => match name {
            "inner_text" | "text" | "to_s" => Some(Value::Text(node.inner_text())),
            "name" => Some(Value::Text(node.tag_name().to_string())),
            _ => None,
        },
        Value::Integer(i) => match name {
            "to_s" => Some(Value::Text(i.to_string())),
            "to_i" => Some(value.clone()),
            "abs" => Some(Value::Integer(i.abs())),
            _ => None,
        },
        Value::Bool(_) | Value::Date(_) => match name {
            "to_s" => value.to_text().map(Value::Text),
            _ => None,
        },
        Value::List(items) => match name {
            "length" => Some(Value::from(items.len())),
            "first" => Some(items.first().cloned().unwrap_or_default()),
            "last" => Some(items.last().cloned().unwrap_or_default()),
            _ => None,
        },
        Value::Map(map) => match name {
            "length" => Some(Value::from(map.len())),
            _ => None,
        },
        Value::Nil => None,
    }
}

/// Named transforms every specification can use without registering them
fn engine_default(name: &str, value: &Value) -> Option<Value> {
    let text = value.to_text();
    match name {
        "parse_date" => Some(text.and_then(|t| parse_date(&t)).into()),
        "parse_duration" => Some(text.and_then(|t| parse_duration(&t)).into()),
        "string_to_boolean" => Some(text.and_then(|t| string_to_boolean(&t)).into()),
        _ => None,
    }
}

/// Leading optionally-signed decimal digits, after leading whitespace.
/// Text without a numeric prefix yields `None`.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (sign, digits) = match text.as_bytes().first() {
        Some(b'-') => (-1, &text[1..]),
        Some(b'+') => (1, &text[1..]),
        _ => (1, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// `true`, `yes`, `y`, `1` → true; `false`, `no`, `n`, `0` → false (any case)
pub fn string_to_boolean(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn colon_duration() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+):(\d{1,2}):(\d{1,2})$").ok())
        .as_ref()
}

fn iso_duration() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^PT(\d+)H(\d+)M(\d+)S$").ok())
        .as_ref()
}

fn hms_seconds(caps: &regex::Captures<'_>) -> Option<i64> {
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok());
    part(1)?
        .checked_mul(3600)?
        .checked_add(part(2)?.checked_mul(60)?)?
        .checked_add(part(3)?)
}

/// Duration in seconds from `"192"`, `"3:12"`, `"1:12:42"` or `"PT3M12S"`
pub fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }

    if text.contains(':') {
        let normalized = if text.matches(':').count() == 1 {
            format!("00:{}", text)
        } else {
            text.to_string()
        };
        let caps = colon_duration()?.captures(&normalized)?;
        return hms_seconds(&caps);
    }

    if let Some(rest) = text.strip_prefix("PT") {
        let normalized = if rest.contains('H') {
            text.to_string()
        } else {
            format!("PT0H{}", rest)
        };
        let caps = iso_duration()?.captures(&normalized)?;
        return hms_seconds(&caps);
    }

    None
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Calendar date from text; blank or unparsable text yields `None`
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
    {
        return Some(date);
    }
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(
            &format!("{}-{}-{}", &text[..4], &text[4..6], &text[6..]),
            "%Y-%m-%d",
        )
        .ok();
    }
    // Timestamps such as 2010-09-01T10:00:00Z keep only the date part
    match text.get(..10) {
        Some(prefix) if text.len() > 10 && matches!(text.as_bytes()[10], b'T' | b' ') => {
            NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_boolean() {
        for (input, expected) in [
            ("true", Some(true)),
            ("false", Some(false)),
            ("y", Some(true)),
            ("TRUE", Some(true)),
            ("", None),
            ("YES", Some(true)),
            ("yes", Some(true)),
            ("n", Some(false)),
            ("No", Some(false)),
            ("1", Some(true)),
            ("0", Some(false)),
            ("maybe", None),
        ] {
            assert_eq!(string_to_boolean(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("7"), Some(7));
        assert_eq!(parse_integer("  42abc"), Some(42));
        assert_eq!(parse_integer("-3"), Some(-3));
        assert_eq!(parse_integer("abc"), None);
        assert_eq!(parse_integer(""), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT3M12S"), Some(192));
        assert_eq!(parse_duration("PT1H3M12S"), Some(3792));
        assert_eq!(parse_duration("1:12:42"), Some(4362));
        assert_eq!(parse_duration("3:12"), Some(192));
        assert_eq!(parse_duration("03:12"), Some(192));
        assert_eq!(parse_duration("192"), Some(192));
        assert_eq!(parse_duration("no_duration"), None);
        assert_eq!(parse_duration("PT12S"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("9999999999999999:00:00"), None);
        assert_eq!(parse_duration("PT9999999999999999H0M0S"), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(" "), None);
        assert_eq!(parse_date("2010-09-01"), NaiveDate::from_ymd_opt(2010, 9, 1));
        assert_eq!(parse_date(" 1999-10-12 "), NaiveDate::from_ymd_opt(1999, 10, 12));
        assert_eq!(parse_date("19991012"), NaiveDate::from_ymd_opt(1999, 10, 12));
        assert_eq!(parse_date("12.10.1999"), NaiveDate::from_ymd_opt(1999, 10, 12));
        assert_eq!(parse_date("October 12, 1999"), NaiveDate::from_ymd_opt(1999, 10, 12));
        assert_eq!(parse_date("2010-09-01T10:00:00Z"), NaiveDate::from_ymd_opt(2010, 9, 1));
        assert_eq!(parse_date("garbage"), None);
        assert_eq!(parse_date("2010-13-45"), None);
    }

    #[test]
    fn test_coerce_runs_only_on_values() {
        assert_eq!(coerce(Kind::Integer, Value::from("7")), Value::Integer(7));
        assert_eq!(coerce(Kind::Integer, Value::Nil), Value::Nil);
        assert_eq!(coerce(Kind::Integer, Value::from("seven")), Value::Nil);
        assert_eq!(coerce(Kind::Boolean, Value::from("Y")), Value::Bool(true));
        assert_eq!(coerce(Kind::Text, Value::from("7")), Value::from("7"));
    }

    #[test]
    fn test_after_map_lookup_order() {
        let mut table = TransformTable::new();
        table.register("double", |v: Value| match v {
            Value::Text(s) => Value::Text(s.repeat(2)),
            other => other,
        });
        // value operations win over tables with the same name
        table.register("upcase", |_| Value::from("shadowed"));

        let names = vec!["upcase".to_string(), "double".to_string()];
        assert_eq!(
            apply_after_map(Value::from("Mos Def"), &names, &[&table]),
            Value::from("MOS DEFMOS DEF")
        );

        let unknown = vec!["no_such_transform".to_string()];
        assert_eq!(apply_after_map(Value::from("x"), &unknown, &[&table]), Value::from("x"));
        assert_eq!(apply_after_map(Value::Nil, &names, &[&table]), Value::Nil);
    }

    #[test]
    fn test_innermost_table_wins() {
        let mut inner = TransformTable::new();
        inner.register("tag", |_| Value::from("inner"));
        let mut outer = TransformTable::new();
        outer.register("tag", |_| Value::from("outer"));
        outer.register("parse_date", |_| Value::from("custom"));

        let tag = vec!["tag".to_string()];
        assert_eq!(apply_after_map(Value::from("x"), &tag, &[&inner, &outer]), Value::from("inner"));
        assert_eq!(apply_after_map(Value::from("x"), &tag, &[&outer]), Value::from("outer"));

        let date = vec!["parse_date".to_string()];
        assert_eq!(apply_after_map(Value::from("2010-09-01"), &date, &[&outer]), Value::from("custom"));
        assert_eq!(
            apply_after_map(Value::from("2010-09-01"), &date, &[]),
            Value::Date(NaiveDate::from_ymd_opt(2010, 9, 1).unwrap())
        );
    }
}
