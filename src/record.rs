//! Element records: the tag sets the filters are evaluated against.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::dsl::parse_iso_date;

/// OSM element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable key → value tag map. Lookups of absent keys return `None`,
/// never an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Tags(HashMap<String, String>);

impl Tags {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, String>> for Tags {
    fn from(map: HashMap<String, String>) -> Self {
        Tags(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One map feature as supplied by the data layer.
///
/// JSON form: `{"type": "node", "id": 1, "tags": {...}, "edited": "2021-05-03"}`.
/// `timestamp` (RFC 3339 or Unix seconds) is read when `edited` is missing or
/// unreadable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawElementRecord")]
pub struct ElementRecord {
    pub kind: ElementKind,
    pub id: i64,
    pub tags: Tags,
    /// Date of the last edit of the element, if known.
    pub edited: Option<Date>,
}

#[derive(Deserialize)]
struct RawElementRecord {
    #[serde(rename = "type")]
    kind: ElementKind,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    tags: Tags,
    #[serde(default)]
    edited: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
}

// Real-world dumps carry odd timestamps; an unreadable one just means "unknown".
impl From<RawElementRecord> for ElementRecord {
    fn from(raw: RawElementRecord) -> Self {
        let edited = raw
            .edited
            .as_ref()
            .and_then(edit_date_from_value)
            .or_else(|| raw.timestamp.as_ref().and_then(edit_date_from_value));
        Self {
            kind: raw.kind,
            id: raw.id,
            tags: raw.tags,
            edited,
        }
    }
}

impl ElementRecord {
    pub fn new(kind: ElementKind, tags: Tags) -> Self {
        Self {
            kind,
            id: 0,
            tags,
            edited: None,
        }
    }

    pub fn edited_on(mut self, date: Date) -> Self {
        self.edited = Some(date);
        self
    }
}

/// Parse an edit date from `YYYY-MM-DD` or an RFC 3339 timestamp (reduced to
/// its UTC date). Unparsable values yield `None`.
pub fn parse_edit_date(value: &str) -> Option<Date> {
    if let Some(date) = parse_iso_date(value) {
        return Some(date);
    }
    let timestamp = OffsetDateTime::parse(value.trim(), &Rfc3339).ok()?;
    Some(timestamp.to_offset(UtcOffset::UTC).date())
}

fn edit_date_from_value(value: &Value) -> Option<Date> {
    match value {
        Value::String(text) => parse_edit_date(text),
        Value::Number(seconds) => {
            let seconds = seconds.as_i64()?;
            Some(OffsetDateTime::from_unix_timestamp(seconds).ok()?.date())
        }
        _ => None,
    }
}
