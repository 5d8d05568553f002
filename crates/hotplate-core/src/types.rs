use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// A document body: a JSON object keyed by top-level field name.
pub type Document = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Timestamp: canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            seconds_since_epoch: now.timestamp() as u64,
            nanoseconds: now.timestamp_subsec_nanos(),
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    pub fn to_rfc3339(&self) -> String {
        let dt =
            chrono::DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds);
        dt.map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }
}

// ---------------------------------------------------------------------------
// Uid: identity-provider user id
// ---------------------------------------------------------------------------

/// User id issued by the identity provider and stamped on owned documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub String);

impl Uid {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// DocPath: slash-separated hierarchical document address
// ---------------------------------------------------------------------------

/// Hierarchical document address such as `pages/home/widgets/intro`.
///
/// Segments alternate collection / document id. A path always has at least
/// one segment and no segment is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(CoreError::InvalidPath(raw.to_string()));
        }
        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Prefix of the first `len` segments, or `None` if out of range.
    pub fn prefix(&self, len: usize) -> Option<DocPath> {
        if len == 0 || len > self.segments.len() {
            return None;
        }
        Some(Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Append a `collection/id` pair.
    pub fn child(&self, collection: &str, id: &str) -> DocPath {
        let mut segments = self.segments.clone();
        segments.push(collection.to_string());
        segments.push(id.to_string());
        Self { segments }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl TryFrom<String> for DocPath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DocPath::parse(&value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.to_string()
    }
}

// ---------------------------------------------------------------------------
// Document helpers
// ---------------------------------------------------------------------------

/// Top-level keys whose values differ between two bodies, including keys
/// present on only one side.
pub fn changed_fields(existing: &Document, proposed: &Document) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (key, value) in proposed {
        if existing.get(key) != Some(value) {
            changed.insert(key.clone());
        }
    }
    for key in existing.keys() {
        if !proposed.contains_key(key) {
            changed.insert(key.clone());
        }
    }
    changed
}

/// Shallow merge of `patch` over `base` (top-level keys replace).
pub fn merge_documents(base: &Document, patch: &Document) -> Document {
    let mut merged = base.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Read a top-level boolean flag; absent or non-boolean reads as `false`.
pub fn bool_field(doc: &Document, key: &str) -> bool {
    doc.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Read a top-level string field.
pub fn str_field<'a>(doc: &'a Document, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(|v| v.as_str())
}
