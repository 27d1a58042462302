//! Memory record model shared by both tiers.

use crate::error::MemoryError;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Metadata key holding the record owner.
pub const OWNER_KEY: &str = "owner";
/// Metadata key holding the creation timestamp (RFC 3339).
pub const CREATED_AT_KEY: &str = "created_at";

const RESERVED_KEYS: &[&str] = &[OWNER_KEY, CREATED_AT_KEY];
const ID_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";
const ID_SUFFIX_LEN: usize = 12;

/// Storage tier a record lives in or was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// TTL-bounded key-value tier.
    ShortTerm,
    /// Durable, semantically searchable tier.
    LongTerm,
}

impl Tier {
    /// Stable string tag for the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::ShortTerm => "short_term",
            Tier::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar metadata value. Nested arrays and objects are not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Borrow the value as a string if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(value) => write!(f, "{value}"),
            MetadataValue::Integer(value) => write!(f, "{value}"),
            MetadataValue::Float(value) => write!(f, "{value}"),
            MetadataValue::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Integer(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl TryFrom<serde_json::Value> for MetadataValue {
    type Error = MemoryError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Bool(value) => Ok(MetadataValue::Bool(value)),
            serde_json::Value::String(value) => Ok(MetadataValue::String(value)),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(MetadataValue::Integer)
                .or_else(|| number.as_f64().map(MetadataValue::Float))
                .ok_or_else(|| MemoryError::validation(format!("unsupported number: {number}"))),
            serde_json::Value::Null => Err(MemoryError::validation(
                "metadata values must not be null",
            )),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
                MemoryError::validation("metadata values must be scalars"),
            ),
        }
    }
}

/// Key-ordered metadata attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    /// Create an empty metadata map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Option<MetadataValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// Look up a string-valued key.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(MetadataValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// True when every entry of `other` is present here with an equal value.
    pub fn contains_all(&self, other: &Metadata) -> bool {
        other
            .iter()
            .all(|(key, value)| self.0.get(key) == Some(value))
    }

    /// Reject caller-supplied keys that the system owns.
    pub fn ensure_no_reserved_keys(&self) -> Result<(), MemoryError> {
        for key in RESERVED_KEYS {
            if self.0.contains_key(*key) {
                return Err(MemoryError::validation(format!(
                    "metadata key `{key}` is reserved"
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<serde_json::Value> for Metadata {
    type Error = MemoryError;

    /// Accept only a JSON object whose values are scalars.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let serde_json::Value::Object(map) = value else {
            return Err(MemoryError::validation(
                "metadata must be a key-value mapping",
            ));
        };
        let mut metadata = Metadata::new();
        for (key, value) in map {
            let value = MetadataValue::try_from(value).map_err(|err| {
                MemoryError::validation(format!("metadata key `{key}`: {err}"))
            })?;
            metadata.insert(key, value);
        }
        Ok(metadata)
    }
}

/// Identifier shared by both tiers for the same logical record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Derive an id from the owner and creation instant.
    ///
    /// The owner and timestamp form a prefix that identifies who wrote the
    /// record and when; a random suffix keeps same-instant writes distinct.
    pub fn generate(owner: &str, created_at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}:{}:{}",
            escape_owner(owner),
            created_at.format(ID_TIME_FORMAT),
            &suffix[..ID_SUFFIX_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MemoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for MemoryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MemoryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Percent-encode the characters that delimit id segments.
pub(crate) fn escape_owner(owner: &str) -> String {
    let mut escaped = String::with_capacity(owner.len());
    for ch in owner.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Format a timestamp the way both tiers persist it.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a persisted timestamp.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

/// A single memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Identifier shared across tiers.
    pub id: MemoryId,
    /// User or session that created the record.
    pub owner: String,
    /// Immutable text payload.
    pub content: String,
    /// Caller metadata plus the `owner` and `created_at` keys.
    pub metadata: Metadata,
    /// Creation instant, microsecond precision.
    pub created_at: DateTime<Utc>,
    /// Short-term expiry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}

impl MemoryRecord {
    /// Create a record stamped with the current instant.
    pub fn new(
        owner: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
        ttl: Option<Duration>,
    ) -> Self {
        Self::created_at(owner, content, metadata, Utc::now(), ttl)
    }

    /// Create a record for an explicit creation instant.
    pub fn created_at(
        owner: impl Into<String>,
        content: impl Into<String>,
        mut metadata: Metadata,
        created_at: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Self {
        let owner = owner.into();
        let created_at = created_at.trunc_subsecs(6);
        metadata.insert(OWNER_KEY, owner.clone());
        metadata.insert(CREATED_AT_KEY, format_timestamp(&created_at));
        Self {
            id: MemoryId::generate(&owner, created_at),
            owner,
            content: content.into(),
            metadata,
            created_at,
            ttl,
        }
    }
}

/// A record together with the tier that answered the lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalledMemory {
    pub record: MemoryRecord,
    pub source: Tier,
}

/// Typed request accepted by `MemoryCoordinator::store_memory`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMemoryRequest {
    pub owner: String,
    pub content: String,
    pub metadata: Metadata,
}

impl StoreMemoryRequest {
    pub fn new(owner: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Replace the request metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add one metadata entry.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Adapt a loosely shaped JSON payload at the caller boundary.
    ///
    /// Accepts `{ "owner" | "user_id": .., "content": .., "metadata": {..} }`;
    /// the owner may also come from `metadata.user_id`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, MemoryError> {
        let serde_json::Value::Object(mut map) = value else {
            return Err(MemoryError::validation("request must be a JSON object"));
        };
        let content = match map.remove("content") {
            Some(serde_json::Value::String(content)) => content,
            Some(_) => return Err(MemoryError::validation("content must be a string")),
            None => return Err(MemoryError::validation("missing content")),
        };
        let metadata = match map.remove("metadata") {
            None | Some(serde_json::Value::Null) => Metadata::new(),
            Some(value) => Metadata::try_from(value)?,
        };
        let owner = ["owner", "user_id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(serde_json::Value::as_str))
            .map(str::to_string)
            .or_else(|| metadata.get_str("user_id").map(str::to_string))
            .ok_or_else(|| MemoryError::validation("missing owner"))?;
        Ok(Self {
            owner,
            content,
            metadata,
        })
    }

    /// Check the request before any store I/O.
    pub fn validate(&self) -> Result<(), MemoryError> {
        validate_owner_and_content(&self.owner, &self.content)?;
        self.metadata.ensure_no_reserved_keys()
    }
}

/// Shared owner/content validation for every write path.
pub(crate) fn validate_owner_and_content(owner: &str, content: &str) -> Result<(), MemoryError> {
    if owner.trim().is_empty() {
        return Err(MemoryError::validation("owner must not be empty"));
    }
    if content.trim().is_empty() {
        return Err(MemoryError::validation("content must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn record_metadata_carries_owner_and_created_at() {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let record = MemoryRecord::created_at(
            "u1",
            "hello",
            Metadata::new().with("topic", "greeting"),
            created_at,
            None,
        );
        assert_eq!(record.metadata.get_str(OWNER_KEY), Some("u1"));
        assert_eq!(
            record.metadata.get_str(CREATED_AT_KEY),
            Some("2024-05-01T12:30:00.000000Z")
        );
        assert_eq!(record.metadata.get_str("topic"), Some("greeting"));
        assert!(record.id.as_str().starts_with("u1:20240501T123000.000000Z:"));
    }

    #[test]
    fn ids_for_the_same_instant_do_not_collide() {
        let now = Utc::now();
        let first = MemoryId::generate("u1", now);
        let second = MemoryId::generate("u1", now);
        assert_ne!(first, second);
    }

    #[test]
    fn owner_delimiters_are_escaped_in_ids() {
        assert_eq!(escape_owner("team:a%b"), "team%3Aa%25b");
        let id = MemoryId::generate("team:a", Utc::now());
        assert!(id.as_str().starts_with("team%3Aa:"));
    }

    #[test]
    fn metadata_rejects_non_mapping_json() {
        let err = Metadata::try_from(json!("just a string")).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
        let err = Metadata::try_from(json!({ "nested": { "a": 1 } })).unwrap_err();
        assert!(err.to_string().contains("nested"));
    }

    #[test]
    fn metadata_accepts_scalars() {
        let metadata =
            Metadata::try_from(json!({ "index": 3, "score": 0.5, "flag": true, "tag": "x" }))
                .expect("metadata");
        assert_eq!(metadata.get("index"), Some(&MetadataValue::Integer(3)));
        assert_eq!(metadata.get("score"), Some(&MetadataValue::Float(0.5)));
        assert_eq!(metadata.get("flag"), Some(&MetadataValue::Bool(true)));
        assert_eq!(metadata.get_str("tag"), Some("x"));
    }

    #[test]
    fn request_from_json_reads_owner_from_metadata() {
        let request = StoreMemoryRequest::from_json(json!({
            "content": "hello",
            "metadata": { "user_id": "u7", "kind": "chat" }
        }))
        .expect("request");
        assert_eq!(request.owner, "u7");
        assert_eq!(request.metadata.get_str("kind"), Some("chat"));
    }

    #[test]
    fn request_from_json_rejects_scalar_metadata() {
        let err = StoreMemoryRequest::from_json(json!({
            "owner": "u1",
            "content": "hello",
            "metadata": 42
        }))
        .unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn request_validation_rejects_empty_fields_and_reserved_keys() {
        assert!(StoreMemoryRequest::new("", "x").validate().is_err());
        assert!(StoreMemoryRequest::new("u1", "  ").validate().is_err());
        let reserved = StoreMemoryRequest::new("u1", "x").with_entry(OWNER_KEY, "other");
        assert!(reserved.validate().is_err());
        assert!(StoreMemoryRequest::new("u1", "x").validate().is_ok());
    }
}
