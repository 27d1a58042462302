//! Short-term tier: TTL-bounded records plus a per-owner recency list.

use crate::client::{Fields, KeyValueClient, with_deadline};
use crate::error::{ClientError, MemoryError};
use crate::model::{
    MemoryId, MemoryRecord, Metadata, Tier, escape_owner, format_timestamp, parse_timestamp,
    validate_owner_and_content,
};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Default number of ids kept in an owner's recency list.
pub const DEFAULT_MAX_RECENT: usize = 100;
/// Default deadline for a single key-value call.
pub const DEFAULT_SHORT_TERM_TIMEOUT: Duration = Duration::from_secs(2);

const RECORD_KEY_PREFIX: &str = "memory:";
const FIELD_OWNER: &str = "owner";
const FIELD_CONTENT: &str = "content";
const FIELD_METADATA: &str = "metadata";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_TTL_MS: &str = "ttl_ms";

/// Tuning for the short-term store.
#[derive(Debug, Clone)]
pub struct ShortTermOptions {
    /// Maximum ids kept per owner in the recency list.
    pub max_recent: usize,
    /// Deadline applied to every key-value call.
    pub call_timeout: Duration,
}

impl Default for ShortTermOptions {
    fn default() -> Self {
        Self {
            max_recent: DEFAULT_MAX_RECENT,
            call_timeout: DEFAULT_SHORT_TERM_TIMEOUT,
        }
    }
}

/// Exact-key storage with expiry and a bounded recency index per owner.
#[derive(Clone)]
pub struct ShortTermStore {
    client: Arc<dyn KeyValueClient>,
    options: ShortTermOptions,
}

impl ShortTermStore {
    pub fn new(client: Arc<dyn KeyValueClient>) -> Self {
        Self::with_options(client, ShortTermOptions::default())
    }

    pub fn with_options(client: Arc<dyn KeyValueClient>, options: ShortTermOptions) -> Self {
        Self { client, options }
    }

    pub fn options(&self) -> &ShortTermOptions {
        &self.options
    }

    /// Create and store a new record, returning its id.
    ///
    /// Connectivity failures are returned: the caller cannot assume the
    /// write happened.
    pub async fn store(
        &self,
        owner: &str,
        content: &str,
        metadata: Metadata,
        ttl: Option<Duration>,
    ) -> Result<MemoryId, MemoryError> {
        validate_owner_and_content(owner, content)?;
        metadata.ensure_no_reserved_keys()?;
        let record = MemoryRecord::new(owner, content, metadata, ttl);
        self.put(&record).await?;
        Ok(record.id)
    }

    /// Store an already-built record under its own id.
    pub async fn put(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        validate_owner_and_content(&record.owner, &record.content)?;
        let fields = encode_record(record)?;
        let key = record_key(&record.id);
        self.call(self.client.set_fields(&key, &fields, record.ttl))
            .await?;
        self.call(self.client.push_front_trimmed(
            &recent_key(&record.owner),
            record.id.as_str(),
            self.options.max_recent,
        ))
        .await?;
        debug!(
            "stored short-term record (id={}, owner={}, ttl={:?})",
            record.id, record.owner, record.ttl
        );
        Ok(())
    }

    /// Fetch a live record; read failures degrade to `None`.
    pub async fn get(&self, id: &MemoryId) -> Option<MemoryRecord> {
        match self.try_get(id).await {
            Ok(record) => record,
            Err(err) => {
                warn!("short-term get failed (id={id}): {err}");
                None
            }
        }
    }

    /// Fetch a live record, surfacing store failures.
    ///
    /// A hash that cannot be decoded is logged and treated as absent.
    pub(crate) async fn try_get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>, MemoryError> {
        let fields = self.call(self.client.get_all_fields(&record_key(id))).await?;
        let Some(fields) = fields else {
            return Ok(None);
        };
        match decode_record(id, fields) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!("skipping unreadable short-term record (id={id}): {err}");
                Ok(None)
            }
        }
    }

    /// Most recently stored live records for an owner, newest first.
    ///
    /// Expired ids still present in the recency list are skipped.
    pub async fn get_recent(&self, owner: &str, limit: usize) -> Vec<MemoryRecord> {
        if limit == 0 || owner.trim().is_empty() {
            return Vec::new();
        }
        match self.try_get_recent(owner, limit).await {
            Ok(records) => records,
            Err(err) => {
                warn!("short-term recent lookup failed (owner={owner}): {err}");
                Vec::new()
            }
        }
    }

    async fn try_get_recent(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let ids = self
            .call(self.client.list_range(&recent_key(owner), 0, -1))
            .await?;
        let mut records = Vec::with_capacity(limit.min(ids.len()));
        for id in ids {
            if records.len() >= limit {
                break;
            }
            if let Some(record) = self.try_get(&MemoryId::from(id)).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Remove every record of an owner plus the recency list.
    ///
    /// Idempotent. Returns `false` (after logging) when the store failed.
    pub async fn clear(&self, owner: &str) -> bool {
        match self.try_clear(owner).await {
            Ok(removed) => {
                debug!("cleared short-term records (owner={owner}, removed={removed})");
                true
            }
            Err(err) => {
                warn!("short-term clear failed (owner={owner}): {err}");
                false
            }
        }
    }

    async fn try_clear(&self, owner: &str) -> Result<usize, MemoryError> {
        let list_key = recent_key(owner);
        let mut keys: BTreeSet<String> = self
            .call(self.client.list_range(&list_key, 0, -1))
            .await?
            .into_iter()
            .map(|id| record_key(&MemoryId::from(id)))
            .collect();
        // Records trimmed off the recency list are still reachable by prefix.
        keys.extend(self.call(self.client.scan(&owner_pattern(owner))).await?);
        keys.insert(list_key);
        let keys: Vec<String> = keys.into_iter().collect();
        self.call(self.client.delete(&keys)).await
    }

    async fn call<T, F>(&self, call: F) -> Result<T, MemoryError>
    where
        F: std::future::Future<Output = Result<T, ClientError>>,
    {
        with_deadline(self.options.call_timeout, call)
            .await
            .map_err(|err| MemoryError::unavailable(Tier::ShortTerm, err))
    }
}

fn record_key(id: &MemoryId) -> String {
    format!("{RECORD_KEY_PREFIX}{id}")
}

fn recent_key(owner: &str) -> String {
    format!("owner:{}:recent", escape_owner(owner))
}

/// Glob matching every record key written for `owner`.
fn owner_pattern(owner: &str) -> String {
    format!(
        "{RECORD_KEY_PREFIX}{}:*",
        escape_glob(&escape_owner(owner))
    )
}

fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn encode_record(record: &MemoryRecord) -> Result<Fields, MemoryError> {
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|err| MemoryError::validation(format!("unserializable metadata: {err}")))?;
    let mut fields = Fields::new();
    fields.insert(FIELD_OWNER.to_string(), record.owner.clone());
    fields.insert(FIELD_CONTENT.to_string(), record.content.clone());
    fields.insert(FIELD_METADATA.to_string(), metadata);
    fields.insert(
        FIELD_CREATED_AT.to_string(),
        format_timestamp(&record.created_at),
    );
    if let Some(ttl) = record.ttl {
        fields.insert(FIELD_TTL_MS.to_string(), ttl.as_millis().to_string());
    }
    Ok(fields)
}

fn decode_record(id: &MemoryId, mut fields: Fields) -> Result<MemoryRecord, ClientError> {
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| ClientError::Decode(format!("record {id} is missing `{name}`")))
    };
    let owner = take(FIELD_OWNER)?;
    let content = take(FIELD_CONTENT)?;
    let created_at_raw = take(FIELD_CREATED_AT)?;
    let metadata: Metadata = match fields.remove(FIELD_METADATA) {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Metadata::new(),
    };
    let created_at = parse_timestamp(&created_at_raw).ok_or_else(|| {
        ClientError::Decode(format!("record {id} has invalid created_at `{created_at_raw}`"))
    })?;
    let ttl = fields
        .get(FIELD_TTL_MS)
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis);
    Ok(MemoryRecord {
        id: id.clone(),
        owner,
        content,
        metadata,
        created_at,
        ttl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryKeyValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn owner_pattern_escapes_glob_characters() {
        assert_eq!(owner_pattern("u1"), "memory:u1:*");
        assert_eq!(owner_pattern("a*b:c"), "memory:a\\*b%3Ac:*");
    }

    #[test]
    fn recent_key_escapes_owner_like_record_keys() {
        assert_eq!(recent_key("u1"), "owner:u1:recent");
        assert_eq!(recent_key("team:a%b"), "owner:team%3Aa%25b:recent");
    }

    #[tokio::test]
    async fn unreadable_record_is_skipped_in_recent() {
        let client = Arc::new(InMemoryKeyValue::new());
        let store = ShortTermStore::new(client.clone());
        let broken = MemoryId::from("u1:19700101T000000.000000Z:000000000000");
        let garbage = Fields::from([(FIELD_OWNER.to_string(), "u1".to_string())]);
        client
            .set_fields(&record_key(&broken), &garbage, None)
            .await
            .expect("set");
        client
            .list_push_front(&recent_key("u1"), broken.as_str())
            .await
            .expect("push");
        store
            .store("u1", "still readable", Metadata::new(), None)
            .await
            .expect("store");

        let recent = store.get_recent("u1", 10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "still readable");
        assert_eq!(store.get(&broken).await, None);
    }

    #[test]
    fn encoded_record_round_trips_through_fields() {
        let record = MemoryRecord::new(
            "u1",
            "remember this",
            Metadata::new().with("index", 2),
            Some(Duration::from_secs(60)),
        );
        let fields = encode_record(&record).expect("encode");
        assert_eq!(fields.get("ttl_ms").map(String::as_str), Some("60000"));
        let decoded = decode_record(&record.id, fields).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn decode_reports_missing_fields() {
        let id = MemoryId::from("u1:x:y");
        let err = decode_record(&id, Fields::new()).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
