//! Process-local key-value store with per-key expiry.

use crate::client::{Fields, KeyValueClient, last_index};
use crate::error::ClientError;
use async_trait::async_trait;
use globset::GlobBuilder;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Fields(Fields),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Minimum spacing between full sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// In-memory [`KeyValueClient`] for tests and single-process use.
///
/// Expiry follows the tokio clock, so paused-time tests can advance it.
/// Expired entries are dropped when read and swept on writes.
#[derive(Debug, Default)]
pub struct InMemoryKeyValue {
    entries: Mutex<HashMap<String, Entry>>,
    next_sweep: Mutex<Option<Instant>>,
}

impl InMemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys matching a glob, sorted.
    fn matching_keys(&self, pattern: &str) -> Result<Vec<String>, ClientError> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|err| ClientError::Protocol(format!("invalid scan pattern: {err}")))?
            .compile_matcher();
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl InMemoryKeyValue {
    /// Drop every expired entry, at most once per [`SWEEP_INTERVAL`].
    fn sweep_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let mut next_sweep = self.next_sweep.lock();
        if next_sweep.is_some_and(|at| now < at) {
            return;
        }
        entries.retain(|_, entry| entry.is_live(now));
        *next_sweep = Some(now + SWEEP_INTERVAL);
    }
}

/// Drop an expired entry so callers only ever see live values.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> ClientError {
    ClientError::Protocol(format!("key `{key}` holds the wrong kind of value"))
}

/// Resolve an inclusive index range the way Redis list commands do.
fn resolve_range(len: usize, start: isize, end: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if len == 0 || start > end || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?))
}

fn trim_list(list: &mut VecDeque<String>, start: isize, end: isize) {
    match resolve_range(list.len(), start, end) {
        Some((start, end)) => {
            list.truncate(end + 1);
            list.drain(..start);
        }
        None => list.clear(),
    }
}

fn push_front(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    value: &str,
    now: Instant,
) -> Result<(), ClientError> {
    match live_entry(entries, key, now) {
        Some(Entry {
            value: Value::List(list),
            ..
        }) => list.push_front(value.to_string()),
        Some(_) => return Err(wrong_type(key)),
        None => {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::from([value.to_string()])),
                    expires_at: None,
                },
            );
        }
    }
    Ok(())
}

fn trim(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    start: isize,
    end: isize,
    now: Instant,
) -> Result<(), ClientError> {
    let emptied = match live_entry(entries, key, now) {
        Some(Entry {
            value: Value::List(list),
            ..
        }) => {
            trim_list(list, start, end);
            list.is_empty()
        }
        Some(_) => return Err(wrong_type(key)),
        None => false,
    };
    if emptied {
        entries.remove(key);
    }
    Ok(())
}

#[async_trait]
impl KeyValueClient for InMemoryKeyValue {
    async fn set_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<(), ClientError> {
        let now = Instant::now();
        let entry = Entry {
            value: Value::Fields(fields.clone()),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries, now);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_all_fields(&self, key: &str) -> Result<Option<Fields>, ClientError> {
        let mut entries = self.entries.lock();
        match live_entry(&mut entries, key, Instant::now()) {
            Some(Entry {
                value: Value::Fields(fields),
                ..
            }) => Ok(Some(fields.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries, now);
        push_front(&mut entries, key, value, now)
    }

    async fn list_trim(&self, key: &str, start: isize, end: isize) -> Result<(), ClientError> {
        trim(&mut self.entries.lock(), key, start, end, Instant::now())
    }

    async fn list_range(
        &self,
        key: &str,
        start: isize,
        end: isize,
    ) -> Result<Vec<String>, ClientError> {
        let mut entries = self.entries.lock();
        match live_entry(&mut entries, key, Instant::now()) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(match resolve_range(list.len(), start, end) {
                Some((start, end)) => list.range(start..=end).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, ClientError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ClientError> {
        self.matching_keys(pattern)
    }

    async fn push_front_trimmed(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), ClientError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.sweep_expired(&mut entries, now);
        push_front(&mut entries, key, value, now)?;
        trim(&mut entries, key, 0, last_index(max_len), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(content: &str) -> Fields {
        Fields::from([("content".to_string(), content.to_string())])
    }

    #[test]
    fn ranges_follow_redis_indexing() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 1, 100), Some((1, 4)));
        assert_eq!(resolve_range(5, 3, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn fields_expire_after_ttl() {
        let store = InMemoryKeyValue::new();
        store
            .set_fields("k", &fields("x"), Some(Duration::from_secs(1)))
            .await
            .expect("set");
        assert!(store.get_all_fields("k").await.expect("get").is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get_all_fields("k").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_entries_that_are_never_read() {
        let store = InMemoryKeyValue::new();
        for index in 0..1000 {
            store
                .set_fields(
                    &format!("memory:u1:{index}"),
                    &fields("x"),
                    Some(Duration::from_secs(1)),
                )
                .await
                .expect("set");
        }
        assert_eq!(store.entries.lock().len(), 1000);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.set_fields("fresh", &fields("y"), None).await.expect("set");
        assert_eq!(store.entries.lock().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn push_front_trimmed_bounds_the_list() {
        let store = InMemoryKeyValue::new();
        for index in 0..5 {
            store
                .push_front_trimmed("recent", &index.to_string(), 3)
                .await
                .expect("push");
        }
        let items = store.list_range("recent", 0, -1).await.expect("range");
        assert_eq!(items, vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn scan_matches_prefix_and_honours_escapes() {
        let store = InMemoryKeyValue::new();
        for key in ["memory:u1:a", "memory:u1:b", "memory:u10:c", "memory:u*:d"] {
            store.set_fields(key, &fields("x"), None).await.expect("set");
        }
        let keys = store.scan("memory:u1:*").await.expect("scan");
        assert_eq!(keys, vec!["memory:u1:a", "memory:u1:b"]);
        let keys = store.scan("memory:u\\*:*").await.expect("scan");
        assert_eq!(keys, vec!["memory:u*:d"]);
    }

    #[tokio::test]
    async fn delete_counts_existing_keys() {
        let store = InMemoryKeyValue::new();
        store.set_fields("a", &fields("x"), None).await.expect("set");
        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .expect("delete");
        assert_eq!(removed, 1);
        assert_eq!(store.delete(&["a".to_string()]).await.expect("delete"), 0);
    }

    #[tokio::test]
    async fn lists_and_fields_do_not_mix() {
        let store = InMemoryKeyValue::new();
        store.list_push_front("k", "v").await.expect("push");
        assert!(matches!(
            store.get_all_fields("k").await,
            Err(ClientError::Protocol(_))
        ));
    }
}
