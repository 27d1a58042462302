//! Capabilities consumed from the backing stores.
//!
//! The stores in this crate only talk to these traits; concrete adapters
//! live under `backends`.

use crate::error::ClientError;
use crate::model::{Metadata, MetadataValue};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

/// Field map stored under a single key.
pub type Fields = HashMap<String, String>;

#[async_trait]
/// Key-value store with per-key expiry and list primitives.
///
/// Implementations must be safe for concurrent use and make each call atomic
/// for the key it touches.
pub trait KeyValueClient: Send + Sync {
    /// Replace the field map stored at `key`, optionally expiring it.
    async fn set_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<(), ClientError>;

    /// Read every field at `key`; `None` when the key is missing or expired.
    async fn get_all_fields(&self, key: &str) -> Result<Option<Fields>, ClientError>;

    /// Push a value onto the head of a list.
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), ClientError>;

    /// Keep only the inclusive `start..=end` range of a list.
    ///
    /// Negative indexes count from the tail.
    async fn list_trim(&self, key: &str, start: isize, end: isize) -> Result<(), ClientError>;

    /// Read the inclusive `start..=end` range of a list.
    async fn list_range(
        &self,
        key: &str,
        start: isize,
        end: isize,
    ) -> Result<Vec<String>, ClientError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize, ClientError>;

    /// List keys matching a glob pattern.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ClientError>;

    /// Push a value and trim the list to `max_len` as one operation.
    ///
    /// The default composes two calls; adapters that can do better should.
    async fn push_front_trimmed(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), ClientError> {
        self.list_push_front(key, value).await?;
        self.list_trim(key, 0, last_index(max_len)).await
    }
}

/// Inclusive end index that keeps `max_len` entries (at least one).
pub(crate) fn last_index(max_len: usize) -> isize {
    isize::try_from(max_len.max(1)).unwrap_or(isize::MAX) - 1
}

/// Document held by the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// Query hit with its distance to the query (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: VectorDocument,
    pub distance: f32,
}

/// Conjunction of metadata equality constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter(BTreeMap<String, MetadataValue>);

impl MetadataFilter {
    /// Filter on a single key.
    pub fn equals(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::default().and(key, value)
    }

    /// Add another equality constraint.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// True when the metadata satisfies every constraint.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// What a vector-store `get` should return.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorSelection {
    /// Exact ids.
    Ids(Vec<String>),
    /// Every document matching the filter, optionally capped.
    Filter {
        filter: MetadataFilter,
        limit: Option<usize>,
    },
}

#[async_trait]
/// Vector-indexed document store with metadata filtering.
///
/// Embedding is the adapter's business; callers only pass text.
pub trait VectorClient: Send + Sync {
    /// Insert or overwrite documents by id.
    async fn add(&self, documents: Vec<VectorDocument>) -> Result<(), ClientError>;

    /// Fetch documents by id or filter.
    async fn get(&self, selection: VectorSelection) -> Result<Vec<VectorDocument>, ClientError>;

    /// Rank documents matching `filter` by similarity to `query_text`.
    ///
    /// The filter is applied before ranking.
    async fn query(
        &self,
        query_text: &str,
        n_results: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>, ClientError>;

    /// Delete every document matching the filter, returning how many went away.
    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, ClientError>;
}

/// Run a client call under a deadline.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filter_matches_all_constraints() {
        let metadata = Metadata::new().with("owner", "u1").with("kind", "chat");
        assert!(MetadataFilter::equals("owner", "u1").matches(&metadata));
        assert!(
            !MetadataFilter::equals("owner", "u1")
                .and("kind", "note")
                .matches(&metadata)
        );
        assert!(MetadataFilter::default().matches(&metadata));
    }

    #[test]
    fn last_index_keeps_at_least_one_entry() {
        assert_eq!(last_index(100), 99);
        assert_eq!(last_index(0), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_timeout() {
        let result: Result<(), ClientError> = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }
}
