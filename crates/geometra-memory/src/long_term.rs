//! Long-term tier: durable documents with semantic search.

use crate::client::{
    MetadataFilter, ScoredDocument, VectorClient, VectorDocument, VectorSelection, with_deadline,
};
use crate::error::{ClientError, MemoryError};
use crate::model::{
    CREATED_AT_KEY, MemoryId, MemoryRecord, Metadata, OWNER_KEY, Tier, format_timestamp,
    parse_timestamp,
};
use chrono::Utc;
use log::{debug, warn};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for a single vector-store call.
pub const DEFAULT_LONG_TERM_TIMEOUT: Duration = Duration::from_secs(5);
/// Candidates fetched per requested search result, so recency can break
/// distance ties that straddle the limit.
const SEARCH_CANDIDATES_PER_RESULT: usize = 4;

/// Tuning for the long-term store.
#[derive(Debug, Clone)]
pub struct LongTermOptions {
    /// Deadline applied to every vector-store call.
    pub call_timeout: Duration,
}

impl Default for LongTermOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_LONG_TERM_TIMEOUT,
        }
    }
}

/// Semantically searchable storage keyed by the shared id space.
#[derive(Clone)]
pub struct LongTermStore {
    client: Arc<dyn VectorClient>,
    options: LongTermOptions,
}

impl LongTermStore {
    pub fn new(client: Arc<dyn VectorClient>) -> Self {
        Self::with_options(client, LongTermOptions::default())
    }

    pub fn with_options(client: Arc<dyn VectorClient>, options: LongTermOptions) -> Self {
        Self { client, options }
    }

    /// Upsert a document by id.
    ///
    /// `metadata` must carry the `owner` key; `created_at` is stamped when
    /// missing. Calling this twice with the same id overwrites.
    pub async fn store(
        &self,
        id: &MemoryId,
        content: &str,
        mut metadata: Metadata,
    ) -> Result<(), MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::validation("content must not be empty"));
        }
        match metadata.get_str(OWNER_KEY) {
            Some(owner) if !owner.trim().is_empty() => {}
            _ => {
                return Err(MemoryError::validation(format!(
                    "long-term metadata must carry a non-empty `{OWNER_KEY}`"
                )));
            }
        }
        if !metadata.contains_key(CREATED_AT_KEY) {
            metadata.insert(CREATED_AT_KEY, format_timestamp(&Utc::now()));
        }
        let document = VectorDocument {
            id: id.to_string(),
            document: content.to_string(),
            metadata,
        };
        self.call(self.client.add(vec![document])).await?;
        debug!("stored long-term record (id={id})");
        Ok(())
    }

    /// Upsert a record built by the short-term tier.
    pub async fn store_record(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        self.store(&record.id, &record.content, record.metadata.clone())
            .await
    }

    /// Fetch one record; failures degrade to `None`.
    pub async fn get(&self, id: &MemoryId) -> Option<MemoryRecord> {
        let selection = VectorSelection::Ids(vec![id.to_string()]);
        let documents = match self.call(self.client.get(selection)).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!("long-term get failed (id={id}): {err}");
                return None;
            }
        };
        let document = documents.into_iter().find(|doc| doc.id == id.as_str())?;
        match record_from_document(document) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("long-term record is unreadable (id={id}): {err}");
                None
            }
        }
    }

    /// Records of one owner, newest first, at most `limit`.
    pub async fn get_by_owner(&self, owner: &str, limit: usize) -> Vec<MemoryRecord> {
        if limit == 0 || owner.trim().is_empty() {
            return Vec::new();
        }
        // Recency ordering needs every candidate; the store cannot sort by metadata.
        let selection = VectorSelection::Filter {
            filter: MetadataFilter::equals(OWNER_KEY, owner),
            limit: None,
        };
        let documents = match self.call(self.client.get(selection)).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!("long-term owner lookup failed (owner={owner}): {err}");
                return Vec::new();
            }
        };
        let mut records = owned_records(owner, documents);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        records
    }

    /// Rank an owner's records by similarity to `query_text`.
    ///
    /// The owner filter is handed to the store so ranking only ever sees
    /// that owner's documents. Equal distances go to the newer record.
    pub async fn search(&self, owner: &str, query_text: &str, limit: usize) -> Vec<MemoryRecord> {
        if limit == 0 || owner.trim().is_empty() {
            return Vec::new();
        }
        if query_text.trim().is_empty() {
            return self.get_by_owner(owner, limit).await;
        }
        let filter = MetadataFilter::equals(OWNER_KEY, owner);
        let candidates = limit.saturating_mul(SEARCH_CANDIDATES_PER_RESULT);
        let hits = match self
            .call(self.client.query(query_text, candidates, &filter))
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!("long-term search failed (owner={owner}): {err}");
                return Vec::new();
            }
        };
        rank_hits(owner, hits, limit)
    }

    /// Delete every record of an owner, returning how many were removed.
    pub async fn purge(&self, owner: &str) -> Result<usize, MemoryError> {
        if owner.trim().is_empty() {
            return Err(MemoryError::validation("owner must not be empty"));
        }
        let removed = self
            .call(
                self.client
                    .delete(&MetadataFilter::equals(OWNER_KEY, owner)),
            )
            .await?;
        debug!("purged long-term records (owner={owner}, removed={removed})");
        Ok(removed)
    }

    async fn call<T, F>(&self, call: F) -> Result<T, MemoryError>
    where
        F: std::future::Future<Output = Result<T, ClientError>>,
    {
        with_deadline(self.options.call_timeout, call)
            .await
            .map_err(|err| MemoryError::unavailable(Tier::LongTerm, err))
    }
}

fn owned_records(owner: &str, documents: Vec<VectorDocument>) -> Vec<MemoryRecord> {
    documents
        .into_iter()
        .filter_map(|document| {
            let id = document.id.clone();
            match record_from_document(document) {
                Ok(record) if record.owner == owner => Some(record),
                Ok(_) => None,
                Err(err) => {
                    warn!("skipping unreadable long-term record (id={id}): {err}");
                    None
                }
            }
        })
        .collect()
}

fn rank_hits(owner: &str, hits: Vec<ScoredDocument>, limit: usize) -> Vec<MemoryRecord> {
    let mut ranked: Vec<(f32, MemoryRecord)> = hits
        .into_iter()
        .filter_map(|hit| {
            let distance = hit.distance;
            owned_records(owner, vec![hit.document])
                .pop()
                .map(|record| (distance, record))
        })
        .collect();
    ranked.sort_by(|(da, a), (db, b)| match da.total_cmp(db) {
        Ordering::Equal => b.created_at.cmp(&a.created_at),
        ordering => ordering,
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, record)| record)
        .collect()
}

fn record_from_document(document: VectorDocument) -> Result<MemoryRecord, ClientError> {
    let owner = document
        .metadata
        .get_str(OWNER_KEY)
        .map(str::to_string)
        .ok_or_else(|| ClientError::Decode(format!("document {} has no owner", document.id)))?;
    let created_at = document
        .metadata
        .get_str(CREATED_AT_KEY)
        .and_then(parse_timestamp)
        .ok_or_else(|| {
            ClientError::Decode(format!("document {} has no valid created_at", document.id))
        })?;
    Ok(MemoryRecord {
        id: MemoryId::from(document.id),
        owner,
        content: document.document,
        metadata: document.metadata,
        created_at,
        ttl: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryVectorStore;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use pretty_assertions::assert_eq;

    fn document(id: &str, owner: &str, seconds: i64) -> VectorDocument {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + ChronoDuration::seconds(seconds);
        VectorDocument {
            id: id.to_string(),
            document: format!("content of {id}"),
            metadata: Metadata::new()
                .with(OWNER_KEY, owner)
                .with(CREATED_AT_KEY, format_timestamp(&created_at)),
        }
    }

    #[test]
    fn equal_distances_prefer_newer_records() {
        let hits = vec![
            ScoredDocument {
                document: document("old", "u1", 1),
                distance: 0.2,
            },
            ScoredDocument {
                document: document("new", "u1", 5),
                distance: 0.2,
            },
            ScoredDocument {
                document: document("best", "u1", 0),
                distance: 0.1,
            },
        ];
        let ids: Vec<String> = rank_hits("u1", hits, 10)
            .into_iter()
            .map(|record| record.id.to_string())
            .collect();
        assert_eq!(ids, vec!["best", "new", "old"]);
    }

    /// Returns its hits in a fixed order, cut to `n_results` like a real store.
    struct FixedHits(Vec<ScoredDocument>);

    #[async_trait::async_trait]
    impl VectorClient for FixedHits {
        async fn add(&self, _documents: Vec<VectorDocument>) -> Result<(), ClientError> {
            Ok(())
        }

        async fn get(
            &self,
            _selection: VectorSelection,
        ) -> Result<Vec<VectorDocument>, ClientError> {
            Ok(Vec::new())
        }

        async fn query(
            &self,
            _query_text: &str,
            n_results: usize,
            _filter: &MetadataFilter,
        ) -> Result<Vec<ScoredDocument>, ClientError> {
            Ok(self.0.iter().take(n_results).cloned().collect())
        }

        async fn delete(&self, _filter: &MetadataFilter) -> Result<usize, ClientError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn search_tie_at_limit_goes_to_newer_record() {
        let tied = |id: &str, seconds: i64| ScoredDocument {
            document: document(id, "u1", seconds),
            distance: 0.0,
        };
        let store = LongTermStore::new(Arc::new(FixedHits(vec![tied("old", 0), tied("new", 60)])));
        let found = store.search("u1", "ok thanks", 1).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "new");
    }

    #[tokio::test]
    async fn duplicate_turns_resolve_to_the_latest() {
        let store = LongTermStore::new(Arc::new(InMemoryVectorStore::default()));
        for (id, seconds) in [("old", 0), ("new", 60)] {
            let doc = document(id, "u1", seconds);
            store
                .store(&MemoryId::from(id), "ok thanks", doc.metadata)
                .await
                .expect("store");
        }
        let found = store.search("u1", "ok thanks", 1).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "new");
    }

    #[test]
    fn ranking_drops_other_owners() {
        let hits = vec![
            ScoredDocument {
                document: document("leak", "u2", 3),
                distance: 0.0,
            },
            ScoredDocument {
                document: document("mine", "u1", 1),
                distance: 0.5,
            },
        ];
        let ranked = rank_hits("u1", hits, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id.as_str(), "mine");
    }

    #[test]
    fn documents_without_timestamps_are_unreadable() {
        let mut doc = document("x", "u1", 0);
        doc.metadata = Metadata::new().with(OWNER_KEY, "u1");
        assert!(matches!(
            record_from_document(doc),
            Err(ClientError::Decode(_))
        ));
    }
}
