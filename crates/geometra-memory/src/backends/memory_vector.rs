//! Process-local vector store ranking by cosine distance.

use crate::client::{MetadataFilter, ScoredDocument, VectorClient, VectorDocument, VectorSelection};
use crate::embedding::{Embedder, HashingEmbedder, cosine_similarity};
use crate::error::ClientError;
use crate::model::{CREATED_AT_KEY, parse_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredDocument {
    document: VectorDocument,
    embedding: Vec<f32>,
}

/// In-memory [`VectorClient`] that embeds with an injected [`Embedder`].
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(Arc::new(HashingEmbedder::default()))
    }
}

#[async_trait]
impl VectorClient for InMemoryVectorStore {
    async fn add(&self, documents: Vec<VectorDocument>) -> Result<(), ClientError> {
        if documents.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = documents.iter().map(|doc| doc.document.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(ClientError::Embedding(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }
        let mut stored = self.documents.write();
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            let entry = StoredDocument {
                document,
                embedding,
            };
            match stored
                .iter_mut()
                .find(|existing| existing.document.id == entry.document.id)
            {
                Some(existing) => *existing = entry,
                None => stored.push(entry),
            }
        }
        Ok(())
    }

    async fn get(&self, selection: VectorSelection) -> Result<Vec<VectorDocument>, ClientError> {
        let stored = self.documents.read();
        let documents = match selection {
            VectorSelection::Ids(ids) => ids
                .iter()
                .filter_map(|id| stored.iter().find(|entry| &entry.document.id == id))
                .map(|entry| entry.document.clone())
                .collect(),
            VectorSelection::Filter { filter, limit } => stored
                .iter()
                .filter(|entry| filter.matches(&entry.document.metadata))
                .take(limit.unwrap_or(usize::MAX))
                .map(|entry| entry.document.clone())
                .collect(),
        };
        Ok(documents)
    }

    async fn query(
        &self,
        query_text: &str,
        n_results: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>, ClientError> {
        if n_results == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed(&[query_text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ClientError::Embedding("empty embedding response".to_string()))?;
        let stored = self.documents.read();
        let mut hits: Vec<ScoredDocument> = stored
            .iter()
            .filter(|entry| filter.matches(&entry.document.metadata))
            .map(|entry| ScoredDocument {
                document: entry.document.clone(),
                distance: 1.0 - cosine_similarity(&query, &entry.embedding),
            })
            .collect();
        hits.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
            Ordering::Equal => created_at(b).cmp(&created_at(a)),
            ordering => ordering,
        });
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, ClientError> {
        let mut stored = self.documents.write();
        let before = stored.len();
        stored.retain(|entry| !filter.matches(&entry.document.metadata));
        Ok(before - stored.len())
    }
}

/// Creation instant used to order equally distant hits, newest first.
fn created_at(hit: &ScoredDocument) -> Option<DateTime<Utc>> {
    hit.document
        .metadata
        .get_str(CREATED_AT_KEY)
        .and_then(parse_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metadata;
    use pretty_assertions::assert_eq;

    fn doc(id: &str, owner: &str, text: &str) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            document: text.to_string(),
            metadata: Metadata::new().with("owner", owner),
        }
    }

    #[tokio::test]
    async fn add_overwrites_by_id() {
        let store = InMemoryVectorStore::default();
        store.add(vec![doc("a", "u1", "first")]).await.expect("add");
        store.add(vec![doc("a", "u1", "second")]).await.expect("add");
        assert_eq!(store.len(), 1);
        let found = store
            .get(VectorSelection::Ids(vec!["a".to_string()]))
            .await
            .expect("get");
        assert_eq!(found[0].document, "second");
    }

    #[tokio::test]
    async fn query_filters_before_ranking() {
        let store = InMemoryVectorStore::default();
        store
            .add(vec![
                doc("other", "u2", "rust async runtime"),
                doc("mine", "u1", "gardening tips for spring"),
            ])
            .await
            .expect("add");
        let hits = store
            .query("rust async runtime", 1, &MetadataFilter::equals("owner", "u1"))
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "mine");
    }

    #[tokio::test]
    async fn equal_distances_rank_newer_documents_first() {
        let store = InMemoryVectorStore::default();
        let stamped = |id: &str, created_at: &str| VectorDocument {
            metadata: Metadata::new()
                .with("owner", "u1")
                .with("created_at", created_at),
            ..doc(id, "u1", "ok thanks")
        };
        store
            .add(vec![
                stamped("old", "2024-01-01T00:00:00.000000Z"),
                stamped("new", "2024-01-01T00:01:00.000000Z"),
            ])
            .await
            .expect("add");
        let hits = store
            .query("ok thanks", 1, &MetadataFilter::equals("owner", "u1"))
            .await
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "new");
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let store = InMemoryVectorStore::default();
        store
            .add(vec![doc("a", "u1", "x"), doc("b", "u1", "y"), doc("c", "u2", "z")])
            .await
            .expect("add");
        let filter = MetadataFilter::equals("owner", "u1");
        assert_eq!(store.delete(&filter).await.expect("delete"), 2);
        assert_eq!(store.delete(&filter).await.expect("delete"), 0);
        assert_eq!(store.len(), 1);
    }
}
