//! Chroma REST client with client-side embeddings.

use crate::client::{MetadataFilter, ScoredDocument, VectorClient, VectorDocument, VectorSelection};
use crate::embedding::Embedder;
use crate::error::ClientError;
use crate::model::Metadata;
use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Default collection holding long-term memories.
pub const DEFAULT_COLLECTION: &str = "long_term_memory";

/// [`VectorClient`] speaking the Chroma v1 HTTP API.
///
/// Vectors are computed locally with the injected [`Embedder`] and sent
/// alongside documents; queries are embedded the same way.
pub struct ChromaClient {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    collection_id: String,
    embedder: Arc<dyn Embedder>,
}

impl ChromaClient {
    /// Resolve (creating if needed) `collection` on the server at `base_url`.
    pub async fn connect(
        base_url: &str,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::new();
        let base_url = normalize_base_url(base_url);
        let created: CollectionResponse = post_json(
            &http,
            &format!("{base_url}/api/v1/collections"),
            &json!({
                "name": collection,
                "get_or_create": true,
                "metadata": { "hnsw:space": "cosine" },
            }),
        )
        .await?;
        info!(
            "opened chroma collection (url={}, collection={}, id={}, embedder={})",
            base_url,
            collection,
            created.id,
            embedder.model_name()
        );
        Ok(Self {
            http,
            base_url,
            collection: collection.to_string(),
            collection_id: created.id,
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{action}",
            self.base_url, self.collection_id
        )
    }

    async fn post<T>(&self, action: &str, body: &Value) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        post_json(&self.http, &self.endpoint(action), body).await
    }
}

fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

async fn post_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    body: &Value,
) -> Result<T, ClientError> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(http_error)?;
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ClientError::Protocol(format!(
            "chroma returned {status}: {}",
            detail.trim()
        )));
    }
    response.json::<T>().await.map_err(http_error)
}

fn http_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() || err.is_connect() {
        ClientError::Connection(err.to_string())
    } else if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Protocol(err.to_string())
    }
}

/// Translate an equality filter into a Chroma `where` clause.
fn where_clause(filter: &MetadataFilter) -> Option<Value> {
    let mut clauses: Vec<Value> = filter
        .iter()
        .map(|(key, value)| {
            let mut clause = Map::new();
            clause.insert(key.clone(), json!(value));
            Value::Object(clause)
        })
        .collect();
    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(json!({ "$and": clauses })),
    }
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<Vec<f32>>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a Metadata>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Metadata>>>,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

fn assemble(
    ids: Vec<String>,
    documents: Option<Vec<Option<String>>>,
    metadatas: Option<Vec<Option<Metadata>>>,
) -> Vec<VectorDocument> {
    let mut documents = documents.unwrap_or_default().into_iter();
    let mut metadatas = metadatas.unwrap_or_default().into_iter();
    ids.into_iter()
        .map(|id| VectorDocument {
            id,
            document: documents.next().flatten().unwrap_or_default(),
            metadata: metadatas.next().flatten().unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl VectorClient for ChromaClient {
    async fn add(&self, documents: Vec<VectorDocument>) -> Result<(), ClientError> {
        if documents.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = documents.iter().map(|doc| doc.document.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        let request = UpsertRequest {
            ids: documents.iter().map(|doc| doc.id.as_str()).collect(),
            embeddings,
            documents: documents.iter().map(|doc| doc.document.as_str()).collect(),
            metadatas: documents.iter().map(|doc| &doc.metadata).collect(),
        };
        let body = serde_json::to_value(&request)?;
        let _: Value = self.post("upsert", &body).await?;
        Ok(())
    }

    async fn get(&self, selection: VectorSelection) -> Result<Vec<VectorDocument>, ClientError> {
        let mut body = json!({ "include": ["documents", "metadatas"] });
        match selection {
            VectorSelection::Ids(ids) => body["ids"] = json!(ids),
            VectorSelection::Filter { filter, limit } => {
                if let Some(clause) = where_clause(&filter) {
                    body["where"] = clause;
                }
                if let Some(limit) = limit {
                    body["limit"] = json!(limit);
                }
            }
        }
        let response: GetResponse = self.post("get", &body).await?;
        Ok(assemble(
            response.ids,
            response.documents,
            response.metadatas,
        ))
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
        let embedding = self
            .embedder
            .embed(&[query_text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| ClientError::Embedding("empty embedding response".to_string()))?;
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = where_clause(filter) {
            body["where"] = clause;
        }
        let response: QueryResponse = self.post("query", &body).await?;
        let ids = response.ids.into_iter().next().unwrap_or_default();
        let documents = response.documents.and_then(|rows| rows.into_iter().next());
        let metadatas = response.metadatas.and_then(|rows| rows.into_iter().next());
        let mut distances = response
            .distances
            .and_then(|rows| rows.into_iter().next())
            .unwrap_or_default()
            .into_iter();
        Ok(assemble(ids, documents, metadatas)
            .into_iter()
            .map(|document| ScoredDocument {
                document,
                distance: distances.next().flatten().unwrap_or(f32::MAX),
            })
            .collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, ClientError> {
        let Some(clause) = where_clause(filter) else {
            return Err(ClientError::Protocol(
                "refusing to delete without a filter".to_string(),
            ));
        };
        // The delete endpoint does not report a count, so look the ids up first.
        let matching: GetResponse = self
            .post("get", &json!({ "where": clause.clone(), "include": [] }))
            .await?;
        if matching.ids.is_empty() {
            return Ok(0);
        }
        let _: Value = self
            .post("delete", &json!({ "ids": matching.ids.clone() }))
            .await?;
        Ok(matching.ids.len())
    }
}
