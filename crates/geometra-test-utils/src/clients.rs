use async_trait::async_trait;
use geometra_memory::{
    ClientError, Fields, KeyValueClient, MetadataFilter, ScoredDocument, VectorClient,
    VectorDocument, VectorSelection,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn refused() -> ClientError {
    ClientError::Connection("connection refused".to_string())
}

/// Key-value client whose every call fails with a connection error.
#[derive(Debug, Default)]
pub struct FailingKeyValueClient {
    calls: AtomicUsize,
}

impl FailingKeyValueClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(refused())
    }
}

#[async_trait]
impl KeyValueClient for FailingKeyValueClient {
    async fn set_fields(
        &self,
        _key: &str,
        _fields: &Fields,
        _ttl: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.fail()
    }

    async fn get_all_fields(&self, _key: &str) -> Result<Option<Fields>, ClientError> {
        self.fail()
    }

    async fn list_push_front(&self, _key: &str, _value: &str) -> Result<(), ClientError> {
        self.fail()
    }

    async fn list_trim(&self, _key: &str, _start: isize, _end: isize) -> Result<(), ClientError> {
        self.fail()
    }

    async fn list_range(
        &self,
        _key: &str,
        _start: isize,
        _end: isize,
    ) -> Result<Vec<String>, ClientError> {
        self.fail()
    }

    async fn delete(&self, _keys: &[String]) -> Result<usize, ClientError> {
        self.fail()
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, ClientError> {
        self.fail()
    }
}

/// Key-value client whose writes reach `inner` but whose reads all fail.
pub struct ReadFailingKeyValueClient {
    inner: Arc<dyn KeyValueClient>,
}

impl ReadFailingKeyValueClient {
    pub fn wrapping(inner: Arc<dyn KeyValueClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl KeyValueClient for ReadFailingKeyValueClient {
    async fn set_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.inner.set_fields(key, fields, ttl).await
    }

    async fn get_all_fields(&self, _key: &str) -> Result<Option<Fields>, ClientError> {
        Err(refused())
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.inner.list_push_front(key, value).await
    }

    async fn list_trim(&self, key: &str, start: isize, end: isize) -> Result<(), ClientError> {
        self.inner.list_trim(key, start, end).await
    }

    async fn list_range(
        &self,
        _key: &str,
        _start: isize,
        _end: isize,
    ) -> Result<Vec<String>, ClientError> {
        Err(refused())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, ClientError> {
        self.inner.delete(keys).await
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, ClientError> {
        Err(refused())
    }

    async fn push_front_trimmed(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
    ) -> Result<(), ClientError> {
        self.inner.push_front_trimmed(key, value, max_len).await
    }
}

/// Key-value client whose calls never complete.
#[derive(Debug, Default, Clone, Copy)]
pub struct StalledKeyValueClient;

#[async_trait]
impl KeyValueClient for StalledKeyValueClient {
    async fn set_fields(
        &self,
        _key: &str,
        _fields: &Fields,
        _ttl: Option<Duration>,
    ) -> Result<(), ClientError> {
        std::future::pending().await
    }

    async fn get_all_fields(&self, _key: &str) -> Result<Option<Fields>, ClientError> {
        std::future::pending().await
    }

    async fn list_push_front(&self, _key: &str, _value: &str) -> Result<(), ClientError> {
        std::future::pending().await
    }

    async fn list_trim(&self, _key: &str, _start: isize, _end: isize) -> Result<(), ClientError> {
        std::future::pending().await
    }

    async fn list_range(
        &self,
        _key: &str,
        _start: isize,
        _end: isize,
    ) -> Result<Vec<String>, ClientError> {
        std::future::pending().await
    }

    async fn delete(&self, _keys: &[String]) -> Result<usize, ClientError> {
        std::future::pending().await
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, ClientError> {
        std::future::pending().await
    }
}

/// Vector client that fails while switched on and otherwise delegates.
///
/// `new()` has nothing to delegate to and fails every call.
pub struct FailingVectorClient {
    inner: Option<Arc<dyn VectorClient>>,
    failing: AtomicBool,
}

impl FailingVectorClient {
    pub fn new() -> Self {
        Self {
            inner: None,
            failing: AtomicBool::new(true),
        }
    }

    /// Fail until [`FailingVectorClient::set_failing`] turns failures off.
    pub fn wrapping(inner: Arc<dyn VectorClient>) -> Self {
        Self {
            inner: Some(inner),
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn target(&self) -> Result<&Arc<dyn VectorClient>, ClientError> {
        match &self.inner {
            Some(inner) if !self.failing.load(Ordering::SeqCst) => Ok(inner),
            _ => Err(refused()),
        }
    }
}

impl Default for FailingVectorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorClient for FailingVectorClient {
    async fn add(&self, documents: Vec<VectorDocument>) -> Result<(), ClientError> {
        self.target()?.add(documents).await
    }

    async fn get(&self, selection: VectorSelection) -> Result<Vec<VectorDocument>, ClientError> {
        self.target()?.get(selection).await
    }

    async fn query(
        &self,
        query_text: &str,
        n_results: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>, ClientError> {
        self.target()?.query(query_text, n_results, filter).await
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, ClientError> {
        self.target()?.delete(filter).await
    }
}

/// Vector client whose calls never complete.
#[derive(Debug, Default, Clone, Copy)]
pub struct StalledVectorClient;

#[async_trait]
impl VectorClient for StalledVectorClient {
    async fn add(&self, _documents: Vec<VectorDocument>) -> Result<(), ClientError> {
        std::future::pending().await
    }

    async fn get(&self, _selection: VectorSelection) -> Result<Vec<VectorDocument>, ClientError> {
        std::future::pending().await
    }

    async fn query(
        &self,
        _query_text: &str,
        _n_results: usize,
        _filter: &MetadataFilter,
    ) -> Result<Vec<ScoredDocument>, ClientError> {
        std::future::pending().await
    }

    async fn delete(&self, _filter: &MetadataFilter) -> Result<usize, ClientError> {
        std::future::pending().await
    }
}
