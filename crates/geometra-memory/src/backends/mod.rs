//! Concrete store adapters.

mod chroma;
mod memory_kv;
mod memory_vector;
mod redis_kv;

pub use chroma::{ChromaClient, DEFAULT_COLLECTION};
pub use memory_kv::InMemoryKeyValue;
pub use memory_vector::InMemoryVectorStore;
pub use redis_kv::RedisKeyValue;
