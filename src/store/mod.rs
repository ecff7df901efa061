pub mod memory;
pub mod milvus;

use anyhow::Result;

use crate::record::{FieldValue, RecordBatch, Row};
use crate::schema::CollectionSchema;

/// Similarity metric for vector search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    L2,
    Ip,
    Cosine,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::Ip => "IP",
            MetricType::Cosine => "COSINE",
        }
    }
}

/// Index type for a vector field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Store-chosen default
    AutoIndex,
    Flat,
    IvfFlat,
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::AutoIndex => "AUTOINDEX",
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVF_FLAT",
            IndexType::Hnsw => "HNSW",
        }
    }
}

/// Staleness bound a read accepts relative to prior writes.
///
/// Passed through to every search/query unmodified; there is deliberately no
/// Default impl so callers always choose one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    /// Observe all writes that completed before the read started
    Strong,
    /// Store-defined staleness window
    Bounded,
    /// No ordering guarantee
    Eventual,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::Bounded => "Bounded",
            // Milvus spells this one "Eventually" on the wire
            ConsistencyLevel::Eventual => "Eventually",
        }
    }
}

/// Load state reported by the store for one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

/// Nearest-neighbor search request against one vector field
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub target_field: String,
    pub query_vectors: Vec<Vec<f32>>,
    pub metric: MetricType,
    pub limit: usize,
    pub consistency_level: ConsistencyLevel,
    pub output_fields: Vec<String>,
}

/// One search hit: primary key, distance under the requested metric, and the
/// requested output fields keyed by name.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: FieldValue,
    pub distance: f32,
    pub fields: Row,
}

#[derive(Debug, Clone)]
pub struct InsertOutcome {
    pub ids: Vec<FieldValue>,
    pub insert_count: u64,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub upsert_count: u64,
}

/// Boundary to the remote vector store. Every call is an asynchronous
/// request/response operation and may suspend on network I/O.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn health(&self) -> Result<bool>;
    async fn has_collection(&self, name: &str) -> Result<bool>;
    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
        shards_num: u32,
    ) -> Result<()>;
    async fn drop_collection(&self, name: &str) -> Result<()>;
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index_type: IndexType,
        metric: MetricType,
    ) -> Result<()>;
    async fn load_collection(&self, name: &str) -> Result<()>;
    async fn load_state(&self, name: &str) -> Result<LoadState>;
    async fn insert(&self, collection: &str, batch: &RecordBatch) -> Result<InsertOutcome>;
    async fn upsert(&self, collection: &str, batch: &RecordBatch) -> Result<UpsertOutcome>;
    async fn delete(&self, collection: &str, filter: &str) -> Result<u64>;
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchHit>>;
    async fn query(
        &self,
        collection: &str,
        filter: &str,
        output_fields: &[String],
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<Row>>;
}
