use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use milvus_workflow::store::memory::MemoryStore;
use milvus_workflow::workflow::schema_for_collection;
use milvus_workflow::{
    CollectionHandle, CollectionSchema, CollectionWorkflowManager, ConsistencyLevel,
    FieldDefinition, FieldValue, IndexType, InsertOutcome, LifecycleState, LoadState, MetricType,
    RecordBatch, Row, SearchHit, SearchRequest, UpsertOutcome, VectorStore, WorkflowConfig,
    WorkflowError,
};

fn test_config() -> WorkflowConfig {
    WorkflowConfig {
        milvus_endpoint: None,
        load_poll_interval: Duration::from_millis(5),
        load_timeout: Duration::from_secs(2),
        visibility_timeout: Duration::from_millis(200),
    }
}

fn memory_manager() -> CollectionWorkflowManager {
    CollectionWorkflowManager::new(Arc::new(MemoryStore::new()), test_config())
}

fn book_schema() -> CollectionSchema {
    schema_for_collection(
        "book",
        vec![
            FieldDefinition::primary_int64("book_id"),
            FieldDefinition::int64("word_count"),
            FieldDefinition::float_vector("book_intro", 2),
        ],
    )
    .unwrap()
}

fn book_batch() -> RecordBatch {
    RecordBatch::new()
        .int64("book_id", vec![1, 2, 4, 12345, 15243])
        .int64("word_count", vec![300, 500, 700, 90000, 100000])
        .float_vector(
            "book_intro",
            vec![
                vec![1.0, 2.0],
                vec![2.0, 3.0],
                vec![4.0, 5.0],
                vec![0.5, 0.5],
                vec![9.0, 9.0],
            ],
        )
}

fn intro_search(limit: usize) -> SearchRequest {
    SearchRequest {
        target_field: "book_intro".to_string(),
        query_vectors: vec![vec![0.1, 0.2]],
        metric: MetricType::L2,
        limit,
        consistency_level: ConsistencyLevel::Strong,
        output_fields: vec!["book_id".to_string()],
    }
}

async fn loaded_book_collection(
    manager: &CollectionWorkflowManager,
) -> Result<CollectionHandle, WorkflowError> {
    let mut handle = manager
        .ensure_fresh_collection("book", book_schema())
        .await?;
    manager
        .build_index(&mut handle, "book_intro", IndexType::AutoIndex, MetricType::L2)
        .await?;
    manager.load(&mut handle).await?;
    Ok(handle)
}

#[tokio::test]
async fn test_insert_then_strong_search_returns_all_rows() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();

    let outcome = manager.insert(&handle, &book_batch()).await.unwrap();
    assert_eq!(outcome.insert_count, 5);
    assert_eq!(outcome.ids.len(), 5);

    let hits = manager.search(&handle, &intro_search(10)).await.unwrap();
    assert_eq!(hits.len(), 5, "no loss, no duplication");

    let rows = manager
        .query(&handle, "book_id >= 0", &[], ConsistencyLevel::Strong)
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_ensure_fresh_collection_is_idempotent() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();
    manager.insert(&handle, &book_batch()).await.unwrap();

    // recreate: previous contents must be gone
    let mut handle = manager
        .ensure_fresh_collection("book", book_schema())
        .await
        .unwrap();
    manager.load(&mut handle).await.unwrap();

    let rows = manager
        .query(&handle, "book_id >= 0", &[], ConsistencyLevel::Strong)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_upsert_overwrites_by_primary_key() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();
    manager.insert(&handle, &book_batch()).await.unwrap();

    let upsert = RecordBatch::new()
        .int64("book_id", vec![15243])
        .int64("word_count", vec![100001])
        .float_vector("book_intro", vec![vec![9.0, 9.0]]);
    let outcome = manager.upsert(&handle, &upsert).await.unwrap();
    assert_eq!(outcome.upsert_count, 1);

    let rows = manager
        .query(
            &handle,
            "book_id in [15243]",
            &["book_id".to_string(), "word_count".to_string()],
            ConsistencyLevel::Strong,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1, "exactly one row, not two");
    assert_eq!(
        rows[0].get("word_count").and_then(FieldValue::as_i64),
        Some(100001)
    );
}

#[tokio::test]
async fn test_delete_removes_rows_from_search_and_query() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();
    manager.insert(&handle, &book_batch()).await.unwrap();

    let deleted = manager.delete(&handle, "book_id in [12345]").await.unwrap();
    assert_eq!(deleted, 1);

    let hits = manager.search(&handle, &intro_search(10)).await.unwrap();
    assert!(hits
        .iter()
        .all(|hit| hit.id != FieldValue::Int64(12345)));

    manager
        .verify_visible(&handle, "book_id in [12345]", 0)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_search_limit_is_respected() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();
    manager.insert(&handle, &book_batch()).await.unwrap();

    let hits = manager.search(&handle, &intro_search(2)).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_batch_length_mismatch_fails_before_any_store_call() {
    let store = Arc::new(WriteFailStore::default());
    let manager = CollectionWorkflowManager::new(store, test_config());
    let handle = manager
        .ensure_fresh_collection("book", book_schema())
        .await
        .unwrap();

    // 2 ids but 1 word_count: must be rejected locally, so the failing
    // store's insert is never reached
    let batch = RecordBatch::new()
        .int64("book_id", vec![1, 2])
        .int64("word_count", vec![300])
        .float_vector("book_intro", vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    match manager.insert(&handle, &batch).await {
        Err(WorkflowError::BatchLength { collection, .. }) => assert_eq!(collection, "book"),
        other => panic!("expected BatchLength, got {:?}", other.map(|_| ())),
    }

    match manager.upsert(&handle, &batch).await {
        Err(WorkflowError::BatchLength { .. }) => {}
        other => panic!("expected BatchLength, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_unknown_field_is_schema_mismatch() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();

    let batch = book_batch().int64("page_count", vec![1, 2, 3, 4, 5]);
    match manager.insert(&handle, &batch).await {
        Err(WorkflowError::SchemaMismatch { operation, .. }) => assert_eq!(operation, "insert"),
        other => panic!("expected SchemaMismatch, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_state_machine_transitions() {
    let manager = memory_manager();
    let mut handle = manager
        .ensure_fresh_collection("book", book_schema())
        .await
        .unwrap();
    assert_eq!(handle.state(), LifecycleState::Created);

    // search before load is rejected locally
    match manager.search(&handle, &intro_search(2)).await {
        Err(WorkflowError::InvalidState { state, .. }) => {
            assert_eq!(state, LifecycleState::Created)
        }
        other => panic!("expected InvalidState, got {:?}", other.map(|_| ())),
    }

    manager
        .build_index(&mut handle, "book_intro", IndexType::AutoIndex, MetricType::L2)
        .await
        .unwrap();
    assert_eq!(handle.state(), LifecycleState::IndexBuilt);

    manager.load(&mut handle).await.unwrap();
    assert_eq!(handle.state(), LifecycleState::Loaded);

    manager.drop(&mut handle).await.unwrap();
    assert_eq!(handle.state(), LifecycleState::Dropped);

    // terminal state: further operations report the collection as gone
    match manager.delete(&handle, "book_id in [1]").await {
        Err(WorkflowError::NotFound { operation, .. }) => assert_eq!(operation, "delete"),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_load_is_retry_safe() {
    let manager = memory_manager();
    let mut handle = manager
        .ensure_fresh_collection("book", book_schema())
        .await
        .unwrap();

    manager.load(&mut handle).await.unwrap();
    manager.load(&mut handle).await.unwrap();
    assert_eq!(handle.state(), LifecycleState::Loaded);
}

#[tokio::test]
async fn test_drop_reverifies_existence() {
    let manager = memory_manager();
    let mut handle = manager
        .ensure_fresh_collection("book", book_schema())
        .await
        .unwrap();

    // collection vanishes behind the handle's back
    manager.store().drop_collection("book").await.unwrap();

    match manager.drop(&mut handle).await {
        Err(WorkflowError::NotFound { collection, .. }) => assert_eq!(collection, "book"),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
    assert_eq!(handle.state(), LifecycleState::Dropped);
}

#[tokio::test]
async fn test_malformed_schema_is_rejected_locally() {
    let err = schema_for_collection(
        "book",
        vec![
            FieldDefinition::int64("word_count"),
            FieldDefinition::float_vector("book_intro", 2),
        ],
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("book"), "error names the collection");
    assert!(message.contains("primary key"));
}

#[tokio::test]
async fn test_four_dim_book_vector_scenario() {
    // second illustrative scenario: book_vector FloatVector(4)
    let manager = memory_manager();
    let schema = schema_for_collection(
        "book_v4",
        vec![
            FieldDefinition::primary_int64("book_id"),
            FieldDefinition::varchar("book_name", 256),
            FieldDefinition::float_vector("book_vector", 4),
        ],
    )
    .unwrap();

    let mut handle = manager
        .ensure_fresh_collection("book_v4", schema)
        .await
        .unwrap();
    manager.load(&mut handle).await.unwrap();

    let batch = RecordBatch::new()
        .int64("book_id", vec![1, 2])
        .varchar(
            "book_name",
            vec!["first".to_string(), "second".to_string()],
        )
        .float_vector(
            "book_vector",
            vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.9, 0.8, 0.7, 0.6]],
        );
    manager.insert(&handle, &batch).await.unwrap();

    let hits = manager
        .search(
            &handle,
            &SearchRequest {
                target_field: "book_vector".to_string(),
                query_vectors: vec![vec![0.1, 0.2, 0.3, 0.4]],
                metric: MetricType::Cosine,
                limit: 1,
                consistency_level: ConsistencyLevel::Strong,
                output_fields: vec!["book_name".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, FieldValue::Int64(1));
    assert_eq!(
        hits[0].fields.get("book_name").and_then(|v| v.as_str()),
        Some("first")
    );
}

#[tokio::test]
async fn test_verify_visible_times_out_as_consistency_violation() {
    let manager = memory_manager();
    let handle = loaded_book_collection(&manager).await.unwrap();

    // nothing matching was ever written
    match manager
        .verify_visible(&handle, "book_id in [999]", 3)
        .await
    {
        Err(WorkflowError::ConsistencyViolation { collection, .. }) => {
            assert_eq!(collection, "book")
        }
        other => panic!("expected ConsistencyViolation, got {:?}", other.map(|_| ())),
    }
}

/// Store that accepts collection management but fails every write, to prove
/// batch validation happens before the network boundary.
#[derive(Default)]
struct WriteFailStore {
    inner: MemoryStore,
}

#[async_trait::async_trait]
impl VectorStore for WriteFailStore {
    async fn health(&self) -> Result<bool> {
        self.inner.health().await
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        self.inner.has_collection(name).await
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
        shards_num: u32,
    ) -> Result<()> {
        self.inner.create_collection(name, schema, shards_num).await
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.inner.drop_collection(name).await
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index_type: IndexType,
        metric: MetricType,
    ) -> Result<()> {
        self.inner
            .create_index(collection, field, index_type, metric)
            .await
    }

    async fn load_collection(&self, name: &str) -> Result<()> {
        self.inner.load_collection(name).await
    }

    async fn load_state(&self, name: &str) -> Result<LoadState> {
        self.inner.load_state(name).await
    }

    async fn insert(&self, _collection: &str, _batch: &RecordBatch) -> Result<InsertOutcome> {
        anyhow::bail!("insert reached the store")
    }

    async fn upsert(&self, _collection: &str, _batch: &RecordBatch) -> Result<UpsertOutcome> {
        anyhow::bail!("upsert reached the store")
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<u64> {
        self.inner.delete(collection, filter).await
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.inner.search(collection, request).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &str,
        output_fields: &[String],
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<Row>> {
        self.inner
            .query(collection, filter, output_fields, consistency_level)
            .await
    }
}
