use std::sync::Arc;

use tokio::time::{sleep, Instant};

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::record::{BatchShapeError, RecordBatch, Row};
use crate::schema::CollectionSchema;
use crate::store::{
    ConsistencyLevel, IndexType, InsertOutcome, LoadState, MetricType, SearchHit, SearchRequest,
    UpsertOutcome, VectorStore,
};

/// Lifecycle state of a collection handle.
///
/// Advisory only: it reflects the last transition this manager observed, and
/// destructive operations re-verify against the store before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NonExistent,
    Created,
    IndexBuilt,
    Loaded,
    Dropped,
}

/// Handle to one named collection managed by a [`CollectionWorkflowManager`]
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    name: String,
    schema: CollectionSchema,
    state: LifecycleState,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }
}

/// Orchestrates the lifecycle of collections against a remote vector store:
/// existence check, drop, create-with-schema, index build, load, writes,
/// reads, and read-after-write verification.
///
/// The manager validates schemas and write batches locally before touching
/// the network, passes the caller's consistency level through to every read
/// unmodified, and never retries backend failures on its own.
pub struct CollectionWorkflowManager {
    store: Arc<dyn VectorStore>,
    config: WorkflowConfig,
}

impl CollectionWorkflowManager {
    pub fn new(store: Arc<dyn VectorStore>, config: WorkflowConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Drops the collection if it exists, then creates it with the given
    /// schema. Idempotent teardown: two calls in a row both yield an empty
    /// collection.
    pub async fn ensure_fresh_collection(
        &self,
        name: &str,
        schema: CollectionSchema,
    ) -> Result<CollectionHandle, WorkflowError> {
        self.ensure_fresh_collection_with_shards(name, schema, 2).await
    }

    pub async fn ensure_fresh_collection_with_shards(
        &self,
        name: &str,
        schema: CollectionSchema,
        shards_num: u32,
    ) -> Result<CollectionHandle, WorkflowError> {
        let exists = self
            .store
            .has_collection(name)
            .await
            .map_err(|e| backend(name, "ensure_fresh_collection", e))?;

        if exists {
            tracing::info!(collection = name, "dropping existing collection");
            self.store
                .drop_collection(name)
                .await
                .map_err(|e| backend(name, "ensure_fresh_collection", e))?;
        }

        tracing::info!(collection = name, "creating collection");
        self.store
            .create_collection(name, &schema, shards_num)
            .await
            .map_err(|e| backend(name, "ensure_fresh_collection", e))?;

        Ok(CollectionHandle {
            name: name.to_string(),
            schema,
            state: LifecycleState::Created,
        })
    }

    /// Builds a search index on a vector field. Optional: without it, search
    /// falls back to a brute-force scan, which is slower but valid.
    pub async fn build_index(
        &self,
        handle: &mut CollectionHandle,
        field: &str,
        index_type: IndexType,
        metric: MetricType,
    ) -> Result<(), WorkflowError> {
        require_exists(handle, "build_index")?;
        let definition = handle.schema.field(field).ok_or_else(|| {
            WorkflowError::SchemaMismatch {
                collection: handle.name.clone(),
                operation: "build_index",
                reason: format!("no field named '{}'", field),
            }
        })?;
        if !definition.field_type.is_vector() {
            return Err(WorkflowError::SchemaMismatch {
                collection: handle.name.clone(),
                operation: "build_index",
                reason: format!("field '{}' is not a vector field", field),
            });
        }

        tracing::info!(collection = %handle.name, field, "building index");
        self.store
            .create_index(&handle.name, field, index_type, metric)
            .await
            .map_err(|e| backend(&handle.name, "build_index", e))?;

        if handle.state == LifecycleState::Created {
            handle.state = LifecycleState::IndexBuilt;
        }
        Ok(())
    }

    /// Materializes the collection into a servable state, polling until the
    /// store reports Loaded. Safe to re-invoke after cancellation: the load
    /// request is idempotent and polling resumes where the store is.
    pub async fn load(&self, handle: &mut CollectionHandle) -> Result<(), WorkflowError> {
        require_exists(handle, "load")?;

        self.store
            .load_collection(&handle.name)
            .await
            .map_err(|e| backend(&handle.name, "load", e))?;

        let deadline = Instant::now() + self.config.load_timeout;
        loop {
            let state = self
                .store
                .load_state(&handle.name)
                .await
                .map_err(|e| backend(&handle.name, "load", e))?;
            match state {
                LoadState::Loaded => break,
                LoadState::Loading | LoadState::NotLoaded => {
                    if Instant::now() >= deadline {
                        return Err(backend(
                            &handle.name,
                            "load",
                            anyhow::anyhow!(
                                "collection not loaded within {:?}",
                                self.config.load_timeout
                            ),
                        ));
                    }
                    sleep(self.config.load_poll_interval).await;
                }
            }
        }

        tracing::info!(collection = %handle.name, "collection loaded");
        handle.state = LifecycleState::Loaded;
        Ok(())
    }

    /// Inserts a batch. The batch must match the schema exactly and all of
    /// its value columns must have equal length; both are checked before any
    /// network call.
    pub async fn insert(
        &self,
        handle: &CollectionHandle,
        batch: &RecordBatch,
    ) -> Result<InsertOutcome, WorkflowError> {
        require_exists(handle, "insert")?;
        self.validate_batch(handle, batch, "insert")?;

        let outcome = self
            .store
            .insert(&handle.name, batch)
            .await
            .map_err(|e| backend(&handle.name, "insert", e))?;
        tracing::debug!(
            collection = %handle.name,
            rows = outcome.insert_count,
            "inserted batch"
        );
        Ok(outcome)
    }

    /// Insert-or-overwrite by primary key. Rows whose primary key already
    /// exists have all fields replaced; others are inserted. Ordering between
    /// concurrent upserts on the same key is the store's concern.
    pub async fn upsert(
        &self,
        handle: &CollectionHandle,
        batch: &RecordBatch,
    ) -> Result<UpsertOutcome, WorkflowError> {
        require_exists(handle, "upsert")?;
        self.validate_batch(handle, batch, "upsert")?;

        let outcome = self
            .store
            .upsert(&handle.name, batch)
            .await
            .map_err(|e| backend(&handle.name, "upsert", e))?;
        tracing::debug!(
            collection = %handle.name,
            rows = outcome.upsert_count,
            "upserted batch"
        );
        Ok(outcome)
    }

    /// Nearest-neighbor search. Only valid once the collection is Loaded.
    /// The request's consistency level is forwarded unmodified.
    pub async fn search(
        &self,
        handle: &CollectionHandle,
        request: &SearchRequest,
    ) -> Result<Vec<SearchHit>, WorkflowError> {
        self.require_loaded(handle, "search")?;

        let field = handle.schema.field(&request.target_field).ok_or_else(|| {
            WorkflowError::SchemaMismatch {
                collection: handle.name.clone(),
                operation: "search",
                reason: format!("no field named '{}'", request.target_field),
            }
        })?;
        if !field.field_type.is_vector() {
            return Err(WorkflowError::SchemaMismatch {
                collection: handle.name.clone(),
                operation: "search",
                reason: format!("field '{}' is not a vector field", request.target_field),
            });
        }

        self.store
            .search(&handle.name, request)
            .await
            .map_err(|e| backend(&handle.name, "search", e))
    }

    /// Scalar filter query with no vector ranking. Same consistency contract
    /// as search.
    pub async fn query(
        &self,
        handle: &CollectionHandle,
        filter: &str,
        output_fields: &[String],
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<Row>, WorkflowError> {
        self.require_loaded(handle, "query")?;
        self.store
            .query(&handle.name, filter, output_fields, consistency_level)
            .await
            .map_err(|e| backend(&handle.name, "query", e))
    }

    /// Deletes rows matching a scalar filter; same grammar as `query`.
    /// Returns the number of rows the store reports deleted.
    pub async fn delete(
        &self,
        handle: &CollectionHandle,
        filter: &str,
    ) -> Result<u64, WorkflowError> {
        require_exists(handle, "delete")?;
        let count = self
            .store
            .delete(&handle.name, filter)
            .await
            .map_err(|e| backend(&handle.name, "delete", e))?;
        tracing::debug!(collection = %handle.name, count, "deleted rows");
        Ok(count)
    }

    /// Irreversibly drops the collection. The cached handle state is only
    /// advisory, so existence is re-verified first.
    pub async fn drop(&self, handle: &mut CollectionHandle) -> Result<(), WorkflowError> {
        require_exists(handle, "drop")?;

        let exists = self
            .store
            .has_collection(&handle.name)
            .await
            .map_err(|e| backend(&handle.name, "drop", e))?;
        if !exists {
            handle.state = LifecycleState::Dropped;
            return Err(WorkflowError::NotFound {
                collection: handle.name.clone(),
                operation: "drop",
            });
        }

        self.store
            .drop_collection(&handle.name)
            .await
            .map_err(|e| backend(&handle.name, "drop", e))?;
        tracing::info!(collection = %handle.name, "dropped collection");
        handle.state = LifecycleState::Dropped;
        Ok(())
    }

    /// Polls a Strong query until `filter` matches exactly `expected_rows`
    /// rows, for harnesses asserting read-after-write visibility. Fails with
    /// `ConsistencyViolation` if the expectation is not met within the
    /// configured bounded wait.
    pub async fn verify_visible(
        &self,
        handle: &CollectionHandle,
        filter: &str,
        expected_rows: usize,
    ) -> Result<(), WorkflowError> {
        let deadline = Instant::now() + self.config.visibility_timeout;
        loop {
            let rows = self
                .query(handle, filter, &[], ConsistencyLevel::Strong)
                .await?;
            let last_seen = rows.len();
            if last_seen == expected_rows {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(WorkflowError::ConsistencyViolation {
                    collection: handle.name.clone(),
                    reason: format!(
                        "expected {} rows matching '{}', saw {} after {:?}",
                        expected_rows, filter, last_seen, self.config.visibility_timeout
                    ),
                });
            }
            sleep(self.config.load_poll_interval).await;
        }
    }

    fn validate_batch(
        &self,
        handle: &CollectionHandle,
        batch: &RecordBatch,
        operation: &'static str,
    ) -> Result<(), WorkflowError> {
        batch
            .validate(&handle.schema)
            .map_err(|e| match e {
                BatchShapeError::Length(reason) => WorkflowError::BatchLength {
                    collection: handle.name.clone(),
                    operation,
                    reason,
                },
                BatchShapeError::Mismatch(reason) => WorkflowError::SchemaMismatch {
                    collection: handle.name.clone(),
                    operation,
                    reason,
                },
            })
    }

    fn require_loaded(
        &self,
        handle: &CollectionHandle,
        operation: &'static str,
    ) -> Result<(), WorkflowError> {
        if handle.state != LifecycleState::Loaded {
            return Err(WorkflowError::InvalidState {
                collection: handle.name.clone(),
                operation,
                state: handle.state,
            });
        }
        Ok(())
    }
}

/// Builds a schema, attributing failures to the collection they were meant
/// for.
pub fn schema_for_collection(
    collection: &str,
    fields: Vec<crate::schema::FieldDefinition>,
) -> Result<CollectionSchema, WorkflowError> {
    CollectionSchema::new(fields).map_err(|reason| WorkflowError::Schema {
        collection: collection.to_string(),
        reason,
    })
}

fn backend(collection: &str, operation: &'static str, source: anyhow::Error) -> WorkflowError {
    WorkflowError::BackendUnavailable {
        collection: collection.to_string(),
        operation,
        source,
    }
}

fn require_exists(
    handle: &CollectionHandle,
    operation: &'static str,
) -> Result<(), WorkflowError> {
    match handle.state {
        LifecycleState::Dropped | LifecycleState::NonExistent => Err(WorkflowError::NotFound {
            collection: handle.name.clone(),
            operation,
        }),
        _ => Ok(()),
    }
}
