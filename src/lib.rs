pub mod config;
pub mod error;
pub mod record;
pub mod schema;
pub mod store;
pub mod workflow;

pub use config::WorkflowConfig;
pub use error::WorkflowError;
pub use record::{ColumnValues, FieldColumn, FieldValue, RecordBatch, Row};
pub use schema::{CollectionSchema, FieldDefinition, FieldType};
pub use store::{
    ConsistencyLevel, IndexType, InsertOutcome, LoadState, MetricType, SearchHit, SearchRequest,
    UpsertOutcome, VectorStore,
};
pub use workflow::{CollectionHandle, CollectionWorkflowManager, LifecycleState};
