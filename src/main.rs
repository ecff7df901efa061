use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use milvus_workflow::store::memory::MemoryStore;
use milvus_workflow::store::milvus::MilvusStore;
use milvus_workflow::workflow::schema_for_collection;
use milvus_workflow::{
    CollectionWorkflowManager, ConsistencyLevel, FieldDefinition, FieldValue, IndexType,
    MetricType, RecordBatch, SearchRequest, VectorStore, WorkflowConfig,
};

/// Load .env files from multiple locations with priority order:
/// 1. Current working directory (project-specific config)
/// 2. XDG config directory ~/.config/milvus-workflow/.env (global default)
///
/// Environment variables set directly in the shell always take highest priority.
fn load_env_files() {
    let cwd_env = std::env::current_dir().map(|p| p.join(".env")).ok();
    if let Some(path) = cwd_env {
        if path.exists() && dotenv::from_path(&path).is_ok() {
            tracing::debug!("Loaded .env from: {}", path.display());
            return;
        }
    }

    if let Some(config_dir) = get_xdg_config_dir() {
        let xdg_env = config_dir.join("milvus-workflow").join(".env");
        if xdg_env.exists() && dotenv::from_path(&xdg_env).is_ok() {
            tracing::debug!("Loaded .env from: {}", xdg_env.display());
            return;
        }
    }

    tracing::debug!("No .env file found, using environment variables only");
}

/// Get XDG config directory, fallback to ~/.config
fn get_xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_files();

    let env_filter =
        EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = WorkflowConfig::from_env();
    let store: Arc<dyn VectorStore> = match &config.milvus_endpoint {
        Some(endpoint) => {
            tracing::info!("Using Milvus at {}", endpoint);
            Arc::new(MilvusStore::new(endpoint))
        }
        None => {
            tracing::info!("MILVUS_ENDPOINT not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    if !store.health().await? {
        anyhow::bail!("vector store reported unhealthy");
    }

    let manager = CollectionWorkflowManager::new(store, config);
    run_book_demo(&manager).await
}

/// The quickstart flow: fresh "book" collection, a small batch of records, a
/// 2-NN search, an upsert overwrite, a scalar query, and a delete.
async fn run_book_demo(manager: &CollectionWorkflowManager) -> Result<()> {
    let collection = "book";
    let schema = schema_for_collection(
        collection,
        vec![
            FieldDefinition::primary_int64("book_id"),
            FieldDefinition::int64("word_count"),
            FieldDefinition::float_vector("book_intro", 2),
        ],
    )?;

    let mut handle = manager.ensure_fresh_collection(collection, schema).await?;

    let batch = RecordBatch::new()
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
        );
    let inserted = manager.insert(&handle, &batch).await?;
    println!("Inserted {} rows", inserted.insert_count);

    manager
        .build_index(&mut handle, "book_intro", IndexType::AutoIndex, MetricType::L2)
        .await?;
    manager.load(&mut handle).await?;

    let hits = manager
        .search(
            &handle,
            &SearchRequest {
                target_field: "book_intro".to_string(),
                query_vectors: vec![vec![0.1, 0.2]],
                metric: MetricType::L2,
                limit: 2,
                consistency_level: ConsistencyLevel::Strong,
                output_fields: vec!["book_id".to_string()],
            },
        )
        .await?;
    println!("Search results:");
    for hit in &hits {
        println!("  id={:?} distance={:.4}", hit.id, hit.distance);
    }

    // Overwrite one row by primary key
    let upsert = RecordBatch::new()
        .int64("book_id", vec![15243])
        .int64("word_count", vec![100001])
        .float_vector("book_intro", vec![vec![9.0, 9.0]]);
    manager.upsert(&handle, &upsert).await?;
    manager
        .verify_visible(&handle, "word_count == 100001", 1)
        .await?;

    let rows = manager
        .query(
            &handle,
            "book_id in [2,4,6,8]",
            &["book_id".to_string(), "word_count".to_string()],
            ConsistencyLevel::Strong,
        )
        .await?;
    println!("Query results:");
    for row in &rows {
        let id = row.get("book_id").and_then(FieldValue::as_i64);
        let count = row.get("word_count").and_then(FieldValue::as_i64);
        println!("  book_id={:?} word_count={:?}", id, count);
    }

    let deleted = manager.delete(&handle, "book_id in [12345]").await?;
    println!("Deleted {} rows", deleted);

    manager.drop(&mut handle).await?;
    println!("Dropped collection '{}'", handle.name());
    Ok(())
}
