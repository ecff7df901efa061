use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{
    ConsistencyLevel, IndexType, InsertOutcome, LoadState, MetricType, SearchHit, SearchRequest,
    UpsertOutcome, VectorStore,
};
use crate::record::{FieldValue, RecordBatch, Row};
use crate::schema::{CollectionSchema, FieldType};

/// Milvus vector store client using the v2 REST API
pub struct MilvusStore {
    client: Client,
    address: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct CollectionNameRequest {
    #[serde(rename = "collectionName")]
    collection_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct HasCollectionData {
    #[serde(default)]
    has: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LoadStateData {
    #[serde(rename = "loadState", default)]
    load_state: String,
}

#[derive(Debug, Default, Deserialize)]
struct InsertData {
    #[serde(rename = "insertCount", default)]
    insert_count: u64,
    #[serde(rename = "insertIds", default)]
    insert_ids: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsertData {
    #[serde(rename = "upsertCount", default)]
    upsert_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteData {
    #[serde(rename = "deleteCount", default)]
    delete_count: u64,
}

impl MilvusStore {
    pub fn new(address: &str) -> Self {
        Self {
            client: Client::new(),
            address: address.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.address, path)
    }

    /// POSTs a request and unwraps the {code, message, data} envelope the
    /// v2 API puts around every response.
    async fn post<B, D>(&self, path: &str, body: &B) -> Result<D>
    where
        B: Serialize + ?Sized,
        D: DeserializeOwned + Default,
    {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to send {} request", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Milvus API error ({}): {}", status, body);
        }

        let envelope: ApiResponse<D> = response
            .json()
            .await
            .with_context(|| format!("failed to parse {} response", path))?;

        if envelope.code != 0 {
            anyhow::bail!(
                "Milvus error {} on {}: {}",
                envelope.code,
                path,
                envelope.message.unwrap_or_default()
            );
        }

        Ok(envelope.data.unwrap_or_default())
    }

    fn schema_json(schema: &CollectionSchema) -> Value {
        let fields: Vec<Value> = schema
            .fields()
            .iter()
            .map(|field| {
                let mut object = Map::new();
                object.insert("fieldName".to_string(), json!(field.name));
                object.insert(
                    "dataType".to_string(),
                    json!(field.field_type.data_type_name()),
                );
                object.insert("isPrimary".to_string(), json!(field.is_primary_key));
                match field.field_type {
                    FieldType::FloatVector { dim } => {
                        object.insert(
                            "elementTypeParams".to_string(),
                            json!({ "dim": dim.to_string() }),
                        );
                    }
                    FieldType::VarChar { max_length } => {
                        object.insert(
                            "elementTypeParams".to_string(),
                            json!({ "max_length": max_length.to_string() }),
                        );
                    }
                    FieldType::Int64 => {}
                }
                Value::Object(object)
            })
            .collect();

        json!({ "fields": fields })
    }

    fn parse_row(object: &Map<String, Value>) -> Row {
        object
            .iter()
            .filter(|(name, _)| name.as_str() != "distance" && name.as_str() != "id")
            .filter_map(|(name, value)| {
                FieldValue::from_json(value).map(|v| (name.clone(), v))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl VectorStore for MilvusStore {
    async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/healthz", self.address))
            .send()
            .await
            .context("failed to reach Milvus health endpoint")?;
        Ok(response.status().is_success())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let data: HasCollectionData = self
            .post(
                "collections/has",
                &CollectionNameRequest {
                    collection_name: name.to_string(),
                },
            )
            .await?;
        Ok(data.has)
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
        shards_num: u32,
    ) -> Result<()> {
        let body = json!({
            "collectionName": name,
            "schema": Self::schema_json(schema),
            "params": { "shardsNum": shards_num },
        });
        let _: Value = self.post("collections/create", &body).await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let _: Value = self
            .post(
                "collections/drop",
                &CollectionNameRequest {
                    collection_name: name.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index_type: IndexType,
        metric: MetricType,
    ) -> Result<()> {
        let body = json!({
            "collectionName": collection,
            "indexParams": [{
                "fieldName": field,
                "indexName": format!("{}_idx", field),
                "metricType": metric.as_str(),
                "indexType": index_type.as_str(),
            }],
        });
        let _: Value = self.post("indexes/create", &body).await?;
        Ok(())
    }

    async fn load_collection(&self, name: &str) -> Result<()> {
        let _: Value = self
            .post(
                "collections/load",
                &CollectionNameRequest {
                    collection_name: name.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn load_state(&self, name: &str) -> Result<LoadState> {
        let data: LoadStateData = self
            .post(
                "collections/get_load_state",
                &CollectionNameRequest {
                    collection_name: name.to_string(),
                },
            )
            .await?;
        let state = match data.load_state.as_str() {
            "LoadStateLoaded" => LoadState::Loaded,
            "LoadStateLoading" => LoadState::Loading,
            _ => LoadState::NotLoaded,
        };
        Ok(state)
    }

    async fn insert(&self, collection: &str, batch: &RecordBatch) -> Result<InsertOutcome> {
        let body = json!({
            "collectionName": collection,
            "data": batch.to_json_rows(),
        });
        let data: InsertData = self.post("entities/insert", &body).await?;
        let ids = data
            .insert_ids
            .iter()
            .filter_map(FieldValue::from_json)
            .collect();
        Ok(InsertOutcome {
            ids,
            insert_count: data.insert_count,
        })
    }

    async fn upsert(&self, collection: &str, batch: &RecordBatch) -> Result<UpsertOutcome> {
        let body = json!({
            "collectionName": collection,
            "data": batch.to_json_rows(),
        });
        let data: UpsertData = self.post("entities/upsert", &body).await?;
        Ok(UpsertOutcome {
            upsert_count: data.upsert_count,
        })
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<u64> {
        let body = json!({
            "collectionName": collection,
            "filter": filter,
        });
        let data: DeleteData = self.post("entities/delete", &body).await?;
        Ok(data.delete_count)
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let body = json!({
            "collectionName": collection,
            "data": request.query_vectors,
            "annsField": request.target_field,
            "limit": request.limit,
            "outputFields": request.output_fields,
            "searchParams": { "metricType": request.metric.as_str() },
            "consistencyLevel": request.consistency_level.as_str(),
        });
        let data: Vec<Value> = self.post("entities/search", &body).await?;

        let hits = data
            .iter()
            .filter_map(|value| value.as_object())
            .map(|object| {
                let id = object
                    .get("id")
                    .and_then(FieldValue::from_json)
                    .unwrap_or(FieldValue::Int64(0));
                let distance = object
                    .get("distance")
                    .and_then(|v| v.as_f64())
                    .unwrap_or_default() as f32;
                SearchHit {
                    id,
                    distance,
                    fields: Self::parse_row(object),
                }
            })
            .collect();

        Ok(hits)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &str,
        output_fields: &[String],
        consistency_level: ConsistencyLevel,
    ) -> Result<Vec<Row>> {
        let body = json!({
            "collectionName": collection,
            "filter": filter,
            "outputFields": output_fields,
            "consistencyLevel": consistency_level.as_str(),
        });
        let data: Vec<Value> = self.post("entities/query", &body).await?;

        Ok(data
            .iter()
            .filter_map(|value| value.as_object())
            .map(Self::parse_row)
            .collect())
    }
}
