use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use tokio::sync::RwLock;

use super::{
    ConsistencyLevel, IndexType, InsertOutcome, LoadState, MetricType, SearchHit, SearchRequest,
    UpsertOutcome, VectorStore,
};
use crate::record::{FieldValue, RecordBatch, Row};
use crate::schema::CollectionSchema;

/// Deterministic in-process vector store.
///
/// Used by the integration tests and by the demo binary when no Milvus
/// endpoint is configured. Reads are strongly consistent by construction, so
/// every consistency level behaves like Strong here. Search is a brute-force
/// scan; this is a stand-in for the remote service, not a database engine.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

struct MemoryCollection {
    schema: CollectionSchema,
    // keyed by primary-key value rendered as a string, so Int64 and VarChar
    // keys share one map
    rows: BTreeMap<String, Row>,
    insertion_order: Vec<String>,
    index_field: Option<String>,
    load_state: LoadState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(value: &FieldValue) -> String {
        match value {
            FieldValue::Int64(v) => v.to_string(),
            FieldValue::VarChar(v) => v.clone(),
            other => format!("{:?}", other),
        }
    }

    fn project(row: &Row, output_fields: &[String]) -> Row {
        if output_fields.is_empty() {
            return row.clone();
        }
        row.iter()
            .filter(|(name, _)| output_fields.iter().any(|f| f == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryStore {
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
        _shards_num: u32,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            bail!("collection '{}' already exists", name);
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                schema: schema.clone(),
                rows: BTreeMap::new(),
                insertion_order: Vec::new(),
                index_field: None,
                load_state: LoadState::NotLoaded,
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        _index_type: IndexType,
        _metric: MetricType,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", collection))?;
        if entry.schema.field(field).is_none() {
            bail!("field '{}' does not exist in '{}'", field, collection);
        }
        entry.index_field = Some(field.to_string());
        Ok(())
    }

    async fn load_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", name))?;
        entry.load_state = LoadState::Loaded;
        Ok(())
    }

    async fn load_state(&self, name: &str) -> Result<LoadState> {
        let collections = self.collections.read().await;
        let entry = collections
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", name))?;
        Ok(entry.load_state)
    }

    async fn insert(&self, collection: &str, batch: &RecordBatch) -> Result<InsertOutcome> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", collection))?;

        let pk_name = entry.schema.primary_key().name.clone();
        let mut ids = Vec::new();
        for row in batch.rows() {
            let id = row
                .get(&pk_name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("row is missing primary key '{}'", pk_name))?;
            let key = Self::key_of(&id);
            if !entry.rows.contains_key(&key) {
                entry.insertion_order.push(key.clone());
            }
            entry.rows.insert(key, row);
            ids.push(id);
        }

        let insert_count = ids.len() as u64;
        Ok(InsertOutcome { ids, insert_count })
    }

    async fn upsert(&self, collection: &str, batch: &RecordBatch) -> Result<UpsertOutcome> {
        // insert already overwrites on primary-key collision
        let outcome = self.insert(collection, batch).await?;
        Ok(UpsertOutcome {
            upsert_count: outcome.insert_count,
        })
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<u64> {
        let expr = FilterExpr::parse(filter)?;
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", collection))?;

        let doomed: Vec<String> = entry
            .rows
            .iter()
            .filter(|(_, row)| expr.matches(row))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entry.rows.remove(key);
            entry.insertion_order.retain(|k| k != key);
        }
        Ok(doomed.len() as u64)
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let entry = collections
            .get(collection)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", collection))?;

        let pk_name = &entry.schema.primary_key().name;
        let mut hits = Vec::new();
        for query in &request.query_vectors {
            let mut scored: Vec<(f32, &Row)> = entry
                .rows
                .values()
                .filter_map(|row| match row.get(&request.target_field) {
                    Some(FieldValue::FloatVector(v)) if v.len() == query.len() => {
                        Some((distance(request.metric, query, v), row))
                    }
                    _ => None,
                })
                .collect();

            // L2 ranks ascending, IP/COSINE descending
            match request.metric {
                MetricType::L2 => scored.sort_by(|a, b| a.0.total_cmp(&b.0)),
                MetricType::Ip | MetricType::Cosine => scored.sort_by(|a, b| b.0.total_cmp(&a.0)),
            }
            scored.truncate(request.limit);

            for (dist, row) in scored {
                let id = row
                    .get(pk_name)
                    .cloned()
                    .unwrap_or(FieldValue::Int64(0));
                hits.push(SearchHit {
                    id,
                    distance: dist,
                    fields: Self::project(row, &request.output_fields),
                });
            }
        }
        Ok(hits)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &str,
        output_fields: &[String],
        _consistency_level: ConsistencyLevel,
    ) -> Result<Vec<Row>> {
        let expr = FilterExpr::parse(filter)?;
        let collections = self.collections.read().await;
        let entry = collections
            .get(collection)
            .ok_or_else(|| anyhow::anyhow!("collection '{}' does not exist", collection))?;

        Ok(entry
            .insertion_order
            .iter()
            .filter_map(|key| entry.rows.get(key))
            .filter(|row| expr.matches(row))
            .map(|row| Self::project(row, output_fields))
            .collect())
    }
}

fn distance(metric: MetricType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>(),
        MetricType::Ip => a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        MetricType::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
    }
}

/// Scalar filter expression over row fields.
///
/// Supports the grammar the workflow uses: `field in [v1, v2, ...]`, binary
/// comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`), and conjunction with
/// `and`. Values are integer or double-quoted string literals.
#[derive(Debug, Clone, PartialEq)]
enum FilterExpr {
    In {
        field: String,
        values: Vec<Literal>,
    },
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    And(Vec<FilterExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Int(i64),
    Str(String),
}

impl Literal {
    fn parse(token: &str) -> Result<Literal> {
        let token = token.trim();
        if let Some(stripped) = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .or_else(|| token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
        {
            return Ok(Literal::Str(stripped.to_string()));
        }
        token
            .parse::<i64>()
            .map(Literal::Int)
            .map_err(|_| anyhow::anyhow!("bad literal '{}' in filter", token))
    }

    fn matches_value(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Literal::Int(a), FieldValue::Int64(b)) => a == b,
            (Literal::Str(a), FieldValue::VarChar(b)) => a == b,
            _ => false,
        }
    }
}

impl FilterExpr {
    fn parse(filter: &str) -> Result<FilterExpr> {
        let filter = filter.trim();
        if filter.is_empty() {
            bail!("empty filter expression");
        }

        let clauses: Vec<&str> = split_conjunction(filter);
        if clauses.len() > 1 {
            let parsed: Result<Vec<FilterExpr>> =
                clauses.iter().map(|c| FilterExpr::parse_clause(c)).collect();
            return Ok(FilterExpr::And(parsed?));
        }
        FilterExpr::parse_clause(filter)
    }

    fn parse_clause(clause: &str) -> Result<FilterExpr> {
        let clause = clause.trim();

        if let Some(open) = clause.find(" in ") {
            let field = clause[..open].trim().to_string();
            let rest = clause[open + 4..].trim();
            let inner = rest
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(|| anyhow::anyhow!("expected [list] after 'in': {}", clause))?;
            let values: Result<Vec<Literal>> = inner
                .split(',')
                .filter(|t| !t.trim().is_empty())
                .map(Literal::parse)
                .collect();
            return Ok(FilterExpr::In {
                field,
                values: values?,
            });
        }

        // longest operators first so "<=" is not read as "<"
        for (token, op) in [
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ] {
            if let Some(pos) = clause.find(token) {
                let field = clause[..pos].trim().to_string();
                let value = Literal::parse(&clause[pos + token.len()..])?;
                if field.is_empty() {
                    bail!("missing field name in filter clause '{}'", clause);
                }
                return Ok(FilterExpr::Compare { field, op, value });
            }
        }

        bail!("unsupported filter clause '{}'", clause)
    }

    fn matches(&self, row: &Row) -> bool {
        match self {
            FilterExpr::In { field, values } => row
                .get(field)
                .map_or(false, |v| values.iter().any(|l| l.matches_value(v))),
            FilterExpr::Compare { field, op, value } => {
                let Some(actual) = row.get(field) else {
                    return false;
                };
                match (actual, value) {
                    (FieldValue::Int64(a), Literal::Int(b)) => compare(*op, a.cmp(b)),
                    (FieldValue::VarChar(a), Literal::Str(b)) => compare(*op, a.as_str().cmp(b.as_str())),
                    _ => false,
                }
            }
            FilterExpr::And(clauses) => clauses.iter().all(|c| c.matches(row)),
        }
    }
}

fn compare(op: CompareOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Eq => ordering == Equal,
        CompareOp::Ne => ordering != Equal,
        CompareOp::Lt => ordering == Less,
        CompareOp::Le => ordering != Greater,
        CompareOp::Gt => ordering == Greater,
        CompareOp::Ge => ordering != Less,
    }
}

/// Splits on top-level `and`/`&&`, leaving bracketed lists intact
fn split_conjunction(filter: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = filter.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'&' if depth == 0 && bytes.get(i + 1) == Some(&b'&') => {
                clauses.push(&filter[start..i]);
                i += 2;
                start = i;
                continue;
            }
            b' ' if depth == 0 => {
                let rest = &filter[i..];
                if rest.get(..5).map_or(false, |t| t.eq_ignore_ascii_case(" and ")) {
                    clauses.push(&filter[start..i]);
                    i += 5;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    clauses.push(&filter[start..]);
    clauses.into_iter().map(str::trim).filter(|c| !c.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, count: i64) -> Row {
        let mut row = Row::new();
        row.insert("book_id".to_string(), FieldValue::Int64(id));
        row.insert("word_count".to_string(), FieldValue::Int64(count));
        row
    }

    #[test]
    fn test_parse_in_list() {
        let expr = FilterExpr::parse("book_id in [2,4,6,8]").unwrap();
        assert!(expr.matches(&row(4, 100)));
        assert!(!expr.matches(&row(5, 100)));
    }

    #[test]
    fn test_parse_comparison() {
        let expr = FilterExpr::parse("word_count >= 300").unwrap();
        assert!(expr.matches(&row(1, 300)));
        assert!(!expr.matches(&row(1, 299)));
    }

    #[test]
    fn test_parse_conjunction() {
        let expr = FilterExpr::parse("book_id in [1,2] and word_count > 100").unwrap();
        assert!(expr.matches(&row(1, 200)));
        assert!(!expr.matches(&row(1, 50)));
        assert!(!expr.matches(&row(3, 200)));
    }

    #[test]
    fn test_string_literal() {
        let expr = FilterExpr::parse("book_name == \"moby\"").unwrap();
        let mut r = Row::new();
        r.insert(
            "book_name".to_string(),
            FieldValue::VarChar("moby".to_string()),
        );
        assert!(expr.matches(&r));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(FilterExpr::parse("").is_err());
        assert!(FilterExpr::parse("book_id like 3").is_err());
    }

    #[test]
    fn test_l2_ranks_ascending() {
        assert!(distance(MetricType::L2, &[0.0, 0.0], &[1.0, 1.0]) > 0.0);
        assert_eq!(distance(MetricType::L2, &[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }
}
