use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::schema::{CollectionSchema, FieldType};

/// Single typed field value, always looked up by field name rather than by
/// positional index.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int64(i64),
    Float(f64),
    VarChar(String),
    FloatVector(Vec<f32>),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::VarChar(v) => Some(v),
            _ => None,
        }
    }

    /// Best-effort conversion from a JSON value in a store response.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Int64(i))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            Value::String(s) => Some(FieldValue::VarChar(s.clone())),
            Value::Array(items) => {
                let floats: Option<Vec<f32>> = items
                    .iter()
                    .map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                floats.map(FieldValue::FloatVector)
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Int64(v) => json!(v),
            FieldValue::Float(v) => json!(v),
            FieldValue::VarChar(v) => json!(v),
            FieldValue::FloatVector(v) => json!(v),
        }
    }
}

/// One row of a query/search response, keyed by field name
pub type Row = BTreeMap<String, FieldValue>;

/// Column of values for one field of a write batch
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Int64(Vec<i64>),
    VarChar(Vec<String>),
    FloatVector(Vec<Vec<f32>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::VarChar(v) => v.len(),
            ColumnValues::FloatVector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches(&self, field_type: &FieldType) -> bool {
        matches!(
            (self, field_type),
            (ColumnValues::Int64(_), FieldType::Int64)
                | (ColumnValues::VarChar(_), FieldType::VarChar { .. })
                | (ColumnValues::FloatVector(_), FieldType::FloatVector { .. })
        )
    }

    fn value_at(&self, row: usize) -> FieldValue {
        match self {
            ColumnValues::Int64(v) => FieldValue::Int64(v[row]),
            ColumnValues::VarChar(v) => FieldValue::VarChar(v[row].clone()),
            ColumnValues::FloatVector(v) => FieldValue::FloatVector(v[row].clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldColumn {
    pub name: String,
    pub values: ColumnValues,
}

/// Why a write batch was rejected before reaching the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchShapeError {
    /// Field value sequences differ in length across the batch
    Length(String),
    /// Field names or types do not match the collection schema
    Mismatch(String),
}

/// Columnar write batch: one value column per schema field, aligned by row
/// index.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    columns: Vec<FieldColumn>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, values: ColumnValues) -> Self {
        self.columns.push(FieldColumn {
            name: name.to_string(),
            values,
        });
        self
    }

    pub fn int64(self, name: &str, values: Vec<i64>) -> Self {
        self.with_column(name, ColumnValues::Int64(values))
    }

    pub fn varchar(self, name: &str, values: Vec<String>) -> Self {
        self.with_column(name, ColumnValues::VarChar(values))
    }

    pub fn float_vector(self, name: &str, values: Vec<Vec<f32>>) -> Self {
        self.with_column(name, ColumnValues::FloatVector(values))
    }

    pub fn columns(&self) -> &[FieldColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&FieldColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Checks the batch against a schema: every schema field present exactly
    /// once with the right type, no extra fields, all columns equal length.
    /// Runs entirely locally, before any network call.
    pub fn validate(&self, schema: &CollectionSchema) -> Result<(), BatchShapeError> {
        if self.columns.is_empty() {
            return Err(BatchShapeError::Mismatch("batch has no columns".to_string()));
        }

        for column in &self.columns {
            let field = schema.field(&column.name).ok_or_else(|| {
                BatchShapeError::Mismatch(format!(
                    "field '{}' is not in the schema",
                    column.name
                ))
            })?;
            if !column.values.matches(&field.field_type) {
                return Err(BatchShapeError::Mismatch(format!(
                    "field '{}' expects {} values",
                    column.name,
                    field.field_type.data_type_name()
                )));
            }
            if let (ColumnValues::FloatVector(vectors), FieldType::FloatVector { dim }) =
                (&column.values, &field.field_type)
            {
                if let Some(bad) = vectors.iter().find(|v| v.len() != *dim) {
                    return Err(BatchShapeError::Mismatch(format!(
                        "field '{}' expects {}-dim vectors, got {}",
                        column.name,
                        dim,
                        bad.len()
                    )));
                }
            }
        }

        for field in schema.fields() {
            if self.column(&field.name).is_none() {
                return Err(BatchShapeError::Mismatch(format!(
                    "schema field '{}' is missing from the batch",
                    field.name
                )));
            }
        }

        let expected = self.row_count();
        for column in &self.columns {
            if column.values.len() != expected {
                return Err(BatchShapeError::Length(format!(
                    "field '{}' has {} values, expected {}",
                    column.name,
                    column.values.len(),
                    expected
                )));
            }
        }

        Ok(())
    }

    /// Row-oriented view of the batch, as the v2 REST insert/upsert endpoints
    /// expect. Call only after `validate`.
    pub fn to_json_rows(&self) -> Vec<Value> {
        (0..self.row_count())
            .map(|row| {
                let mut object = serde_json::Map::new();
                for column in &self.columns {
                    object.insert(column.name.clone(), column.values.value_at(row).to_json());
                }
                Value::Object(object)
            })
            .collect()
    }

    /// Typed rows keyed by field name, used by the in-memory store.
    pub fn rows(&self) -> Vec<Row> {
        (0..self.row_count())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values.value_at(row)))
                    .collect()
            })
            .collect()
    }
}
