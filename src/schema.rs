use std::collections::HashSet;

/// Field type for a collection schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int64,
    VarChar { max_length: usize },
    FloatVector { dim: usize },
}

impl FieldType {
    /// Milvus data type name as used by the v2 REST API
    pub fn data_type_name(&self) -> &'static str {
        match self {
            FieldType::Int64 => "Int64",
            FieldType::VarChar { .. } => "VarChar",
            FieldType::FloatVector { .. } => "FloatVector",
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, FieldType::FloatVector { .. })
    }
}

/// Single field definition in a collection schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub is_primary_key: bool,
}

impl FieldDefinition {
    pub fn primary_int64(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Int64,
            is_primary_key: true,
        }
    }

    pub fn int64(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Int64,
            is_primary_key: false,
        }
    }

    pub fn varchar(name: &str, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::VarChar { max_length },
            is_primary_key: false,
        }
    }

    pub fn float_vector(name: &str, dim: usize) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::FloatVector { dim },
            is_primary_key: false,
        }
    }
}

/// Ordered, immutable schema for one collection.
///
/// The field set is fixed at creation time; changing it means dropping and
/// recreating the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    fields: Vec<FieldDefinition>,
}

impl CollectionSchema {
    /// Builds a schema, rejecting malformed field sets before anything is
    /// sent to the store. Returns a human-readable reason on failure; the
    /// workflow layer wraps it with the collection name.
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self, String> {
        if fields.is_empty() {
            return Err("schema has no fields".to_string());
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.is_empty() {
                return Err("field with empty name".to_string());
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("duplicate field name '{}'", field.name));
            }
            match field.field_type {
                FieldType::FloatVector { dim } if dim == 0 => {
                    return Err(format!(
                        "vector field '{}' has non-positive dimension",
                        field.name
                    ));
                }
                FieldType::VarChar { max_length } if max_length == 0 => {
                    return Err(format!(
                        "varchar field '{}' has non-positive max length",
                        field.name
                    ));
                }
                _ => {}
            }
            if field.is_primary_key && field.field_type.is_vector() {
                return Err(format!(
                    "primary key '{}' cannot be a vector field",
                    field.name
                ));
            }
        }

        let primary_count = fields.iter().filter(|f| f.is_primary_key).count();
        if primary_count != 1 {
            return Err(format!(
                "schema must have exactly one primary key, found {}",
                primary_count
            ));
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key(&self) -> &FieldDefinition {
        // new() guarantees exactly one
        self.fields
            .iter()
            .find(|f| f.is_primary_key)
            .expect("schema validated with one primary key")
    }
}
