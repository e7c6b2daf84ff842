//! RecordSchema - the fixed shape of one review record
//!
//! The engine maps these semantic types onto its own physical column types;
//! this crate only describes names, order and nullability.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic field type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 text
    String,
    /// 64-bit float
    Double,
    /// 64-bit signed integer
    Long,
}

impl FieldType {
    /// Name used in schema tree rendering
    pub fn simple_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Double => "double",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.simple_name())
    }
}

/// One column of the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: FieldType,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, data_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    fields: Vec<FieldSpec>,
}

/// Field layout of a review record, in column order.
const REVIEW_FIELDS: [(&str, FieldType); 9] = [
    ("reviewerID", FieldType::String),
    ("asin", FieldType::String),
    ("reviewerName", FieldType::String),
    ("helpful", FieldType::String),
    ("reviewText", FieldType::String),
    ("overall", FieldType::Double),
    ("summary", FieldType::String),
    ("unixReviewTime", FieldType::Long),
    ("reviewTime", FieldType::String),
];

impl RecordSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// The 9-field review schema. Every field is nullable.
    pub fn reviews() -> Self {
        Self::new(
            REVIEW_FIELDS
                .iter()
                .map(|(name, ty)| FieldSpec::new(*name, *ty, true))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Position of a field by exact name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Render as an indented tree:
    ///
    /// ```text
    /// root
    ///  |-- reviewerID: string (nullable = true)
    /// ```
    pub fn tree_string(&self) -> String {
        let mut out = String::from("root\n");
        for field in &self.fields {
            out.push_str(&format!(
                " |-- {}: {} (nullable = {})\n",
                field.name, field.data_type, field.nullable
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_schema_order() {
        let schema = RecordSchema::reviews();
        let names: Vec<_> = schema.field_names().collect();
        assert_eq!(
            names,
            vec![
                "reviewerID",
                "asin",
                "reviewerName",
                "helpful",
                "reviewText",
                "overall",
                "summary",
                "unixReviewTime",
                "reviewTime",
            ]
        );
        assert!(schema.fields().iter().all(|f| f.nullable));
    }

    #[test]
    fn test_review_schema_types() {
        let schema = RecordSchema::reviews();
        let overall = &schema.fields()[schema.index_of("overall").unwrap()];
        assert_eq!(overall.data_type, FieldType::Double);
        let time = &schema.fields()[schema.index_of("unixReviewTime").unwrap()];
        assert_eq!(time.data_type, FieldType::Long);
        assert_eq!(schema.index_of("missing"), None);
    }

    #[test]
    fn test_tree_string() {
        let tree = RecordSchema::reviews().tree_string();
        assert!(tree.starts_with("root\n"));
        assert!(tree.contains(" |-- overall: double (nullable = true)"));
        assert!(tree.contains(" |-- unixReviewTime: long (nullable = true)"));
        assert_eq!(tree.lines().count(), 10);
    }
}
