//! Declarative record schemas and path-field validation.
//!
//! A record type describes its own shape through a [`RecordSchema`]. The
//! validator checks that shape once, when a watch is requested, and hands
//! back the [`PathField`] the watch worker stamps on every new record.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Broad shape of a record template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// A struct with named fields.
    Struct,

    /// A plain value such as a number or a string.
    Scalar,
}

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Other,
}

/// Role a field plays for the synchronizer or the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAnnotation {
    /// Holds the path of the mirrored file.
    Path,

    /// Store-assigned identifier.
    PrimaryKey,

    /// Stamped by the store when the record is inserted.
    CreatedAt,
}

/// A single named field in a record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Serialized field name.
    pub name: String,

    /// Declared type.
    pub ty: FieldType,

    /// Optional role annotation.
    pub annotation: Option<FieldAnnotation>,
}

impl FieldDescriptor {
    /// Create an unannotated field.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            annotation: None,
        }
    }

    /// Check whether the field carries the given annotation.
    pub fn is(&self, annotation: FieldAnnotation) -> bool {
        self.annotation == Some(annotation)
    }
}

/// Shape of a record type, as seen by the synchronizer and the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Table (or collection) the records live in.
    pub table: String,

    /// Shape of the template.
    pub kind: TemplateKind,

    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl RecordSchema {
    /// Start a struct schema stored in `table`.
    pub fn record(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: TemplateKind::Struct,
            fields: Vec::new(),
        }
    }

    /// Schema for a plain value; never passes validation.
    pub fn scalar(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kind: TemplateKind::Scalar,
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDescriptor::new(name, ty));
        self
    }

    /// Append a field carrying an annotation.
    pub fn annotated(
        mut self,
        name: impl Into<String>,
        ty: FieldType,
        annotation: FieldAnnotation,
    ) -> Self {
        let mut field = FieldDescriptor::new(name, ty);
        field.annotation = Some(annotation);
        self.fields.push(field);
        self
    }

    /// Shorthand for a string field annotated as the path field.
    pub fn path_field(self, name: impl Into<String>) -> Self {
        self.annotated(name, FieldType::String, FieldAnnotation::Path)
    }

    /// First field carrying the given annotation.
    pub fn find_annotated(&self, annotation: FieldAnnotation) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is(annotation))
    }
}

/// The validated path field of a record template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathField {
    /// Serialized field name.
    pub name: String,

    /// Position in the schema's field list.
    pub index: usize,
}

/// Validate a schema and locate its path field.
///
/// `template` names the record type in error messages.
pub fn validate(template: &str, schema: &RecordSchema) -> Result<PathField> {
    if schema.kind != TemplateKind::Struct {
        return Err(SyncError::InvalidTemplateKind(template.to_string()));
    }

    let annotated: Vec<(usize, &FieldDescriptor)> = schema
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is(FieldAnnotation::Path))
        .collect();

    let (index, field) = match annotated.as_slice() {
        [] => return Err(SyncError::MissingPathField(template.to_string())),
        [single] => *single,
        many => {
            return Err(SyncError::AmbiguousPathField {
                template: template.to_string(),
                fields: many.iter().map(|(_, f)| f.name.clone()).collect(),
            });
        }
    };

    if field.ty != FieldType::String {
        return Err(SyncError::PathFieldWrongType {
            template: template.to_string(),
            field: field.name.clone(),
        });
    }

    Ok(PathField {
        name: field.name.clone(),
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalar_template_rejected() {
        let schema = RecordSchema::scalar("numbers");
        let err = validate("i64", &schema).unwrap_err();
        assert!(matches!(err, SyncError::InvalidTemplateKind(_)));
    }

    #[test]
    fn test_missing_path_field() {
        let schema = RecordSchema::record("things")
            .field("foo", FieldType::Integer)
            .field("bar", FieldType::String);

        let err = validate("Thing", &schema).unwrap_err();
        assert!(matches!(err, SyncError::MissingPathField(_)));
    }

    #[test]
    fn test_path_field_wrong_type() {
        let schema = RecordSchema::record("things")
            .annotated("foo", FieldType::Integer, FieldAnnotation::Path)
            .field("bar", FieldType::String);

        let err = validate("Thing", &schema).unwrap_err();
        match err {
            SyncError::PathFieldWrongType { field, .. } => assert_eq!(field, "foo"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multiple_path_fields_rejected() {
        let schema = RecordSchema::record("things")
            .path_field("a")
            .path_field("b");

        let err = validate("Thing", &schema).unwrap_err();
        match err {
            SyncError::AmbiguousPathField { fields, .. } => {
                assert_eq!(fields, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_valid_schema_returns_field_position() {
        let schema = RecordSchema::record("things")
            .field("foo", FieldType::Integer)
            .path_field("bar");

        let field = validate("Thing", &schema).unwrap();
        assert_eq!(
            field,
            PathField {
                name: "bar".to_string(),
                index: 1,
            }
        );
    }
}
