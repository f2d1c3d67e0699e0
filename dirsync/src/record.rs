//! The record capability that synchronized types implement.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::schema::{self, PathField, RecordSchema};

/// A type whose instances mirror files in a watched directory.
///
/// The schema's field names must match the type's serialized field names.
/// Fresh instances start from `Default` and have only the path field set.
///
/// ```rust,ignore
/// #[derive(Default, Serialize, Deserialize)]
/// struct Document {
///     id: u64,
///     path: String,
/// }
///
/// impl Record for Document {
///     fn schema() -> RecordSchema {
///         RecordSchema::record("documents")
///             .annotated("id", FieldType::Integer, FieldAnnotation::PrimaryKey)
///             .path_field("path")
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Declared shape of the record.
    fn schema() -> RecordSchema;

    /// Name used in logs and error messages.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Validate `R` and locate its path field.
///
/// Checks the declared schema first, then that the serialized form of
/// `R::default()` agrees with it.
pub fn validate_record<R: Record>() -> Result<PathField> {
    let template = R::type_name();
    let field = schema::validate(template, &R::schema())?;

    let Value::Object(map) = serde_json::to_value(R::default())? else {
        return Err(SyncError::InvalidTemplateKind(template.to_string()));
    };

    match map.get(&field.name) {
        Some(Value::String(_)) => Ok(field),
        None => Err(SyncError::MissingPathField(template.to_string())),
        Some(_) => Err(SyncError::PathFieldWrongType {
            template: template.to_string(),
            field: field.name,
        }),
    }
}

/// Build a fresh `R` with its path field set to `path`.
pub fn with_path<R: Record>(field: &PathField, path: &str) -> Result<R> {
    let mut value = serde_json::to_value(R::default())?;
    let Some(map) = value.as_object_mut() else {
        return Err(SyncError::InvalidTemplateKind(R::type_name().to_string()));
    };
    map.insert(field.name.clone(), Value::String(path.to_string()));
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldAnnotation, FieldType};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Tracked {
        id: u64,
        path: String,
        size: u64,
    }

    impl Record for Tracked {
        fn schema() -> RecordSchema {
            RecordSchema::record("tracked")
                .annotated("id", FieldType::Integer, FieldAnnotation::PrimaryKey)
                .path_field("path")
                .field("size", FieldType::Integer)
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Counter(i64);

    impl Record for Counter {
        fn schema() -> RecordSchema {
            RecordSchema::scalar("counters")
        }
    }

    /// Claims a struct shape but serializes as a bare number.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Misdeclared(i64);

    impl Record for Misdeclared {
        fn schema() -> RecordSchema {
            RecordSchema::record("misdeclared").path_field("path")
        }
    }

    /// Declares the path as a string but stores a number.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct NumericPath {
        path: i64,
    }

    impl Record for NumericPath {
        fn schema() -> RecordSchema {
            RecordSchema::record("numeric").path_field("path")
        }
    }

    /// Names a path field the type does not serialize.
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Renamed {
        location: String,
    }

    impl Record for Renamed {
        fn schema() -> RecordSchema {
            RecordSchema::record("renamed").path_field("path")
        }
    }

    #[test]
    fn test_validate_record() {
        let field = validate_record::<Tracked>().unwrap();
        assert_eq!(field.name, "path");
        assert_eq!(field.index, 1);
    }

    #[test]
    fn test_scalar_record_rejected() {
        let err = validate_record::<Counter>().unwrap_err();
        assert!(matches!(err, SyncError::InvalidTemplateKind(_)));
    }

    #[test]
    fn test_serialized_shape_must_be_object() {
        let err = validate_record::<Misdeclared>().unwrap_err();
        assert!(matches!(err, SyncError::InvalidTemplateKind(_)));
    }

    #[test]
    fn test_serialized_path_must_be_string() {
        let err = validate_record::<NumericPath>().unwrap_err();
        assert!(matches!(err, SyncError::PathFieldWrongType { .. }));
    }

    #[test]
    fn test_serialized_path_must_exist() {
        let err = validate_record::<Renamed>().unwrap_err();
        assert!(matches!(err, SyncError::MissingPathField(_)));
    }

    #[test]
    fn test_with_path_builds_fresh_instance() {
        let field = validate_record::<Tracked>().unwrap();
        let record: Tracked = with_path(&field, "/data/report.pdf").unwrap();

        assert_eq!(
            record,
            Tracked {
                id: 0,
                path: "/data/report.pdf".to_string(),
                size: 0,
            }
        );
    }
}
