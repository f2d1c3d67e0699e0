//! Row storage shared by the bundled stores.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::schema::{FieldAnnotation, FieldType, RecordSchema};

/// Rows of one record type, kept as JSON objects in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Table {
    /// Last primary key handed out.
    next_id: u64,

    rows: Vec<Value>,
}

impl Table {
    /// Insert `row`, filling in store-managed fields left at their zero
    /// value. Returns the stored row.
    pub(crate) fn insert(
        &mut self,
        schema: &RecordSchema,
        zero: &Value,
        mut row: Value,
    ) -> Result<Value> {
        let Some(map) = row.as_object_mut() else {
            return Err(SyncError::Store(format!(
                "row for table {} is not an object",
                schema.table
            )));
        };

        for field in &schema.fields {
            let unset = map.get(&field.name) == zero.get(&field.name);
            match field.annotation {
                Some(FieldAnnotation::PrimaryKey) if field.ty == FieldType::Integer => {
                    if unset {
                        self.next_id += 1;
                        map.insert(field.name.clone(), Value::from(self.next_id));
                    } else if let Some(id) = map.get(&field.name).and_then(Value::as_u64) {
                        self.next_id = self.next_id.max(id);
                    }
                }
                Some(FieldAnnotation::CreatedAt) if field.ty == FieldType::Timestamp && unset => {
                    map.insert(field.name.clone(), serde_json::to_value(Utc::now())?);
                }
                _ => {}
            }
        }

        self.rows.push(row.clone());
        Ok(row)
    }

    /// Rows matching every set field of `filter`.
    pub(crate) fn find(&self, zero: &Value, filter: &Value) -> Vec<Value> {
        let conditions: Vec<(&String, &Value)> = filter
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(name, value)| zero.get(name.as_str()) != Some(*value))
                    .collect()
            })
            .unwrap_or_default();

        self.rows
            .iter()
            .filter(|row| {
                conditions
                    .iter()
                    .all(|(name, value)| row.get(name.as_str()) == Some(*value))
            })
            .cloned()
            .collect()
    }

    /// Delete `row`, by primary key when the schema has one that is set,
    /// otherwise by equality. Returns the number of rows removed.
    pub(crate) fn delete(&mut self, schema: &RecordSchema, zero: &Value, row: &Value) -> usize {
        let before = self.rows.len();

        let key = schema
            .find_annotated(FieldAnnotation::PrimaryKey)
            .map(|field| field.name.as_str())
            .and_then(|name| {
                row.get(name)
                    .filter(|value| zero.get(name) != Some(*value))
                    .map(|value| (name, value))
            });

        match key {
            Some((name, value)) => self.rows.retain(|r| r.get(name) != Some(value)),
            None => self.rows.retain(|r| r != row),
        }

        before - self.rows.len()
    }

    /// All rows in insertion order.
    pub(crate) fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> RecordSchema {
        RecordSchema::record("files")
            .annotated("id", FieldType::Integer, FieldAnnotation::PrimaryKey)
            .path_field("path")
            .annotated("created_at", FieldType::Timestamp, FieldAnnotation::CreatedAt)
    }

    fn zero() -> Value {
        json!({"id": 0, "path": "", "created_at": null})
    }

    fn row(path: &str) -> Value {
        json!({"id": 0, "path": path, "created_at": null})
    }

    #[test]
    fn test_insert_assigns_ids_and_timestamps() {
        let mut table = Table::default();
        let a = table.insert(&schema(), &zero(), row("/d/a")).unwrap();
        let b = table.insert(&schema(), &zero(), row("/d/b")).unwrap();

        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert!(a["created_at"].is_string());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_explicit_id_advances_counter() {
        let mut table = Table::default();
        let mut explicit = row("/d/a");
        explicit["id"] = json!(10);
        table.insert(&schema(), &zero(), explicit).unwrap();

        let next = table.insert(&schema(), &zero(), row("/d/b")).unwrap();
        assert_eq!(next["id"], json!(11));
    }

    #[test]
    fn test_find_uses_only_set_fields() {
        let mut table = Table::default();
        table.insert(&schema(), &zero(), row("/d/a")).unwrap();
        table.insert(&schema(), &zero(), row("/d/b")).unwrap();
        table.insert(&schema(), &zero(), row("/d/a")).unwrap();

        let found = table.find(&zero(), &row("/d/a"));
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r["path"] == json!("/d/a")));

        assert!(table.find(&zero(), &row("/d/missing")).is_empty());
    }

    #[test]
    fn test_delete_by_primary_key() {
        let mut table = Table::default();
        let a = table.insert(&schema(), &zero(), row("/d/a")).unwrap();
        table.insert(&schema(), &zero(), row("/d/a")).unwrap();

        assert_eq!(table.delete(&schema(), &zero(), &a), 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0]["id"], json!(2));
    }

    #[test]
    fn test_delete_by_equality_without_key() {
        let schema = RecordSchema::record("paths").path_field("path");
        let zero = json!({"path": ""});
        let mut table = Table::default();
        table.insert(&schema, &zero, json!({"path": "/d/a"})).unwrap();
        table.insert(&schema, &zero, json!({"path": "/d/b"})).unwrap();

        assert_eq!(table.delete(&schema, &zero, &json!({"path": "/d/a"})), 1);
        assert_eq!(table.delete(&schema, &zero, &json!({"path": "/d/a"})), 0);
        assert_eq!(table.rows(), &[json!({"path": "/d/b"})]);
    }
}
