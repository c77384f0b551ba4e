use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::{StoreError, Value};

pub type Fields = BTreeMap<String, Value>;

/// A stored document: its id within the collection, its fields and the
/// store-assigned create/update times.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
    pub create_time: OffsetDateTime,
    pub update_time: OffsetDateTime,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn string(&self, field: &str) -> Result<String, StoreError> {
        self.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| self.missing(field, "string"))
    }

    pub fn optional_string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(Value::as_str).map(str::to_string)
    }

    pub fn integer(&self, field: &str) -> Result<i64, StoreError> {
        self.get(field)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.missing(field, "integer"))
    }

    pub fn optional_integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn timestamp(&self, field: &str) -> Result<OffsetDateTime, StoreError> {
        self.get(field)
            .and_then(Value::as_timestamp)
            .ok_or_else(|| self.missing(field, "timestamp"))
    }

    pub fn optional_timestamp(&self, field: &str) -> Option<OffsetDateTime> {
        self.get(field).and_then(Value::as_timestamp)
    }

    fn missing(&self, field: &str, expected: &str) -> StoreError {
        StoreError::decode(format!(
            "document '{}' has no {} field '{}'",
            self.id, expected, field
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn doc() -> Document {
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::from("Apollo"));
        fields.insert("count".into(), Value::Integer(3));
        fields.insert("note".into(), Value::Null);
        Document {
            id: "p1".into(),
            fields,
            create_time: datetime!(2024-01-01 00:00 UTC),
            update_time: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn typed_getters_read_present_fields() {
        let doc = doc();
        assert_eq!(doc.string("name").unwrap(), "Apollo");
        assert_eq!(doc.integer("count").unwrap(), 3);
    }

    #[test]
    fn null_fields_count_as_missing() {
        let doc = doc();
        assert_eq!(doc.optional_string("note"), None);
        assert!(matches!(doc.string("note"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn wrong_type_is_a_decode_error() {
        let doc = doc();
        assert!(doc.integer("name").is_err());
    }
}
