//! Translation between store types and the Firestore REST JSON encoding.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value as Json};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    Direction, Document, FieldValue, FieldWrites, Fields, Filter, FilterOp, Query, StoreError,
    Value, Write,
};

use super::FirestoreURL;

pub(crate) fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Boolean(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        Value::Integer(i) => json!({ "integerValue": i.to_string() }),
        Value::Double(d) => json!({ "doubleValue": d }),
        Value::Timestamp(t) => json!({ "timestampValue": format_timestamp(*t) }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            json!({ "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

pub(crate) fn encode_fields(fields: &BTreeMap<String, Value>) -> Json {
    Json::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect::<Map<_, _>>(),
    )
}

pub(crate) fn decode_value(json: &Json) -> Result<Value, StoreError> {
    let object = json
        .as_object()
        .ok_or_else(|| StoreError::decode(format!("expected value object, got {}", json)))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| StoreError::decode("empty value object"))?;

    let value = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Boolean(
            inner
                .as_bool()
                .ok_or_else(|| StoreError::decode("booleanValue is not a bool"))?,
        ),
        "integerValue" => Value::Integer(match inner {
            Json::String(s) => s
                .parse()
                .map_err(|e| StoreError::decode(format!("bad integerValue '{}': {}", s, e)))?,
            other => other
                .as_i64()
                .ok_or_else(|| StoreError::decode("integerValue is not an integer"))?,
        }),
        "doubleValue" => Value::Double(
            inner
                .as_f64()
                .ok_or_else(|| StoreError::decode("doubleValue is not a number"))?,
        ),
        "timestampValue" => Value::Timestamp(parse_timestamp(
            inner
                .as_str()
                .ok_or_else(|| StoreError::decode("timestampValue is not a string"))?,
        )?),
        "stringValue" | "referenceValue" => Value::String(
            inner
                .as_str()
                .ok_or_else(|| StoreError::decode("stringValue is not a string"))?
                .to_string(),
        ),
        "arrayValue" => Value::Array(match inner.get("values").and_then(Json::as_array) {
            Some(values) => values.iter().map(decode_value).collect::<Result<_, _>>()?,
            None => Vec::new(),
        }),
        "mapValue" => Value::Map(decode_fields(inner.get("fields"))?),
        other => return Err(StoreError::decode(format!("unsupported value type '{}'", other))),
    };

    Ok(value)
}

pub(crate) fn decode_fields(json: Option<&Json>) -> Result<Fields, StoreError> {
    let Some(object) = json.and_then(Json::as_object) else {
        return Ok(Fields::new());
    };
    object
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

pub(crate) fn decode_document(json: &Json) -> Result<Document, StoreError> {
    let name = json
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| StoreError::decode("document has no name"))?;
    let id = name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::decode(format!("malformed document name '{}'", name)))?;

    let time_field = |field: &str| -> Result<OffsetDateTime, StoreError> {
        json.get(field)
            .and_then(Json::as_str)
            .ok_or_else(|| StoreError::decode(format!("document '{}' has no {}", id, field)))
            .and_then(parse_timestamp)
    };

    Ok(Document {
        id: id.to_string(),
        fields: decode_fields(json.get("fields"))?,
        create_time: time_field("createTime")?,
        update_time: time_field("updateTime")?,
    })
}

/// Decode a `runQuery` response: one element per result, plus a trailing
/// element carrying only a read time when nothing matched.
pub(crate) fn decode_query_response(json: &Json) -> Result<Vec<Document>, StoreError> {
    let rows = json
        .as_array()
        .ok_or_else(|| StoreError::decode("runQuery response is not an array"))?;
    rows.iter()
        .filter_map(|row| row.get("document"))
        .map(decode_document)
        .collect()
}

pub(crate) fn decode_count_response(json: &Json, alias: &str) -> Result<u64, StoreError> {
    let rows = json
        .as_array()
        .ok_or_else(|| StoreError::decode("runAggregationQuery response is not an array"))?;
    let field = rows
        .iter()
        .find_map(|row| row.pointer(&format!("/result/aggregateFields/{}", alias)))
        .ok_or_else(|| StoreError::decode("aggregation result missing"))?;

    let count = decode_value(field)?
        .as_i64()
        .ok_or_else(|| StoreError::decode("aggregation count is not an integer"))?;
    u64::try_from(count).map_err(|_| StoreError::decode("negative aggregation count"))
}

fn op_name(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Equal => "EQUAL",
        FilterOp::NotEqual => "NOT_EQUAL",
        FilterOp::LessThan => "LESS_THAN",
        FilterOp::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
        FilterOp::GreaterThan => "GREATER_THAN",
        FilterOp::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        FilterOp::In => "IN",
    }
}

fn encode_filter(filter: &Filter) -> Json {
    json!({
        "fieldFilter": {
            "field": { "fieldPath": filter.field },
            "op": op_name(filter.op),
            "value": encode_value(&filter.value),
        }
    })
}

pub(crate) fn encode_structured_query(query: &Query) -> Json {
    let mut structured = Map::new();
    structured.insert(
        "from".into(),
        json!([{ "collectionId": query.collection }]),
    );

    match query.filters.as_slice() {
        [] => {}
        [single] => {
            structured.insert("where".into(), encode_filter(single));
        }
        many => {
            structured.insert(
                "where".into(),
                json!({
                    "compositeFilter": {
                        "op": "AND",
                        "filters": many.iter().map(encode_filter).collect::<Vec<_>>(),
                    }
                }),
            );
        }
    }

    if !query.order_by.is_empty() {
        let orders: Vec<Json> = query
            .order_by
            .iter()
            .map(|o| {
                json!({
                    "field": { "fieldPath": o.field },
                    "direction": match o.direction {
                        Direction::Ascending => "ASCENDING",
                        Direction::Descending => "DESCENDING",
                    },
                })
            })
            .collect();
        structured.insert("orderBy".into(), Json::Array(orders));
    }

    if let Some(limit) = query.limit {
        structured.insert("limit".into(), json!(limit));
    }

    Json::Object(structured)
}

/// Split field writes into plain values and server-side transforms.
fn split_field_writes(fields: &FieldWrites) -> (BTreeMap<String, Value>, Vec<Json>) {
    let mut values = BTreeMap::new();
    let mut transforms = Vec::new();

    for (name, write) in fields {
        match write {
            FieldValue::Value(v) => {
                values.insert(name.clone(), v.clone());
            }
            FieldValue::ServerTimestamp => transforms.push(json!({
                "fieldPath": name,
                "setToServerValue": "REQUEST_TIME",
            })),
            FieldValue::Increment(by) => transforms.push(json!({
                "fieldPath": name,
                "increment": encode_value(&Value::Integer(*by)),
            })),
        }
    }

    (values, transforms)
}

pub(crate) fn encode_write(write: &Write, url: &FirestoreURL) -> Json {
    match write {
        Write::Set {
            collection,
            id,
            fields,
        } => {
            let (values, transforms) = split_field_writes(fields);
            let mut body = json!({
                "update": {
                    "name": url.document_name(collection, id),
                    "fields": encode_fields(&values),
                }
            });
            if !transforms.is_empty() {
                body["updateTransforms"] = Json::Array(transforms);
            }
            body
        }
        Write::Update {
            collection,
            id,
            fields,
        } => {
            let (values, transforms) = split_field_writes(fields);
            let mask: Vec<&String> = values.keys().collect();
            let mut body = json!({
                "update": {
                    "name": url.document_name(collection, id),
                    "fields": encode_fields(&values),
                },
                "updateMask": { "fieldPaths": mask },
                "currentDocument": { "exists": true },
            });
            if !transforms.is_empty() {
                body["updateTransforms"] = Json::Array(transforms);
            }
            body
        }
        Write::Delete { collection, id } => json!({
            "delete": url.document_name(collection, id),
        }),
    }
}

fn format_timestamp(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.format(&Rfc3339).unwrap_or_default())
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| StoreError::decode(format!("bad timestamp '{}': {}", s, e)))
}
