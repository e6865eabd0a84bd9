//! Purpose: Shared row and table-info JSON conversion for CLI and HTTP paths.
//! Exports: `row_json`, `rows_json`, `table_info_json`, `row_from_object`,
//! `pairs_from_object`.
//! Role: Keep payload shapes consistent across entry points.
//! Invariants: Row objects emit fields in row order; stable key names for v0.
//! Invariants: Incoming values must be scalar; nested JSON is a usage error.

use crate::core::error::{Error, ErrorKind};
use crate::core::store::TableInfo;
use crate::core::table::Row;
use serde_json::{Map, Value, json};

pub fn row_json(row: &Row) -> Value {
    let mut map = Map::new();
    for (field, value) in row.iter() {
        map.insert(field.to_string(), json!(value));
    }
    Value::Object(map)
}

pub fn rows_json(rows: &[Row]) -> Value {
    Value::Array(rows.iter().map(row_json).collect())
}

pub fn table_info_json(table_ref: &str, info: &TableInfo) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(table_ref));
    map.insert("path".to_string(), json!(info.path.display().to_string()));
    map.insert("columns".to_string(), json!(info.columns));
    map.insert("row_count".to_string(), json!(info.row_count));
    Value::Object(map)
}

/// Decode a JSON object into a row. Scalar values are stringified; nested
/// values have no cell representation and are rejected.
pub fn row_from_object(object: &Map<String, Value>) -> Result<Row, Error> {
    let mut row = Row::new();
    for (field, value) in object {
        row.set(field.clone(), text_from_json(field, value)?);
    }
    Ok(row)
}

pub fn pairs_from_object(object: &Map<String, Value>) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    for (field, value) in object {
        pairs.push((field.clone(), text_from_json(field, value)?));
    }
    Ok(pairs)
}

fn text_from_json(field: &str, value: &Value) -> Result<String, Error> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message("field values must be strings, numbers, or booleans")
            .with_field(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::{row_from_object, row_json, table_info_json};
    use crate::core::error::ErrorKind;
    use crate::core::store::TableInfo;
    use crate::core::table::Row;
    use std::path::PathBuf;

    #[test]
    fn row_json_carries_every_field() {
        let row = Row::from_pairs([("name", "otto"), ("street", "Landstr")]);
        let value = row_json(&row);
        assert_eq!(value["name"], "otto");
        assert_eq!(value["street"], "Landstr");
    }

    #[test]
    fn table_info_json_has_stable_keys() {
        let info = TableInfo {
            path: PathBuf::from("/tables/people.csv"),
            columns: vec!["name".to_string(), "street".to_string()],
            row_count: 2,
        };
        let value = table_info_json("people", &info);
        assert_eq!(value["name"], "people");
        assert_eq!(value["path"], "/tables/people.csv");
        assert_eq!(value["columns"][1], "street");
        assert_eq!(value["row_count"], 2);
    }

    #[test]
    fn scalar_values_are_stringified_on_decode() {
        let object = serde_json::from_str("{\"name\":\"otto\",\"age\":42,\"active\":true}")
            .expect("object");
        let row = row_from_object(&object).expect("row");
        assert_eq!(row.get("name"), Some("otto"));
        assert_eq!(row.get("age"), Some("42"));
        assert_eq!(row.get("active"), Some("true"));
    }

    #[test]
    fn nested_values_are_rejected() {
        let object = serde_json::from_str("{\"name\":[1,2]}").expect("object");
        let err = row_from_object(&object).expect_err("nested");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.field(), Some("name"));
    }
}
