use serde_json::json;

use super::*;

fn records(values: &[Value]) -> Vec<Map<String, Value>> {
    values
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn column_types(batch: &RecordBatch) -> Vec<(&str, ColumnType)> {
    batch
        .columns()
        .iter()
        .map(|c| (c.name.as_str(), c.column_type))
        .collect()
}

#[test]
fn schema_is_union_of_keys_in_first_seen_order() {
    let rows = records(&[
        json!({"message_id": 1, "channel_name": "demo"}),
        json!({"message_id": 2, "views": 10}),
    ]);
    let batch = RecordBatch::from_records(&rows, &[]);

    assert_eq!(
        column_types(&batch),
        [
            ("channel_name", ColumnType::Text),
            ("message_id", ColumnType::BigInt),
            ("views", ColumnType::BigInt),
        ]
    );
    assert_eq!(batch.rows()[0][2], Cell::BigInt(None));
    assert_eq!(batch.rows()[1][0], Cell::Text(None));
}

#[test]
fn infers_types_per_column() {
    let rows = records(&[json!({
        "id": 7,
        "score": 0.5,
        "flag": true,
        "at": "2024-01-01T09:00:00Z",
        "text": "привет",
        "tags": ["a", "b"],
        "missing": null
    })]);
    let batch = RecordBatch::from_records(&rows, &["at", "text"]);

    assert_eq!(
        column_types(&batch),
        [
            ("at", ColumnType::Timestamptz),
            ("flag", ColumnType::Boolean),
            ("id", ColumnType::BigInt),
            ("missing", ColumnType::Text),
            ("score", ColumnType::Double),
            ("tags", ColumnType::Text),
            ("text", ColumnType::Text),
        ]
    );

    let row = &batch.rows()[0];
    assert_eq!(row[3], Cell::Text(None));
    assert_eq!(row[5], Cell::Text(Some(r#"["a","b"]"#.to_owned())));
    assert_eq!(row[6], Cell::Text(Some("привет".to_owned())));
}

#[test]
fn mixed_numeric_widens_to_double_and_other_mixes_to_text() {
    let rows = records(&[
        json!({"n": 1, "mixed": 1, "ts": "2024-01-01T00:00:00Z"}),
        json!({"n": 2.5, "mixed": "one", "ts": "not a timestamp"}),
    ]);
    let batch = RecordBatch::from_records(&rows, &["ts"]);

    assert_eq!(
        column_types(&batch),
        [
            ("mixed", ColumnType::Text),
            ("n", ColumnType::Double),
            ("ts", ColumnType::Text),
        ]
    );
    assert_eq!(batch.rows()[0][0], Cell::Text(Some("1".to_owned())));
    assert_eq!(batch.rows()[0][1], Cell::Double(Some(1.0)));
}

#[test]
fn null_then_value_takes_value_type() {
    let rows = records(&[
        json!({"image_path": null}),
        json!({"image_path": "images/demo/1.jpg"}),
    ]);
    let batch = RecordBatch::from_records(&rows, &[]);

    assert_eq!(column_types(&batch), [("image_path", ColumnType::Text)]);
    assert_eq!(batch.len(), 2);
}

#[test]
fn unusable_keys_are_dropped() {
    let long_key = "k".repeat(64);
    let mut record = Map::new();
    record.insert(String::new(), json!(1));
    record.insert(long_key, json!(2));
    record.insert("ok".to_owned(), json!(3));

    let batch = RecordBatch::from_records(&[record], &[]);

    assert_eq!(column_types(&batch), [("ok", ColumnType::BigInt)]);
}

#[test]
fn from_rows_pads_short_rows_with_nulls() {
    let columns = vec![
        Column {
            name: "a".to_owned(),
            column_type: ColumnType::BigInt,
        },
        Column {
            name: "b".to_owned(),
            column_type: ColumnType::Text,
        },
    ];
    let batch = RecordBatch::from_rows(columns, vec![vec![Cell::BigInt(Some(1))]]);

    assert_eq!(
        batch.rows()[0],
        [Cell::BigInt(Some(1)), Cell::Text(None)]
    );
}

#[test]
fn empty_input_gives_empty_batch() {
    let batch = RecordBatch::from_records(&[], &[]);
    assert!(batch.is_empty());
    assert!(batch.columns().is_empty());
}

#[test]
fn timestamp_strings_stay_text_outside_timestamp_columns() {
    let rows = records(&[json!({
        "message_id": 1,
        "message_text": "2024-01-01T00:00:00Z",
        "message_date": "2024-01-01T00:00:00Z"
    })]);

    let batch = RecordBatch::from_records(&rows, &["message_date"]);

    assert_eq!(
        column_types(&batch),
        [
            ("message_date", ColumnType::Timestamptz),
            ("message_id", ColumnType::BigInt),
            ("message_text", ColumnType::Text),
        ]
    );
    assert_eq!(
        batch.rows()[0][2],
        Cell::Text(Some("2024-01-01T00:00:00Z".to_owned()))
    );
}
