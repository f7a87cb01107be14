//! The two `raw` landing tables.

use medlake_core::ImageDetection;
use medlake_lake::PartitionScan;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::batch::{Cell, Column, ColumnType, RecordBatch};
use crate::replace::replace_table;
use crate::DbError;

pub const RAW_SCHEMA: &str = "raw";
pub const MESSAGES_TABLE: &str = "telegram_messages";
pub const DETECTIONS_TABLE: &str = "image_detections";

/// Message fields stored as `TIMESTAMPTZ`; every other string field is `TEXT`.
pub const MESSAGE_TIMESTAMP_COLUMNS: [&str; 2] = ["message_date", "scraped_at"];

/// Replace `raw.telegram_messages` with every record in `scan`.
///
/// # Errors
///
/// Returns [`DbError::NothingToLoad`] when the scan holds zero records, and
/// any error from [`replace_table`].
pub async fn load_messages(pool: &PgPool, scan: &PartitionScan) -> Result<u64, DbError> {
    if scan.records.is_empty() {
        return Err(DbError::NothingToLoad {
            table: format!("{RAW_SCHEMA}.{MESSAGES_TABLE}"),
        });
    }

    let batch = messages_batch(&scan.records);
    tracing::info!(
        records = batch.len(),
        columns = batch.columns().len(),
        files_read = scan.files_read,
        files_skipped = scan.files_skipped,
        "loading message partitions"
    );
    replace_table(pool, RAW_SCHEMA, MESSAGES_TABLE, &batch).await
}

pub(crate) fn messages_batch(records: &[Map<String, Value>]) -> RecordBatch {
    RecordBatch::from_records(records, &MESSAGE_TIMESTAMP_COLUMNS)
}

fn detection_columns() -> Vec<Column> {
    [
        ("message_id", ColumnType::BigInt),
        ("channel_name", ColumnType::Text),
        ("image_path", ColumnType::Text),
        ("detected_objects", ColumnType::Text),
        ("avg_confidence", ColumnType::Double),
        ("image_category", ColumnType::Text),
    ]
    .into_iter()
    .map(|(name, column_type)| Column {
        name: name.to_owned(),
        column_type,
    })
    .collect()
}

pub(crate) fn detections_batch(detections: &[ImageDetection]) -> RecordBatch {
    let rows = detections
        .iter()
        .map(|d| {
            vec![
                Cell::BigInt(Some(d.message_id)),
                Cell::Text(Some(d.channel_name.clone())),
                Cell::Text(Some(d.image_path.clone())),
                Cell::Text(Some(d.detected_objects_csv())),
                Cell::Double(Some(d.avg_confidence)),
                Cell::Text(Some(d.image_category.as_str().to_owned())),
            ]
        })
        .collect();
    RecordBatch::from_rows(detection_columns(), rows)
}

/// Replace `raw.image_detections` with `detections`.
///
/// `detected_objects` is stored as a sorted, comma-delimited string.
///
/// # Errors
///
/// Returns [`DbError::NothingToLoad`] for an empty slice, and any error from
/// [`replace_table`].
pub async fn replace_detections(
    pool: &PgPool,
    detections: &[ImageDetection],
) -> Result<u64, DbError> {
    if detections.is_empty() {
        return Err(DbError::NothingToLoad {
            table: format!("{RAW_SCHEMA}.{DETECTIONS_TABLE}"),
        });
    }
    replace_table(pool, RAW_SCHEMA, DETECTIONS_TABLE, &detections_batch(detections)).await
}
