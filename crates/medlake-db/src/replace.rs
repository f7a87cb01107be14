//! Transactional full-table replace.

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::batch::{Cell, Column, RecordBatch};
use crate::DbError;

/// Postgres caps a single statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Quote a schema, table, or column name for interpolation into SQL.
///
/// # Errors
///
/// Returns [`DbError::InvalidIdentifier`] for an empty name, a name longer
/// than 63 bytes, or one containing a NUL byte.
pub fn quote_ident(name: &str) -> Result<String, DbError> {
    let reason = if name.is_empty() {
        Some("empty")
    } else if name.len() > 63 {
        Some("longer than 63 bytes")
    } else if name.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    };
    if let Some(reason) = reason {
        return Err(DbError::InvalidIdentifier {
            name: name.to_owned(),
            reason,
        });
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn qualified_name(schema: &str, table: &str) -> Result<String, DbError> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// `CREATE TABLE` statement for `columns` under `schema.table`.
///
/// # Errors
///
/// Returns [`DbError::InvalidIdentifier`] if any name cannot be quoted.
pub fn create_table_sql(schema: &str, table: &str, columns: &[Column]) -> Result<String, DbError> {
    let definitions = columns
        .iter()
        .map(|c| Ok(format!("{} {}", quote_ident(&c.name)?, c.column_type.sql())))
        .collect::<Result<Vec<String>, DbError>>()?;
    Ok(format!(
        "CREATE TABLE {} ({})",
        qualified_name(schema, table)?,
        definitions.join(", ")
    ))
}

/// Rows per `INSERT` so that `rows * columns` stays within the bind limit.
pub(crate) fn rows_per_insert(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Replace `schema.table` with exactly the rows of `batch`.
///
/// Runs in one transaction: an advisory lock keyed on the qualified table
/// name serializes concurrent replaces of the same table; the schema is
/// created if absent; the old table is dropped with `CASCADE` (dependent
/// views are rebuilt downstream); the new table is created and filled. Readers
/// see either the previous table or the complete new one.
///
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError::EmptyBatch`] for a batch without columns,
/// [`DbError::InvalidIdentifier`] for unquotable names, and [`DbError::Sqlx`]
/// if any statement fails (the transaction is rolled back).
pub async fn replace_table(
    pool: &PgPool,
    schema: &str,
    table: &str,
    batch: &RecordBatch,
) -> Result<u64, DbError> {
    let qualified = qualified_name(schema, table)?;
    if batch.columns().is_empty() {
        return Err(DbError::EmptyBatch {
            table: format!("{schema}.{table}"),
        });
    }
    let create_table = create_table_sql(schema, table, batch.columns())?;
    let column_list = batch
        .columns()
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Result<Vec<String>, DbError>>()?
        .join(", ");

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{schema}.{table}"))
        .execute(&mut *tx)
        .await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)?))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {qualified} CASCADE"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create_table).execute(&mut *tx).await?;

    let mut inserted: u64 = 0;
    for chunk in batch.rows().chunks(rows_per_insert(batch.columns().len())) {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO {qualified} ({column_list}) "));
        builder.push_values(chunk, |mut values, row| {
            for cell in row {
                match cell {
                    Cell::BigInt(v) => values.push_bind(*v),
                    Cell::Double(v) => values.push_bind(*v),
                    Cell::Boolean(v) => values.push_bind(*v),
                    Cell::Timestamptz(v) => values.push_bind(*v),
                    Cell::Text(v) => values.push_bind(v.clone()),
                };
            }
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;

    tracing::info!(table = %qualified, rows = inserted, "table replaced");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ColumnType;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("plain").unwrap(), "\"plain\"");
        assert_eq!(quote_ident("we\"ird").unwrap(), "\"we\"\"ird\"");
    }

    #[test]
    fn quote_ident_rejects_unusable_names() {
        assert!(matches!(
            quote_ident(""),
            Err(DbError::InvalidIdentifier { reason: "empty", .. })
        ));
        assert!(quote_ident(&"x".repeat(64)).is_err());
        assert!(quote_ident("a\0b").is_err());
    }

    #[test]
    fn create_table_sql_lists_typed_columns() {
        let columns = [
            Column {
                name: "message_id".to_owned(),
                column_type: ColumnType::BigInt,
            },
            Column {
                name: "message_date".to_owned(),
                column_type: ColumnType::Timestamptz,
            },
        ];

        let sql = create_table_sql("raw", "telegram_messages", &columns).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE \"raw\".\"telegram_messages\" \
             (\"message_id\" BIGINT, \"message_date\" TIMESTAMPTZ)"
        );
    }

    #[test]
    fn insert_chunks_stay_within_bind_limit() {
        assert_eq!(rows_per_insert(10), 6_553);
        assert_eq!(rows_per_insert(0), MAX_BIND_PARAMS);
        assert_eq!(rows_per_insert(100_000), 1);
        assert!(rows_per_insert(11) * 11 <= MAX_BIND_PARAMS);
    }
}
