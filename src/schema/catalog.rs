//! Discover a table's fields from `information_schema`.

use crate::error::StoreError;
use crate::schema::types::{Column, Field, SqlType};
use sqlx::PgPool;
use std::collections::HashSet;

/// Catalog columns are cast to text: information_schema uses domain types sqlx will not decode as String.
const COLUMNS_SQL: &str = r#"
    SELECT column_name::text, data_type::text, is_nullable::text, column_default::text, is_identity::text
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

const KEY_COLUMNS_SQL: &str = r#"
    SELECT kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
     AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 AND tc.table_name = $2
    ORDER BY kcu.ordinal_position
"#;

type ColumnRow = (String, String, String, Option<String>, Option<String>);

#[derive(Clone)]
pub struct SchemaCatalog {
    pool: PgPool,
}

impl SchemaCatalog {
    pub fn new(pool: PgPool) -> Self {
        SchemaCatalog { pool }
    }

    /// Ordered fields of `schema.table`. An absent table (or one without columns) is an error,
    /// never an empty field list.
    pub async fn discover(&self, schema: &str, table: &str) -> Result<Vec<Field>, StoreError> {
        tracing::debug!(sql = %KEY_COLUMNS_SQL, schema = %schema, table = %table, "query");
        let keys: HashSet<String> = sqlx::query_scalar::<_, String>(KEY_COLUMNS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::find)?
            .into_iter()
            .collect();

        tracing::debug!(sql = %COLUMNS_SQL, schema = %schema, table = %table, "query");
        let rows = sqlx::query_as::<_, ColumnRow>(COLUMNS_SQL)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::find)?;

        let fields = fields_from_rows(rows, &keys)?;
        if fields.is_empty() {
            return Err(StoreError::Schema(format!(
                "no columns found for table {}.{}",
                schema, table
            )));
        }
        tracing::info!(
            schema = %schema,
            table = %table,
            fields = fields.len(),
            keys = keys.len(),
            "discovered table"
        );
        Ok(fields)
    }
}

fn fields_from_rows(rows: Vec<ColumnRow>, keys: &HashSet<String>) -> Result<Vec<Field>, StoreError> {
    rows.into_iter()
        .map(|(name, data_type, is_nullable, default, is_identity)| {
            let auto_increment = is_identity.as_deref() == Some("YES")
                || default
                    .as_deref()
                    .map(|d| d.starts_with("nextval("))
                    .unwrap_or(false);
            Field::from_column(Column {
                is_key: keys.contains(&name),
                sql_type: SqlType::from_pg(&data_type),
                nullable: is_nullable == "YES",
                auto_increment,
                name,
            })
        })
        .collect()
}
