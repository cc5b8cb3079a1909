//! Shared setup for the PostgreSQL integration tests.
//!
//! Tests run only when `DATABASE_URL` is set; each one gets its own schema.

use relational_store::{BoxError, EntityStore, Predicate, PredicateCompiler, StoreOptions, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_SCHEMA: AtomicUsize = AtomicUsize::new(0);

pub struct TestDb {
    pub pool: PgPool,
    pub schema: String,
}

impl TestDb {
    /// `None` when `DATABASE_URL` is not set.
    pub async fn create() -> Option<TestDb> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&url)
            .await
            .expect("connect to DATABASE_URL");
        let schema = format!(
            "relational_store_test_{}_{}",
            std::process::id(),
            NEXT_SCHEMA.fetch_add(1, Ordering::SeqCst)
        );
        sqlx::query(&format!(r#"DROP SCHEMA IF EXISTS "{}" CASCADE"#, schema))
            .execute(&pool)
            .await
            .expect("drop schema");
        sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
            .execute(&pool)
            .await
            .expect("create schema");
        Some(TestDb { pool, schema })
    }

    /// Run DDL with `{schema}` replaced by the quoted test schema.
    pub async fn exec(&self, ddl: &str) {
        let sql = ddl.replace("{schema}", &format!(r#""{}""#, self.schema));
        sqlx::query(&sql).execute(&self.pool).await.expect("ddl");
    }

    pub async fn store(&self, table: &str, batch_size: usize) -> EntityStore {
        EntityStore::discover(
            self.pool.clone(),
            &self.schema,
            table,
            Arc::new(TestFilter),
            StoreOptions::with_batch_size(batch_size).expect("batch size"),
        )
        .await
        .expect("discover")
    }

    /// The `test` table: integer key, required and optional text, checked optional amount.
    pub async fn test_table(&self, batch_size: usize) -> EntityStore {
        self.exec(
            r#"CREATE TABLE {schema}."test" (
                id integer PRIMARY KEY,
                value_1 varchar(64) NOT NULL,
                value_2 varchar(64),
                amount bigint CHECK (amount IS NULL OR amount >= 0)
            )"#,
        )
        .await;
        self.store("test", batch_size).await
    }

    pub async fn teardown(self) {
        let _ = sqlx::query(&format!(r#"DROP SCHEMA IF EXISTS "{}" CASCADE"#, self.schema))
            .execute(&self.pool)
            .await;
    }
}

/// Accepts `<field> = <text>` over the `test` table's text fields.
pub struct TestFilter;

impl PredicateCompiler for TestFilter {
    fn compile(&self, query: &str) -> Result<Predicate, BoxError> {
        let (name, value) = query
            .split_once('=')
            .ok_or_else(|| format!("expected <field> = <value>: {}", query))?;
        let column = match name.trim() {
            "value1" => "value_1",
            "value2" => "value_2",
            other => return Err(format!("unknown field {}", other).into()),
        };
        Ok(Predicate::new(
            format!(r#""{}" = $1"#, column),
            vec![Value::Text(value.trim().to_string())],
        ))
    }
}
