//! Generic CRUD over one discovered PostgreSQL table.

use crate::error::{Result, StoreError};
use crate::key::KeyCodec;
use crate::page::{Page, PageRequest, Sort};
use crate::predicate::{Predicate, PredicateCompiler};
use crate::schema::{Field, SchemaCatalog, Table};
use crate::service::validation::EntityValidator;
use crate::sql::{
    bind_all, bind_array, count, delete_by_keys, insert_rows_sql, key_arrays, key_order, keys_per_statement,
    row_to_entity, rows_per_insert, select, select_by_key_arrays, select_by_keys, update_sql, Param, QueryBuf,
    Templates,
};
use crate::value::{Entity, Key};
use sqlx::postgres::{PgConnection, PgQueryResult, PgRow};
use sqlx::{Executor, PgPool, Postgres, Row};
use std::sync::Arc;

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Rows per batch (and per transaction) in `insert_all`, `update_all` and `delete_all`.
    pub batch_size: usize,
}

impl StoreOptions {
    pub fn with_batch_size(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(StoreError::Validation("batch size must be greater than 0".into()));
        }
        Ok(StoreOptions { batch_size })
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// CRUD store for one table. Cheap to clone; clones share the pool and statement templates.
///
/// Every single-row write and every batch runs in its own transaction. Batches of
/// `insert_all`, `update_all` and `delete_all` commit one after another: a failure stops the
/// call but leaves earlier batches committed.
#[derive(Clone)]
pub struct EntityStore {
    pool: PgPool,
    table: Arc<Table>,
    templates: Arc<Templates>,
    key_codec: Arc<KeyCodec>,
    compiler: Arc<dyn PredicateCompiler>,
    batch_size: usize,
}

/// One validated UPDATE: statement text, its parameters, and the key to re-read the row by.
struct PreparedUpdate {
    index: usize,
    sql: Arc<str>,
    params: Vec<Param>,
    key: Vec<Param>,
}

impl EntityStore {
    pub fn new(
        pool: PgPool,
        schema_name: &str,
        table_name: &str,
        fields: Vec<Field>,
        compiler: Arc<dyn PredicateCompiler>,
        options: StoreOptions,
    ) -> Result<Self> {
        let options = StoreOptions::with_batch_size(options.batch_size)?;
        let table = Table::new(schema_name, table_name, fields)?;
        let key_codec = KeyCodec::new(table.fields())?;
        let templates = Templates::new(&table);
        tracing::debug!(select = %templates.select, insert = %templates.insert, "store templates");
        Ok(EntityStore {
            pool,
            table: Arc::new(table),
            templates: Arc::new(templates),
            key_codec: Arc::new(key_codec),
            compiler,
            batch_size: options.batch_size,
        })
    }

    /// Discover `schema_name.table_name` from the catalog and build a store for it.
    pub async fn discover(
        pool: PgPool,
        schema_name: &str,
        table_name: &str,
        compiler: Arc<dyn PredicateCompiler>,
        options: StoreOptions,
    ) -> Result<Self> {
        let fields = SchemaCatalog::new(pool.clone())
            .discover(schema_name, table_name)
            .await?;
        Self::new(pool, schema_name, table_name, fields, compiler, options)
    }

    pub fn fields(&self) -> &[Field] {
        self.table.fields()
    }

    pub fn key_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.table.key_fields()
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.key_codec
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn schema_name(&self) -> &str {
        &self.table.schema_name
    }

    pub fn table_name(&self) -> &str {
        &self.table.table_name
    }

    // ---- reads ----

    pub async fn find(&self, key: &Key) -> Result<Option<Entity>> {
        let params = EntityValidator::key_params(&self.table, key.as_entity())?;
        let q = select_by_keys(&self.templates, &self.table, 1, params);
        let row = fetch_optional(&self.pool, &q).await.map_err(StoreError::find)?;
        row.map(|r| self.to_entity(&r))
            .transpose()
            .map_err(StoreError::find)
    }

    /// Every row; unordered unless `sort` names fields.
    pub async fn find_all(&self, sort: &Sort) -> Result<Vec<Entity>> {
        self.find_filtered(None, sort).await
    }

    pub async fn find_page(&self, page: PageRequest, sort: &Sort) -> Result<Page<Entity>> {
        self.find_filtered_page(None, page, sort).await
    }

    /// Rows matching any of `keys`, in one statement however many keys there are. Keys without
    /// a row contribute nothing; no keys, no query.
    pub async fn find_all_keys(&self, keys: &[Key], sort: &Sort) -> Result<Vec<Entity>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let order = sort.order_by(self.table.fields())?;
        let params = EntityValidator::keys_params(&self.table, keys)?;
        let arrays = key_arrays(self.table.key_fields(), params);
        let mut sql = select_by_key_arrays(&self.templates, &self.table);
        if let Some(order) = order {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        tracing::debug!(sql = %sql, keys = keys.len(), "query");
        let rows = arrays
            .iter()
            .fold(sqlx::query(&sql), bind_array)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::find)?;
        rows.iter()
            .map(|r| self.to_entity(r))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::find)
    }

    pub async fn find_where(&self, query: &str, sort: &Sort) -> Result<Vec<Entity>> {
        let predicate = self.compile(query)?;
        self.find_filtered(Some(&predicate), sort).await
    }

    pub async fn find_where_page(&self, query: &str, page: PageRequest, sort: &Sort) -> Result<Page<Entity>> {
        let predicate = self.compile(query)?;
        self.find_filtered_page(Some(&predicate), page, sort).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.count_filtered(None).await
    }

    pub async fn count_where(&self, query: &str) -> Result<u64> {
        let predicate = self.compile(query)?;
        self.count_filtered(Some(&predicate)).await
    }

    async fn find_filtered(&self, filter: Option<&Predicate>, sort: &Sort) -> Result<Vec<Entity>> {
        let order = sort.order_by(self.table.fields())?;
        let q = select(&self.templates, filter, order.as_deref(), None);
        self.query_entities(&q).await
    }

    /// Page query and COUNT share `filter`. Without a sort, pages follow key order.
    async fn find_filtered_page(
        &self,
        filter: Option<&Predicate>,
        page: PageRequest,
        sort: &Sort,
    ) -> Result<Page<Entity>> {
        let page = PageRequest::new(page.number, page.size)?;
        let order = sort
            .order_by(self.table.fields())?
            .or_else(|| key_order(&self.table));
        let q = select(&self.templates, filter, order.as_deref(), Some(page));
        let items = self.query_entities(&q).await?;
        let total = self.count_filtered(filter).await?;
        Ok(Page::new(items, page, total))
    }

    async fn count_filtered(&self, filter: Option<&Predicate>) -> Result<u64> {
        let q = count(&self.templates, filter);
        let row = fetch_one(&self.pool, &q).await.map_err(StoreError::find)?;
        let n: i64 = row.try_get(0).map_err(StoreError::find)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn query_entities(&self, q: &QueryBuf) -> Result<Vec<Entity>> {
        let rows = fetch_all(&self.pool, q).await.map_err(StoreError::find)?;
        rows.iter()
            .map(|r| self.to_entity(r))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::find)
    }

    // ---- inserts ----

    /// Insert one row. Auto-increment fields take the generated values in the returned entity.
    pub async fn insert(&self, entity: &Entity) -> Result<Entity> {
        let params = EntityValidator::insert_params(&self.table, entity)?;
        let mut tx = self.pool.begin().await.map_err(StoreError::insert)?;
        let inserted = self.insert_one(&mut tx, entity, params).await?;
        tx.commit().await.map_err(StoreError::insert)?;
        Ok(inserted)
    }

    /// Insert in batches of `batch_size`, one transaction and one multi-row INSERT per batch
    /// (split further only to stay within the bind-parameter limit). Output follows input order.
    /// Every entity is validated before the first batch runs.
    pub async fn insert_all(&self, entities: &[Entity]) -> Result<Vec<Entity>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let prepared = entities
            .iter()
            .map(|e| EntityValidator::insert_params(&self.table, e).map(|p| (e, p)))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(entities.len());
        for (batch, chunk) in prepared.chunks(self.batch_size).enumerate() {
            let mut tx = self.pool.begin().await.map_err(StoreError::insert)?;
            match self.insert_batch(&mut tx, chunk).await {
                Ok(inserted) => out.extend(inserted),
                Err(e) => {
                    tracing::warn!(batch, rows = chunk.len(), error = %e, "insert batch failed");
                    return Err(e);
                }
            }
            tx.commit().await.map_err(StoreError::insert)?;
        }
        Ok(out)
    }

    async fn insert_batch(&self, conn: &mut PgConnection, batch: &[(&Entity, Vec<Param>)]) -> Result<Vec<Entity>> {
        let mut out = Vec::with_capacity(batch.len());
        // DEFAULT VALUES has no multi-row form
        if self.table.insertable_fields().next().is_none() {
            for (entity, params) in batch {
                out.push(self.insert_one(&mut *conn, entity, params.clone()).await?);
            }
            return Ok(out);
        }
        for rows in batch.chunks(rows_per_insert(&self.table, self.batch_size)) {
            let q = QueryBuf::new(
                insert_rows_sql(&self.table, rows.len()),
                rows.iter().flat_map(|(_, p)| p.iter().cloned()).collect(),
            );
            let generated = if self.table.has_auto_increment() {
                let returned = fetch_all(&mut *conn, &q).await.map_err(StoreError::insert)?;
                if returned.len() != rows.len() {
                    return Err(StoreError::Insert(format!(
                        "expected {} generated rows, got {}",
                        rows.len(),
                        returned.len()
                    )));
                }
                returned
                    .iter()
                    .map(|r| row_to_entity(r, self.table.auto_increment_fields()))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(StoreError::insert)?
            } else {
                execute(&mut *conn, &q).await.map_err(StoreError::insert)?;
                vec![Entity::new(); rows.len()]
            };
            for ((entity, _), generated) in rows.iter().zip(&generated) {
                out.push(self.merge_generated(entity, generated)?);
            }
        }
        Ok(out)
    }

    async fn insert_one(&self, conn: &mut PgConnection, entity: &Entity, params: Vec<Param>) -> Result<Entity> {
        let q = QueryBuf::new(self.templates.insert.as_str(), params);
        let generated = if self.table.has_auto_increment() {
            let row = fetch_one(&mut *conn, &q).await.map_err(StoreError::insert)?;
            row_to_entity(&row, self.table.auto_increment_fields()).map_err(StoreError::insert)?
        } else {
            execute(&mut *conn, &q).await.map_err(StoreError::insert)?;
            Entity::new()
        };
        self.merge_generated(entity, &generated)
    }

    /// The supplied entity in field order, with auto-increment fields replaced by `generated`.
    fn merge_generated(&self, entity: &Entity, generated: &Entity) -> Result<Entity> {
        let mut out = Entity::new();
        for field in self.table.fields() {
            let source = if field.is_auto_increment() { generated } else { entity };
            if let Some(v) = source.get(&field.name) {
                out.insert(field.name.clone(), EntityValidator::coerce(field, v)?);
            }
        }
        Ok(out)
    }

    // ---- updates ----

    /// Update the fields present in `entity` (absent fields keep their stored value) and return
    /// the row as stored afterwards.
    pub async fn update(&self, entity: &Entity) -> Result<Entity> {
        let prepared = self.prepare_update(0, entity)?;
        let mut tx = self.pool.begin().await.map_err(StoreError::update)?;
        let updated = self.update_one(&mut tx, &prepared).await?;
        tx.commit().await.map_err(StoreError::update)?;
        Ok(updated)
    }

    /// Update many entities. Entities are grouped by their exact set of present mutable fields
    /// (one UPDATE text per group); each group runs in batches of `batch_size`, one transaction
    /// per batch. Validation covers every entity before the first statement. Groups are not
    /// atomic with each other: a failing group leaves earlier groups committed.
    pub async fn update_all(&self, entities: &[Entity]) -> Result<Vec<Entity>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let groups = self.group_updates(entities)?;
        let mut out: Vec<Option<Entity>> = vec![None; entities.len()];
        for (group, members) in groups.iter().enumerate() {
            for (batch, chunk) in members.chunks(self.batch_size).enumerate() {
                let mut tx = self.pool.begin().await.map_err(StoreError::update)?;
                for prepared in chunk {
                    match self.update_one(&mut tx, prepared).await {
                        Ok(updated) => out[prepared.index] = Some(updated),
                        Err(e) => {
                            tracing::warn!(group, batch, rows = chunk.len(), error = %e, "update batch failed");
                            return Err(e);
                        }
                    }
                }
                tx.commit().await.map_err(StoreError::update)?;
            }
        }
        out.into_iter()
            .map(|e| e.ok_or_else(|| StoreError::Update("entity was not updated".into())))
            .collect()
    }

    /// Validated updates grouped by UPDATE text, groups in order of first appearance.
    fn group_updates(&self, entities: &[Entity]) -> Result<Vec<Vec<PreparedUpdate>>> {
        let mut groups: Vec<Vec<PreparedUpdate>> = Vec::new();
        for (index, entity) in entities.iter().enumerate() {
            let prepared = self.prepare_update(index, entity)?;
            match groups.iter_mut().find(|g| g[0].sql == prepared.sql) {
                Some(group) => group.push(prepared),
                None => groups.push(vec![prepared]),
            }
        }
        Ok(groups)
    }

    fn prepare_update(&self, index: usize, entity: &Entity) -> Result<PreparedUpdate> {
        let shape = EntityValidator::update_shape(&self.table, entity)?;
        let params = EntityValidator::update_params(&self.table, &shape, entity)?;
        let key = EntityValidator::key_params(&self.table, entity)?;
        Ok(PreparedUpdate {
            index,
            sql: update_sql(&self.table, &shape).into(),
            params,
            key,
        })
    }

    async fn update_one(&self, conn: &mut PgConnection, prepared: &PreparedUpdate) -> Result<Entity> {
        let q = QueryBuf::new(&*prepared.sql, prepared.params.clone());
        execute(&mut *conn, &q).await.map_err(StoreError::update)?;
        let refetch = select_by_keys(&self.templates, &self.table, 1, prepared.key.clone());
        let row = fetch_optional(&mut *conn, &refetch)
            .await
            .map_err(StoreError::update)?
            .ok_or_else(|| StoreError::Update("no row found for key after update".into()))?;
        self.to_entity(&row).map_err(StoreError::update)
    }

    // ---- deletes ----

    pub async fn delete(&self, key: &Key) -> Result<()> {
        self.delete_all(std::slice::from_ref(key)).await
    }

    /// Delete the rows of `keys` in batches of `batch_size`, one statement and transaction per
    /// batch. Keys without a row are ignored; no keys, no query.
    pub async fn delete_all(&self, keys: &[Key]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let prepared = keys
            .iter()
            .map(|k| EntityValidator::key_params(&self.table, k.as_entity()))
            .collect::<Result<Vec<_>>>()?;
        for (batch, chunk) in prepared
            .chunks(keys_per_statement(&self.table, self.batch_size))
            .enumerate()
        {
            let q = delete_by_keys(
                &self.templates,
                &self.table,
                chunk.len(),
                chunk.iter().flatten().cloned().collect(),
            );
            let mut tx = self.pool.begin().await.map_err(StoreError::delete)?;
            if let Err(e) = execute(&mut *tx, &q).await {
                tracing::warn!(batch, rows = chunk.len(), error = %e, "delete batch failed");
                return Err(StoreError::delete(e));
            }
            tx.commit().await.map_err(StoreError::delete)?;
        }
        Ok(())
    }

    fn compile(&self, query: &str) -> Result<Predicate> {
        self.compiler
            .compile(query)
            .map_err(|e| StoreError::QueryParse(e.to_string()))
    }

    fn to_entity(&self, row: &PgRow) -> std::result::Result<Entity, sqlx::Error> {
        row_to_entity(row, self.table.fields())
    }
}

async fn fetch_all<'c, E>(executor: E, q: &QueryBuf) -> std::result::Result<Vec<PgRow>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    bind_all(sqlx::query(&q.sql), &q.params).fetch_all(executor).await
}

async fn fetch_optional<'c, E>(executor: E, q: &QueryBuf) -> std::result::Result<Option<PgRow>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    bind_all(sqlx::query(&q.sql), &q.params).fetch_optional(executor).await
}

async fn fetch_one<'c, E>(executor: E, q: &QueryBuf) -> std::result::Result<PgRow, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    bind_all(sqlx::query(&q.sql), &q.params).fetch_one(executor).await
}

async fn execute<'c, E>(executor: E, q: &QueryBuf) -> std::result::Result<PgQueryResult, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    bind_all(sqlx::query(&q.sql), &q.params).execute(executor).await
}
