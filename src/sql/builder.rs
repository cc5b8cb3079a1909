//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE text for a discovered table.
//!
//! Identifiers come from the catalog and are always quoted; values are always parameters.
//! Placeholders are `$1..$n`. LIMIT/OFFSET are integers computed here and inlined.

use crate::page::PageRequest;
use crate::predicate::Predicate;
use crate::schema::{Field, SqlType, Table};
use crate::sql::params::Param;

/// Most bind parameters PostgreSQL accepts in one statement.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Param>,
}

impl QueryBuf {
    pub fn new(sql: impl Into<String>, params: Vec<Param>) -> Self {
        QueryBuf {
            sql: sql.into(),
            params,
        }
    }
}

/// Select expression for one column. Columns sqlx cannot decode into the field's Rust type
/// are cast in SQL and aliased back to the column name.
fn select_expr(field: &Field) -> String {
    let q = quoted(&field.column.name);
    match field.column.sql_type {
        SqlType::TinyInt | SqlType::SmallInt => format!("{}::integer AS {}", q, q),
        SqlType::Bit => format!("{}::integer::boolean AS {}", q, q),
        _ => q,
    }
}

/// Placeholder `$n` for a parameter bound to `field`'s column, with the cast the bound Rust type needs.
fn placeholder(field: &Field, n: usize) -> String {
    match field.column.sql_type {
        SqlType::TinyInt | SqlType::SmallInt => format!("${}::smallint", n),
        SqlType::Bit => format!("${}::integer::bit", n),
        _ => format!("${}", n),
    }
}

/// Array placeholder `$n` whose elements compare with `field`'s column.
fn array_placeholder(field: &Field, n: usize) -> String {
    match field.column.sql_type {
        SqlType::TinyInt | SqlType::SmallInt => format!("${}::smallint[]", n),
        SqlType::Bit => format!("${}::integer[]::bit[]", n),
        _ => format!("${}", n),
    }
}

fn select_list<'a>(fields: impl Iterator<Item = &'a Field>) -> String {
    fields.map(select_expr).collect::<Vec<_>>().join(", ")
}

/// Statement text fixed for the lifetime of a store.
#[derive(Clone, Debug)]
pub struct Templates {
    pub select: String,
    pub count: String,
    pub insert: String,
    pub delete: String,
}

impl Templates {
    pub fn new(table: &Table) -> Self {
        let from = qualified_table(&table.schema_name, &table.table_name);
        Templates {
            select: format!("SELECT {} FROM {}", select_list(table.fields().iter()), from),
            count: format!("SELECT COUNT(*) FROM {}", from),
            insert: insert_sql(table, &from, 1),
            delete: format!("DELETE FROM {}", from),
        }
    }
}

/// INSERT of `rows` rows over every non-auto-increment column in declaration order; row `r`
/// binds `$(r*width+1)..`. Auto-increment columns come back through RETURNING, one row per
/// inserted row in VALUES order.
fn insert_sql(table: &Table, from: &str, rows: usize) -> String {
    let fields: Vec<&Field> = table.insertable_fields().collect();
    let width = fields.len();
    let mut sql = if fields.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", from)
    } else {
        let cols: Vec<String> = fields.iter().map(|f| quoted(&f.column.name)).collect();
        let values: Vec<String> = (0..rows)
            .map(|r| {
                let placeholders: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| placeholder(f, r * width + i + 1))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            from,
            cols.join(", "),
            values.join(", ")
        )
    };
    if table.has_auto_increment() {
        sql.push_str(" RETURNING ");
        sql.push_str(&select_list(table.auto_increment_fields()));
    }
    sql
}

/// Multi-row INSERT for `rows` rows. Only meaningful when the table has insertable columns.
pub fn insert_rows_sql(table: &Table, rows: usize) -> String {
    insert_sql(table, &qualified_table(&table.schema_name, &table.table_name), rows)
}

/// Rows per multi-row INSERT so one statement stays within [`MAX_BIND_PARAMS`].
pub fn rows_per_insert(table: &Table, batch_size: usize) -> usize {
    let width = table.insertable_fields().count().max(1);
    batch_size.min(MAX_BIND_PARAMS / width).max(1)
}

/// Keys per OR-keyed statement so one statement stays within [`MAX_BIND_PARAMS`].
pub fn keys_per_statement(table: &Table, batch_size: usize) -> usize {
    let width = table.key_fields().count().max(1);
    batch_size.min(MAX_BIND_PARAMS / width).max(1)
}

/// `"k1" = $s AND "k2" = $s+1 ...` over the key fields in declaration order.
fn key_condition(table: &Table, start: usize) -> String {
    table
        .key_fields()
        .enumerate()
        .map(|(i, f)| format!("{} = {}", quoted(&f.column.name), placeholder(f, start + i)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// One parenthesized key condition per key, OR-joined. `key_count` must be > 0.
pub fn keys_condition(table: &Table, key_count: usize) -> String {
    let width = table.key_fields().count();
    if key_count == 1 {
        return key_condition(table, 1);
    }
    (0..key_count)
        .map(|k| format!("({})", key_condition(table, 1 + k * width)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// SELECT by key values (already ordered by key field). Several keys become OR-ed groups.
pub fn select_by_keys(templates: &Templates, table: &Table, key_count: usize, params: Vec<Param>) -> QueryBuf {
    QueryBuf::new(
        format!("{} WHERE {}", templates.select, keys_condition(table, key_count)),
        params,
    )
}

/// Key match against one array parameter per key field, in key-field order. The number of
/// keys does not change the statement or its parameter count.
pub fn keys_in_arrays(table: &Table) -> String {
    let fields: Vec<&Field> = table.key_fields().collect();
    match fields.as_slice() {
        [field] => format!("{} = ANY({})", quoted(&field.column.name), array_placeholder(field, 1)),
        fields => {
            let cols: Vec<String> = fields.iter().map(|f| quoted(&f.column.name)).collect();
            let arrays: Vec<String> = fields
                .iter()
                .enumerate()
                .map(|(i, f)| array_placeholder(f, i + 1))
                .collect();
            format!(
                "({}) IN (SELECT * FROM UNNEST({}))",
                cols.join(", "),
                arrays.join(", ")
            )
        }
    }
}

/// SELECT of every row whose key is among the bound key arrays.
pub fn select_by_key_arrays(templates: &Templates, table: &Table) -> String {
    format!("{} WHERE {}", templates.select, keys_in_arrays(table))
}

pub fn delete_by_keys(templates: &Templates, table: &Table, key_count: usize, params: Vec<Param>) -> QueryBuf {
    QueryBuf::new(
        format!("{} WHERE {}", templates.delete, keys_condition(table, key_count)),
        params,
    )
}

/// SELECT with optional filter, ORDER BY body and page window.
pub fn select(
    templates: &Templates,
    filter: Option<&Predicate>,
    order_by: Option<&str>,
    page: Option<PageRequest>,
) -> QueryBuf {
    let mut sql = templates.select.clone();
    let mut params = Vec::new();
    if let Some(p) = filter {
        sql.push_str(" WHERE ");
        sql.push_str(&p.sql);
        params.extend(p.params.iter().cloned().map(Param::from));
    }
    if let Some(order) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
    }
    if let Some(page) = page {
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit(), page.offset()));
    }
    QueryBuf::new(sql, params)
}

/// COUNT(*) with the same filter a page query uses.
pub fn count(templates: &Templates, filter: Option<&Predicate>) -> QueryBuf {
    match filter {
        Some(p) => QueryBuf::new(
            format!("{} WHERE {}", templates.count, p.sql),
            p.params.iter().cloned().map(Param::from).collect(),
        ),
        None => QueryBuf::new(templates.count.clone(), Vec::new()),
    }
}

/// Default page order when the caller gives no sort: the key columns, so pages do not overlap.
pub fn key_order(table: &Table) -> Option<String> {
    if !table.has_key() {
        return None;
    }
    Some(
        table
            .key_fields()
            .map(|f| format!("{} ASC", quoted(&f.column.name)))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// UPDATE setting exactly `set_fields` (in the order given), keyed on the key fields.
/// Parameters: the set values first, then the key values.
pub fn update_sql(table: &Table, set_fields: &[&Field]) -> String {
    let sets: Vec<String> = set_fields
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{} = {}", quoted(&f.column.name), placeholder(f, i + 1)))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {}",
        qualified_table(&table.schema_name, &table.table_name),
        sets.join(", "),
        key_condition(table, set_fields.len() + 1)
    )
}
