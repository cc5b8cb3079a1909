//! Bind typed values to sqlx queries and decode rows into entities.

use crate::schema::{Field, SemanticType};
use crate::value::{Entity, Value};
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::postgres::{PgArguments, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::Row;

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// A bound value plus the semantic type its NULL is sent as.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub value: Value,
    pub semantic_type: SemanticType,
}

impl Param {
    pub fn typed(field: &Field, value: Value) -> Self {
        Param {
            value,
            semantic_type: field.semantic_type,
        }
    }
}

/// Untyped NULLs (e.g. from a compiled filter) go out as text.
impl From<Value> for Param {
    fn from(value: Value) -> Self {
        let semantic_type = value.semantic_type().unwrap_or(SemanticType::Text);
        Param { value, semantic_type }
    }
}

pub fn bind_param<'q>(query: PgQuery<'q>, param: &Param) -> PgQuery<'q> {
    match &param.value {
        Value::Null => match param.semantic_type {
            SemanticType::Boolean => query.bind(None::<bool>),
            SemanticType::Integer => query.bind(None::<i32>),
            SemanticType::Long => query.bind(None::<i64>),
            SemanticType::Float => query.bind(None::<f32>),
            SemanticType::Double => query.bind(None::<f64>),
            SemanticType::Decimal => query.bind(None::<BigDecimal>),
            SemanticType::Text => query.bind(None::<String>),
            SemanticType::Date => query.bind(None::<NaiveDate>),
            SemanticType::Time => query.bind(None::<NaiveTime>),
            SemanticType::Timestamp => query.bind(None::<NaiveDateTime>),
        },
        Value::Boolean(b) => query.bind(*b),
        Value::Integer(n) => query.bind(*n),
        Value::Long(n) => query.bind(*n),
        Value::Float(n) => query.bind(*n),
        Value::Double(n) => query.bind(*n),
        Value::Decimal(d) => query.bind(d.clone()),
        Value::Text(s) => query.bind(s.clone()),
        Value::Date(d) => query.bind(*d),
        Value::Time(t) => query.bind(*t),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

pub fn bind_all<'q>(query: PgQuery<'q>, params: &[Param]) -> PgQuery<'q> {
    params.iter().fold(query, bind_param)
}

/// The values of one key field across many keys, bound as a single PostgreSQL array.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayParam {
    pub values: Vec<Value>,
    pub semantic_type: SemanticType,
}

/// Split concatenated key parameters (key-field order, key after key) into one array per key field.
pub fn key_arrays<'a>(key_fields: impl IntoIterator<Item = &'a Field>, params: Vec<Param>) -> Vec<ArrayParam> {
    let mut arrays: Vec<ArrayParam> = key_fields
        .into_iter()
        .map(|f| ArrayParam {
            values: Vec::new(),
            semantic_type: f.semantic_type,
        })
        .collect();
    let width = arrays.len();
    if width == 0 {
        return arrays;
    }
    for (i, param) in params.into_iter().enumerate() {
        arrays[i % width].values.push(param.value);
    }
    arrays
}

fn elements<T>(values: &[Value], f: impl Fn(&Value) -> Option<T>) -> Vec<Option<T>> {
    values.iter().map(f).collect()
}

/// Bind an array of `param.semantic_type`. Elements of another type go out as NULL.
pub fn bind_array<'q>(query: PgQuery<'q>, param: &ArrayParam) -> PgQuery<'q> {
    let values = param.values.as_slice();
    match param.semantic_type {
        SemanticType::Boolean => query.bind(elements(values, |v| match v {
            Value::Boolean(b) => Some(*b),
            _ => None,
        })),
        SemanticType::Integer => query.bind(elements(values, |v| match v {
            Value::Integer(n) => Some(*n),
            _ => None,
        })),
        SemanticType::Long => query.bind(elements(values, |v| match v {
            Value::Long(n) => Some(*n),
            _ => None,
        })),
        SemanticType::Float => query.bind(elements(values, |v| match v {
            Value::Float(n) => Some(*n),
            _ => None,
        })),
        SemanticType::Double => query.bind(elements(values, |v| match v {
            Value::Double(n) => Some(*n),
            _ => None,
        })),
        SemanticType::Decimal => query.bind(elements(values, |v| match v {
            Value::Decimal(d) => Some(d.clone()),
            _ => None,
        })),
        SemanticType::Text => query.bind(elements(values, |v| match v {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        })),
        SemanticType::Date => query.bind(elements(values, |v| match v {
            Value::Date(d) => Some(*d),
            _ => None,
        })),
        SemanticType::Time => query.bind(elements(values, |v| match v {
            Value::Time(t) => Some(*t),
            _ => None,
        })),
        SemanticType::Timestamp => query.bind(elements(values, |v| match v {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        })),
    }
}

/// Read `fields` from `row` by column name. SQL NULL columns are left out of the entity.
pub fn row_to_entity<'a>(
    row: &PgRow,
    fields: impl IntoIterator<Item = &'a Field>,
) -> Result<Entity, sqlx::Error> {
    let mut entity = Entity::new();
    for field in fields {
        let value = cell_to_value(row, field)?;
        if !value.is_null() {
            entity.insert(field.name.clone(), value);
        }
    }
    Ok(entity)
}

fn cell_to_value(row: &PgRow, field: &Field) -> Result<Value, sqlx::Error> {
    let name = field.column.name.as_str();
    Ok(match field.semantic_type {
        SemanticType::Boolean => row.try_get::<Option<bool>, _>(name)?.into(),
        SemanticType::Integer => row.try_get::<Option<i32>, _>(name)?.into(),
        SemanticType::Long => row.try_get::<Option<i64>, _>(name)?.into(),
        SemanticType::Float => row.try_get::<Option<f32>, _>(name)?.into(),
        SemanticType::Double => row.try_get::<Option<f64>, _>(name)?.into(),
        SemanticType::Decimal => row.try_get::<Option<BigDecimal>, _>(name)?.into(),
        SemanticType::Text => row.try_get::<Option<String>, _>(name)?.into(),
        SemanticType::Date => row.try_get::<Option<NaiveDate>, _>(name)?.into(),
        SemanticType::Time => row.try_get::<Option<NaiveTime>, _>(name)?.into(),
        SemanticType::Timestamp => row.try_get::<Option<NaiveDateTime>, _>(name)?.into(),
    })
}
