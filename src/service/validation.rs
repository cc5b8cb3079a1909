//! Entity validation against the discovered fields. Runs before any statement executes.

use crate::error::StoreError;
use crate::schema::{Field, SemanticType, Table};
use crate::sql::Param;
use crate::value::{Entity, Key, Value};
use bigdecimal::BigDecimal;

pub struct EntityValidator;

impl EntityValidator {
    /// Convert `value` to `field`'s semantic type. Exact matches pass through; lossless widening
    /// (integer -> long/decimal, float -> double) and textual temporal/decimal values convert;
    /// anything else fails.
    pub fn coerce(field: &Field, value: &Value) -> Result<Value, StoreError> {
        let ty = field.semantic_type;
        if value.is_null() || value.semantic_type() == Some(ty) {
            return Ok(value.clone());
        }
        match (ty, value) {
            (SemanticType::Long, Value::Integer(n)) => Ok(Value::Long(i64::from(*n))),
            (SemanticType::Double, Value::Float(n)) => Ok(Value::Double(f64::from(*n))),
            (SemanticType::Decimal, Value::Integer(n)) => Ok(Value::Decimal(BigDecimal::from(*n))),
            (SemanticType::Decimal, Value::Long(n)) => Ok(Value::Decimal(BigDecimal::from(*n))),
            (
                SemanticType::Decimal | SemanticType::Date | SemanticType::Time | SemanticType::Timestamp,
                Value::Text(s),
            ) => Value::parse(ty, s).map_err(|e| StoreError::Validation(format!("{}: {}", field.name, e))),
            _ => Err(StoreError::Validation(format!(
                "{} must be {:?}, got {:?}",
                field.name, ty, value
            ))),
        }
    }

    /// Value to write for `field`: absent counts as NULL, which a non-nullable column rejects.
    fn required(field: &Field, value: Option<&Value>) -> Result<Param, StoreError> {
        let value = match value {
            Some(v) => Self::coerce(field, v)?,
            None => Value::Null,
        };
        if value.is_null() && !field.column.nullable {
            return Err(StoreError::Validation(format!(
                "{} does not allow nulls",
                field.name
            )));
        }
        Ok(Param::typed(field, value))
    }

    /// INSERT parameters: every non-auto-increment field in declaration order.
    pub fn insert_params(table: &Table, entity: &Entity) -> Result<Vec<Param>, StoreError> {
        table
            .insertable_fields()
            .map(|f| Self::required(f, entity.get(&f.name)))
            .collect()
    }

    /// Mutable fields present in `entity`, in declaration order. Absent fields are not updated.
    /// An entity with no mutable field cannot be told apart from a malformed one.
    pub fn update_shape<'t>(table: &'t Table, entity: &Entity) -> Result<Vec<&'t Field>, StoreError> {
        let shape: Vec<&Field> = table
            .mutable_fields()
            .filter(|f| entity.contains(&f.name))
            .collect();
        if shape.is_empty() {
            return Err(StoreError::Update("entity shape not recognized".into()));
        }
        Ok(shape)
    }

    /// UPDATE parameters: the `shape` values, then the key values.
    pub fn update_params(table: &Table, shape: &[&Field], entity: &Entity) -> Result<Vec<Param>, StoreError> {
        let mut params = shape
            .iter()
            .map(|f| Self::required(f, entity.get(&f.name)))
            .collect::<Result<Vec<_>, _>>()?;
        params.extend(Self::key_params(table, entity)?);
        Ok(params)
    }

    /// Key values of `entity` in key-field order; every key field must be present and non-null.
    pub fn key_params(table: &Table, entity: &Entity) -> Result<Vec<Param>, StoreError> {
        table
            .key_fields()
            .map(|f| match entity.get(&f.name) {
                Some(v) if !v.is_null() => Ok(Param::typed(f, Self::coerce(f, v)?)),
                _ => Err(StoreError::Validation(format!("key field {} is required", f.name))),
            })
            .collect()
    }

    /// Concatenated key values of every key, in request order.
    pub fn keys_params(table: &Table, keys: &[Key]) -> Result<Vec<Param>, StoreError> {
        let mut params = Vec::with_capacity(keys.len() * table.key_fields().count());
        for key in keys {
            params.extend(Self::key_params(table, key.as_entity())?);
        }
        Ok(params)
    }
}
