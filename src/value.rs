//! Semantically typed values, entities and keys.
//!
//! A [`Value`] carries the Rust representation of one [`SemanticType`]; an [`Entity`] maps
//! field names to values. Absent and `Null` are distinct: an absent field is left alone by
//! updates, a `Null` one is written as SQL NULL.

use crate::schema::SemanticType;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as Json;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S%.f";
const TIME_FORMAT_SHORT: &str = "%H:%M";

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(BigDecimal),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Semantic type of a non-null value.
    pub fn semantic_type(&self) -> Option<SemanticType> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(_) => SemanticType::Boolean,
            Value::Integer(_) => SemanticType::Integer,
            Value::Long(_) => SemanticType::Long,
            Value::Float(_) => SemanticType::Float,
            Value::Double(_) => SemanticType::Double,
            Value::Decimal(_) => SemanticType::Decimal,
            Value::Text(_) => SemanticType::Text,
            Value::Date(_) => SemanticType::Date,
            Value::Time(_) => SemanticType::Time,
            Value::Timestamp(_) => SemanticType::Timestamp,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Parse the canonical textual form of a value of type `ty`.
    pub fn parse(ty: SemanticType, s: &str) -> Result<Value, String> {
        let invalid = |e: &dyn std::fmt::Display| format!("'{}' is not a valid {:?}: {}", s, ty, e);
        Ok(match ty {
            SemanticType::Boolean => {
                if s.eq_ignore_ascii_case("true") {
                    Value::Boolean(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Value::Boolean(false)
                } else {
                    return Err(invalid(&"expected true or false"));
                }
            }
            SemanticType::Integer => Value::Integer(s.parse().map_err(|e| invalid(&e))?),
            SemanticType::Long => Value::Long(s.parse().map_err(|e| invalid(&e))?),
            SemanticType::Float => Value::Float(s.parse().map_err(|e| invalid(&e))?),
            SemanticType::Double => Value::Double(s.parse().map_err(|e| invalid(&e))?),
            SemanticType::Decimal => Value::Decimal(BigDecimal::from_str(s).map_err(|e| invalid(&e))?),
            SemanticType::Text => Value::Text(s.to_string()),
            SemanticType::Date => {
                Value::Date(NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| invalid(&e))?)
            }
            SemanticType::Time => Value::Time(
                NaiveTime::parse_from_str(s, TIME_FORMAT)
                    .or_else(|_| NaiveTime::parse_from_str(s, TIME_FORMAT_SHORT))
                    .map_err(|e| invalid(&e))?,
            ),
            SemanticType::Timestamp => Value::Timestamp(
                NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                    .or_else(|_| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT_ISO))
                    .map_err(|e| invalid(&e))?,
            ),
        })
    }

    /// Canonical textual form; `None` for `Null`.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            Value::Null => return None,
            Value::Boolean(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Double(n) => n.to_string(),
            Value::Decimal(d) => d.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::Time(t) => t.format(TIME_FORMAT).to_string(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        })
    }

    /// Coerce a JSON value into type `ty`. Numbers and numeric strings convert into each other,
    /// temporal types are read from their textual form. Anything lossy or ambiguous is an error.
    pub fn from_json(ty: SemanticType, json: &Json) -> Result<Value, String> {
        let mismatch = || format!("{} cannot be read as {:?}", json, ty);
        match (ty, json) {
            (_, Json::Null) => Ok(Value::Null),
            (_, Json::Array(_) | Json::Object(_)) => Err(mismatch()),
            (_, Json::String(s)) => Value::parse(ty, s),
            (SemanticType::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
            (SemanticType::Text, Json::Bool(b)) => Ok(Value::Text(b.to_string())),
            (_, Json::Bool(_)) => Err(mismatch()),
            (SemanticType::Integer, Json::Number(n)) => n
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Value::Integer)
                .ok_or_else(mismatch),
            (SemanticType::Long, Json::Number(n)) => n.as_i64().map(Value::Long).ok_or_else(mismatch),
            (SemanticType::Float, Json::Number(n)) => {
                n.as_f64().map(|f| Value::Float(f as f32)).ok_or_else(mismatch)
            }
            (SemanticType::Double, Json::Number(n)) => n.as_f64().map(Value::Double).ok_or_else(mismatch),
            (SemanticType::Decimal | SemanticType::Text, Json::Number(n)) => Value::parse(ty, &n.to_string()),
            (_, Json::Number(_)) => Err(mismatch()),
        }
    }

    /// JSON form. Decimals are written as strings so no precision is lost; temporal values use
    /// their canonical textual form.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Integer(n) => Json::from(*n),
            Value::Long(n) => Json::from(*n),
            // shortest decimal form of the f32, not its widened f64 expansion
            Value::Float(n) => n
                .to_string()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Double(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
            Value::Decimal(_) | Value::Text(_) | Value::Date(_) | Value::Time(_) | Value::Timestamp(_) => {
                self.to_text().map(Json::String).unwrap_or(Json::Null)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Field name -> value, in insertion order. Equality ignores order and treats `Null` as absent.
#[derive(Clone, Debug, Default)]
pub struct Entity {
    values: Vec<(String, Value)>,
}

impl Entity {
    pub fn new() -> Self {
        Entity { values: Vec::new() }
    }

    /// Builder form of [`Entity::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, replacing any previous value in place. Returns the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.values.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.values.iter().position(|(n, _)| n == name)?;
        Some(self.values.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Both sides hold the same non-null values. A `Null` field equals an absent one: either is SQL NULL.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        fn present(e: &Entity) -> impl Iterator<Item = (&str, &Value)> {
            e.iter().filter(|(_, v)| !v.is_null())
        }
        present(self).count() == present(other).count()
            && present(self).all(|(n, v)| other.get(n) == Some(v))
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Entity {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut entity = Entity::new();
        for (n, v) in iter {
            entity.insert(n, v);
        }
        entity
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (n, v) in &self.values {
            map.serialize_entry(n, v)?;
        }
        map.end()
    }
}

/// The key-field values identifying one row.
#[derive(Clone, Debug, PartialEq, Default, serde::Serialize)]
#[serde(transparent)]
pub struct Key(Entity);

impl Key {
    pub fn new(values: Entity) -> Self {
        Key(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter()
    }

    pub fn as_entity(&self) -> &Entity {
        &self.0
    }

    pub fn into_entity(self) -> Entity {
        self.0
    }
}
