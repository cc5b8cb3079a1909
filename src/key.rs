//! Opaque key strings <-> typed keys.
//!
//! A table with a single key field uses the plain textual value as its key string
//! (`"12"`, `"2024-01-02"`). A composite key is unpadded URL-safe base64 of a JSON object
//! holding every key field by field name, e.g. `{"id":1,"region":"eu"}`, so it fits in a path segment.

use crate::error::StoreError;
use crate::schema::Field;
use crate::service::EntityValidator;
use crate::value::{Entity, Key, Value};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[derive(Clone, Debug)]
pub struct KeyCodec {
    key_fields: Vec<Field>,
}

impl KeyCodec {
    /// Codec for the key fields among `fields`. A table without a primary key cannot be addressed.
    pub fn new(fields: &[Field]) -> Result<Self, StoreError> {
        let key_fields: Vec<Field> = fields.iter().filter(|f| f.is_key()).cloned().collect();
        if key_fields.is_empty() {
            return Err(StoreError::Schema("table has no primary key".into()));
        }
        Ok(KeyCodec { key_fields })
    }

    pub fn key_fields(&self) -> &[Field] {
        &self.key_fields
    }

    pub fn parse(&self, raw: &str) -> Result<Key, StoreError> {
        match self.key_fields.as_slice() {
            [field] => {
                let value = Value::parse(field.semantic_type, raw).map_err(StoreError::KeyParse)?;
                Ok(Key::new(Entity::new().with(field.name.clone(), value)))
            }
            fields => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(raw.trim().trim_end_matches('='))
                    .map_err(|e| StoreError::InvalidKey(format!("not base64: {}", e)))?;
                let json: serde_json::Value = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::InvalidKey(format!("not json: {}", e)))?;
                let object = json
                    .as_object()
                    .ok_or_else(|| StoreError::InvalidKey("expected a json object".into()))?;
                let mut key = Entity::new();
                for field in fields {
                    let value = object
                        .get(&field.name)
                        .map(|v| Value::from_json(field.semantic_type, v))
                        .transpose()
                        .map_err(StoreError::InvalidKey)?
                        .filter(|v| !v.is_null())
                        .ok_or_else(|| StoreError::InvalidKey(format!("missing key field {}", field.name)))?;
                    key.insert(field.name.clone(), value);
                }
                Ok(Key::new(key))
            }
        }
    }

    /// Opaque string for `key`; `parse(encode(k)) == k`.
    pub fn encode(&self, key: &Key) -> Result<String, StoreError> {
        let value_of = |field: &Field| {
            key.get(&field.name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| StoreError::InvalidKey(format!("missing key field {}", field.name)))
        };
        match self.key_fields.as_slice() {
            [field] => Ok(value_of(field)?.to_text().unwrap_or_default()),
            fields => {
                let mut object = serde_json::Map::new();
                for field in fields {
                    object.insert(field.name.clone(), value_of(field)?.to_json());
                }
                let json = serde_json::to_vec(&serde_json::Value::Object(object))
                    .map_err(|e| StoreError::InvalidKey(e.to_string()))?;
                Ok(URL_SAFE_NO_PAD.encode(json))
            }
        }
    }

    /// Project an entity onto its key fields, coerced to their types. Every key field must be
    /// present and non-null.
    pub fn key_of(&self, entity: &Entity) -> Result<Key, StoreError> {
        let mut key = Entity::new();
        for field in &self.key_fields {
            match entity.get(&field.name) {
                Some(v) if !v.is_null() => {
                    key.insert(field.name.clone(), EntityValidator::coerce(field, v)?);
                }
                _ => {
                    return Err(StoreError::Validation(format!(
                        "key field {} is required",
                        field.name
                    )))
                }
            }
        }
        Ok(Key::new(key))
    }
}
