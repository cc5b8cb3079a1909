//! Typed errors for the store, key codec and schema catalog.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("schema: {0}")]
    Schema(String),
    #[error("unsupported column type {type_name} for column {column}")]
    UnsupportedType { column: String, type_name: String },
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("key parse: {0}")]
    KeyParse(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("query parse: {0}")]
    QueryParse(String),
    #[error("find: {0}")]
    Find(String),
    #[error("insert: {0}")]
    Insert(String),
    #[error("update: {0}")]
    Update(String),
    #[error("delete: {0}")]
    Delete(String),
}

impl StoreError {
    /// True for kinds caused by the caller's input (bad key, bad entity, bad filter).
    /// Everything else is a configuration or data-access failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidKey(_)
                | StoreError::KeyParse(_)
                | StoreError::Validation(_)
                | StoreError::QueryParse(_)
        )
    }

    pub(crate) fn find(e: sqlx::Error) -> Self {
        StoreError::Find(root_cause(&e))
    }

    pub(crate) fn insert(e: sqlx::Error) -> Self {
        StoreError::Insert(root_cause(&e))
    }

    pub(crate) fn update(e: sqlx::Error) -> Self {
        StoreError::Update(root_cause(&e))
    }

    pub(crate) fn delete(e: sqlx::Error) -> Self {
        StoreError::Delete(root_cause(&e))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Message of the innermost error: the database's own message when the server rejected the
/// statement, otherwise the last `source()` in the chain.
pub(crate) fn root_cause(e: &sqlx::Error) -> String {
    if let sqlx::Error::Database(db) = e {
        return match db.code() {
            Some(code) => format!("{} ({})", db.message(), code),
            None => db.message().to_string(),
        };
    }
    let mut current: &dyn std::error::Error = e;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}
