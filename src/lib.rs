//! Relational store: generic CRUD, key codec and paging over a PostgreSQL table discovered at runtime.

pub mod case;
pub mod config;
pub mod error;
pub mod key;
pub mod page;
pub mod predicate;
pub mod schema;
pub mod service;
pub mod sql;
pub mod value;

pub use config::StoreConfig;
pub use error::{ConfigError, Result, StoreError};
pub use key::KeyCodec;
pub use page::{Direction, Page, PageRequest, Sort};
pub use predicate::{BoxError, NoFilter, Predicate, PredicateCompiler};
pub use schema::{Field, SchemaCatalog, SemanticType};
pub use service::{EntityStore, StoreOptions};
pub use value::{Entity, Key, Value};
