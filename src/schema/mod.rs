//! Table metadata: semantic types, columns, fields and catalog discovery.

mod catalog;
mod table;
mod types;
pub use catalog::SchemaCatalog;
pub use table::Table;
pub use types::*;
