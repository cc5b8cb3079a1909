//! EntityStore: generic CRUD using the safe SQL builder.

mod store;
mod validation;
pub use store::{EntityStore, StoreOptions, DEFAULT_BATCH_SIZE};
pub use validation::EntityValidator;
