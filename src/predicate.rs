//! Interface to the external filter-query compiler.

use crate::value::Value;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A compiled SQL boolean expression. Placeholders in `sql` are numbered `$1..$n` and bind
/// `params` positionally.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate {
            sql: sql.into(),
            params,
        }
    }
}

/// Turns filter text (e.g. `value1 = "T1" && id > 3`) into a [`Predicate`] over the table's
/// columns. The grammar belongs to the implementation.
pub trait PredicateCompiler: Send + Sync {
    fn compile(&self, query: &str) -> Result<Predicate, BoxError>;
}

/// Compiler for stores that never filter; every query is rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFilter;

impl PredicateCompiler for NoFilter {
    fn compile(&self, query: &str) -> Result<Predicate, BoxError> {
        Err(format!("filtering is not supported: {}", query).into())
    }
}
