//! Database facade consumed by the batch and the units.
//!
//! One facade instance carries the single shared transaction of a batch
//! run; every unit activation reads and writes through it.

mod query_store;
mod sqlite;

pub use query_store::QueryStore;
pub use sqlite::{SqliteFacade, SqliteProvider};

use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::errors::DbError;

/// Parametrized SQL execution with batch-level transaction control.
///
/// `sql_or_name` is either SQL text or the name of a stored query.
/// Placeholders written `@name` are bound from the context key `name`.
pub trait DbFacade: Send {
    /// Runs a query and returns its rows.
    fn query(&mut self, sql_or_name: &str, params: &Context) -> Result<Vec<Context>, DbError>;

    /// Runs a command and returns the affected row count.
    fn execute(&mut self, sql_or_name: &str, params: &Context) -> Result<usize, DbError>;

    /// Opens the shared transaction.
    fn begin(&mut self) -> Result<(), DbError>;

    /// Commits the shared transaction.
    fn commit(&mut self) -> Result<(), DbError>;

    /// Rolls back the shared transaction.
    fn rollback(&mut self) -> Result<(), DbError>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;
}

/// Opens database facades from configuration.
pub trait DbProvider: Send + Sync {
    /// Opens a new facade.
    fn open(&self, config: &DatabaseConfig) -> Result<Box<dyn DbFacade>, DbError>;
}

/// Strips a placeholder sigil (`@`, `:`, `$`, `?`) and normalizes the name.
#[must_use]
pub fn placeholder_key(name: &str) -> String {
    crate::context::normalize_key(name.trim_start_matches(['@', ':', '$', '?']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_key() {
        assert_eq!(placeholder_key("@CustomerId"), "customerid");
        assert_eq!(placeholder_key(":x"), "x");
        assert_eq!(placeholder_key("$Y"), "y");
    }
}
