//! `SQLite` implementation of [`DbFacade`].
//!
//! Placeholders use SQLite's own named parameter syntax (`@name`, `:name`,
//! `$name`); each one is bound from the matching context key, and names
//! missing from the context bind NULL.

use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

use super::{placeholder_key, DbFacade, DbProvider, QueryStore};
use crate::config::{DatabaseConfig, SQLITE};
use crate::context::{Context, Value, DATETIME_FORMAT};
use crate::errors::DbError;

/// A single `SQLite` connection carrying the batch transaction.
pub struct SqliteFacade {
    conn: Connection,
    queries: QueryStore,
}

impl std::fmt::Debug for SqliteFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFacade")
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl SqliteFacade {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path, queries: QueryStore) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn, queries })
    }

    /// Creates an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the database can't be initialized.
    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            queries: QueryStore::default(),
        })
    }

    /// Runs raw SQL statements outside the parameter binding path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn prepare<'c>(
        conn: &'c Connection,
        sql: &str,
        params: &Context,
    ) -> Result<rusqlite::Statement<'c>, DbError> {
        let mut stmt = conn.prepare(sql)?;
        for index in 1..=stmt.parameter_count() {
            let value = stmt
                .parameter_name(index)
                .and_then(|name| params.get(&placeholder_key(name)))
                .map_or(SqlValue::Null, to_sql_value);
            stmt.raw_bind_parameter(index, value)?;
        }
        Ok(stmt)
    }
}

impl DbFacade for SqliteFacade {
    fn query(&mut self, sql_or_name: &str, params: &Context) -> Result<Vec<Context>, DbError> {
        let sql = self.queries.resolve(sql_or_name)?;
        let mut stmt = Self::prepare(&self.conn, &sql, params)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut ctx = Context::new();
            for (index, column) in columns.iter().enumerate() {
                ctx.insert(column, from_sql_value(row.get_ref(index)?));
            }
            out.push(ctx);
        }
        tracing::debug!(rows = out.len(), "Query returned");
        Ok(out)
    }

    fn execute(&mut self, sql_or_name: &str, params: &Context) -> Result<usize, DbError> {
        let sql = self.queries.resolve(sql_or_name)?;
        let mut stmt = Self::prepare(&self.conn, &sql, params)?;
        let affected = stmt.raw_execute()?;
        tracing::debug!(affected, "Command executed");
        Ok(affected)
    }

    fn begin(&mut self) -> Result<(), DbError> {
        if self.in_transaction() {
            return Err(DbError::Transaction("transaction already open".into()));
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction() {
            return Err(DbError::Transaction("no open transaction to commit".into()));
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

/// Opens [`SqliteFacade`] connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteProvider;

impl DbProvider for SqliteProvider {
    fn open(&self, config: &DatabaseConfig) -> Result<Box<dyn DbFacade>, DbError> {
        if !config.kind.eq_ignore_ascii_case(SQLITE) {
            return Err(DbError::Backend(format!(
                "unsupported database kind '{}'",
                config.kind
            )));
        }
        let queries = QueryStore::new(config.query_dir.clone());
        let facade = SqliteFacade::open(Path::new(&config.connection_string), queries)?;
        Ok(Box::new(facade))
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Map(_) | Value::List(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded() -> SqliteFacade {
        let db = SqliteFacade::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE orders (id INTEGER, Customer TEXT, total REAL, note TEXT);
             INSERT INTO orders VALUES (1, 'ada', 10.5, NULL);
             INSERT INTO orders VALUES (2, 'bob', 3.0, 'rush');",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_query_maps_columns_to_lowercase_keys() {
        let mut db = seeded();
        let rows = db
            .query("SELECT id, Customer, total, note FROM orders ORDER BY id", &Context::new())
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("customer"), Some(&Value::from("ada")));
        assert_eq!(rows[0].get("total"), Some(&Value::Float(10.5)));
        assert_eq!(rows[0].get("note"), Some(&Value::Null));
        assert_eq!(rows[1].get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_named_parameters_bind_from_context() {
        let mut db = seeded();
        let params = Context::new().with("Customer", "bob");
        let rows = db
            .query("SELECT id FROM orders WHERE customer = @customer", &params)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_missing_parameter_binds_null() {
        let mut db = seeded();
        let rows = db
            .query("SELECT @absent IS NULL AS missing", &Context::new())
            .unwrap();
        assert_eq!(rows[0].get("missing"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut db = seeded();
        db.begin().unwrap();
        assert!(db.in_transaction());
        let affected = db
            .execute("DELETE FROM orders WHERE id = :id", &Context::new().with("id", 1))
            .unwrap();
        assert_eq!(affected, 1);
        db.rollback().unwrap();
        assert!(!db.in_transaction());

        let rows = db.query("SELECT id FROM orders", &Context::new()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_commit_without_begin_fails() {
        let mut db = seeded();
        assert!(matches!(db.commit(), Err(DbError::Transaction(_))));
    }

    #[test]
    fn test_provider_rejects_unknown_kind() {
        let config = DatabaseConfig {
            kind: "oracle".into(),
            connection_string: "x".into(),
            query_dir: None,
        };
        assert!(matches!(
            SqliteProvider.open(&config),
            Err(DbError::Backend(_))
        ));
    }

    #[test]
    fn test_provider_uses_query_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("answer.sql"), "SELECT 42 AS answer").unwrap();
        let config = DatabaseConfig {
            kind: "SQLite".into(),
            connection_string: dir.path().join("w.db").display().to_string(),
            query_dir: Some(dir.path().to_path_buf()),
        };

        let mut db = SqliteProvider.open(&config).unwrap();
        let rows = db.query("answer", &Context::new()).unwrap();
        assert_eq!(rows[0].get("answer"), Some(&Value::Integer(42)));
    }
}
