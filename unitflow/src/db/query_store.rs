//! Named queries stored as `.sql` files.

use crate::errors::DbError;
use std::collections::HashMap;
use std::path::PathBuf;

/// Resolves query names to SQL text, caching each file after first read.
#[derive(Debug, Default)]
pub struct QueryStore {
    root: Option<PathBuf>,
    cache: HashMap<String, String>,
}

impl QueryStore {
    /// Creates a store rooted at `root`; `None` disables named queries.
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            cache: HashMap::new(),
        }
    }

    /// Returns true when `text` is a bare query name rather than SQL.
    #[must_use]
    pub fn is_name(text: &str) -> bool {
        let text = text.trim();
        !text.is_empty()
            && text
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'))
    }

    /// Returns the SQL for `sql_or_name`.
    ///
    /// Text that is not a bare name, or any text when no root is configured,
    /// is returned unchanged.
    pub fn resolve(&mut self, sql_or_name: &str) -> Result<String, DbError> {
        let Some(root) = &self.root else {
            return Ok(sql_or_name.to_string());
        };
        if !Self::is_name(sql_or_name) {
            return Ok(sql_or_name.to_string());
        }

        let name = sql_or_name.trim();
        let key = name.to_lowercase();
        if let Some(sql) = self.cache.get(&key) {
            return Ok(sql.clone());
        }

        let path = root.join(format!("{name}.sql"));
        if !path.exists() {
            return Err(DbError::QueryNotFound(name.to_string()));
        }
        let sql = std::fs::read_to_string(&path)
            .map_err(|source| DbError::QueryFile { path, source })?;
        tracing::info!(query = %name, "Cached stored query");
        self.cache.insert(key, sql.clone());
        Ok(sql)
    }
}
