//! The value model flowing through a pipeline.
//!
//! A [`Context`] is an ordered map whose keys are compared
//! case-insensitively: every read and write lower-cases the key. Cloning a
//! context is a deep structural copy, which is what isolates sibling
//! activations from one another.

#[cfg(test)]
mod context_tests;
mod json;
mod value;
mod xml;

pub use value::{Value, DATETIME_FORMAT};

use indexmap::IndexMap;

/// Lower-cases a key the way every context lookup does.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// An ordered associative container with case-insensitive keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Context {
    entries: IndexMap<String, Value>,
}

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one for the key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<Value>) -> Option<Value> {
        self.entries
            .insert(normalize_key(key.as_ref()), value.into())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&normalize_key(key))
    }

    /// Gets a mutable value by key.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(&normalize_key(key))
    }

    /// Removes a key, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(&normalize_key(key))
    }

    /// Checks whether a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolves a dotted path such as `order.lines.0.qty`.
    ///
    /// Map segments are looked up case-insensitively, list segments must be
    /// numeric indexes.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.').map(str::trim);
        let first = parts.next()?;
        let mut current = self.get(first)?;
        for part in parts {
            current = match current {
                Value::Map(ctx) => ctx.get(part)?,
                Value::List(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Renders the value at `path` as text; missing values render empty.
    #[must_use]
    pub fn get_string(&self, path: &str) -> String {
        self.get_path(path).map(ToString::to_string).unwrap_or_default()
    }

    /// Resolves the sequence at `path`: a list is returned as-is, a map
    /// yields its values in order. Anything else is `None`.
    #[must_use]
    pub fn select_values(&self, path: &str) -> Option<Vec<Value>> {
        match self.get_path(path)? {
            Value::List(items) => Some(items.clone()),
            Value::Map(ctx) => Some(ctx.values().cloned().collect()),
            _ => None,
        }
    }

    /// Pretty JSON rendering used by debug logging.
    #[must_use]
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_default()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut ctx = Self::new();
        for (k, v) in iter {
            ctx.insert(k, v);
        }
        ctx
    }
}

impl IntoIterator for Context {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl serde::Serialize for Context {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
