//! JSON conversions for contexts.

use super::{Context, Value};
use chrono::DateTime;

/// Keys carrying this prefix and an epoch-milliseconds number decode to a
/// datetime stored under the unprefixed key.
const DATE_KEY_PREFIX: &str = "_dt";

fn not_an_object(found: &serde_json::Value) -> serde_json::Error {
    let kind = match found {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    };
    <serde_json::Error as serde::de::Error>::custom(format!(
        "expected a JSON object, found {kind}"
    ))
}

impl Value {
    /// Converts a JSON tree into a value.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(Context::from_json_map(map)),
        }
    }
}

impl Context {
    /// Converts a JSON object into a context.
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON value is not an object.
    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(not_an_object(&other)),
        }
    }

    /// Parses JSON text into a context. Blank text yields an empty context.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON or a non-object root.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        Self::from_json(serde_json::from_str(text)?)
    }

    fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut ctx = Self::new();
        for (key, value) in map {
            if key.len() > DATE_KEY_PREFIX.len() && key.starts_with(DATE_KEY_PREFIX) {
                let decoded = value
                    .as_i64()
                    .and_then(DateTime::from_timestamp_millis)
                    .map(|dt| dt.naive_utc());
                if let Some(dt) = decoded {
                    ctx.insert(&key[DATE_KEY_PREFIX.len()..], dt);
                    continue;
                }
            }
            ctx.insert(key, Value::from_json(value));
        }
        ctx
    }

    /// Converts the context into a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_json_normalizes_nested_keys() {
        let ctx = Context::from_json(serde_json::json!({
            "Customer": {"Name": "Ada", "Tags": ["a", "b"]},
            "Total": 12.5
        }))
        .unwrap();

        assert_eq!(ctx.get_string("customer.name"), "Ada");
        assert_eq!(ctx.get_string("CUSTOMER.TAGS.1"), "b");
        assert_eq!(ctx.get("total"), Some(&Value::Float(12.5)));
    }

    #[test]
    fn test_date_prefixed_keys_decode_to_datetime() {
        let ctx = Context::from_json(serde_json::json!({"_dtCreated": 0})).unwrap();
        match ctx.get("created") {
            Some(Value::DateTime(dt)) => assert_eq!(dt.to_string(), "1970-01-01 00:00:00"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        let err = Context::from_json_str("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("found array"));
    }

    #[test]
    fn test_blank_text_is_empty_context() {
        assert!(Context::from_json_str("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_to_json_keeps_insertion_order() {
        let ctx = Context::new().with("b", 1).with("a", 2);
        let text = serde_json::to_string(&ctx).unwrap();
        assert_eq!(text, r#"{"b":1,"a":2}"#);
    }
}
