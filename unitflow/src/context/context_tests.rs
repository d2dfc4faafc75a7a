//! Comprehensive tests for the context module.

#[cfg(test)]
mod tests {
    use crate::context::{Context, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut ctx = Context::new();
        ctx.insert("CustomerId", 7);

        assert_eq!(ctx.get("customerid"), Some(&Value::Integer(7)));
        assert_eq!(ctx.get("CUSTOMERID"), Some(&Value::Integer(7)));
        assert!(ctx.contains_key("customerId"));
        assert_eq!(ctx.keys().collect::<Vec<_>>(), vec!["customerid"]);
    }

    #[test]
    fn test_insert_overwrites_regardless_of_case() {
        let mut ctx = Context::new();
        ctx.insert("Name", "a");
        let previous = ctx.insert("NAME", "b");

        assert_eq!(previous, Some(Value::from("a")));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get_string("name"), "b");
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut ctx = Context::new().with("a", 1).with("b", 2).with("c", 3);
        ctx.remove("B");
        assert_eq!(ctx.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_get_path_through_lists_and_maps() {
        let ctx = Context::from_json(serde_json::json!({
            "order": {"lines": [{"qty": 1}, {"qty": 4}]}
        }))
        .unwrap();

        assert_eq!(ctx.get_path("order.lines.1.qty"), Some(&Value::Integer(4)));
        assert_eq!(ctx.get_path("order.lines.9.qty"), None);
        assert_eq!(ctx.get_path("order.lines.x"), None);
        assert_eq!(ctx.get_string("order.missing"), "");
    }

    #[test]
    fn test_select_values_from_list_or_map() {
        let ctx = Context::from_json(serde_json::json!({
            "list": [1, 2],
            "map": {"x": "a", "y": "b"},
            "scalar": 3
        }))
        .unwrap();

        assert_eq!(ctx.select_values("list").map(|v| v.len()), Some(2));
        assert_eq!(
            ctx.select_values("map"),
            Some(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(ctx.select_values("scalar"), None);
        assert_eq!(ctx.select_values("absent"), None);
    }

    #[test]
    fn test_clone_is_deep() {
        let original = Context::from_json(serde_json::json!({
            "items": [{"tags": ["a"]}]
        }))
        .unwrap();

        let mut copy = original.clone();
        if let Some(Value::List(items)) = copy.get_mut("items") {
            if let Value::Map(first) = &mut items[0] {
                first.insert("tags", Value::List(vec![]));
            }
        }

        assert_eq!(original.get_string("items.0.tags.0"), "a");
        assert_eq!(copy.get_path("items.0.tags"), Some(&Value::List(vec![])));
    }

    #[test]
    fn test_from_iterator() {
        let ctx: Context = vec![("A", 1), ("B", 2)].into_iter().collect();
        assert_eq!(ctx.get_string("a"), "1");
        assert_eq!(ctx.get_string("b"), "2");
    }
}
