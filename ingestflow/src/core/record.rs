//! The record token that flows through a pipeline.

/// A unit of metadata produced by a source and passed down the step chain.
///
/// The engine never inspects a record beyond asking for its key, which is used
/// to name status entries and failures.
pub trait Record: Send + 'static {
    /// A human-readable identifier for status reports.
    fn key(&self) -> String;
}

impl Record for String {
    fn key(&self) -> String {
        self.clone()
    }
}

impl Record for serde_json::Value {
    fn key(&self) -> String {
        ["fullyQualifiedName", "name", "id"]
            .iter()
            .find_map(|field| self.get(field).and_then(|v| v.as_str()))
            .map_or_else(|| self.to_string(), String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_key() {
        assert_eq!("table_a".to_string().key(), "table_a");
    }

    #[test]
    fn test_json_key_prefers_fqn() {
        let value = serde_json::json!({"name": "orders", "fullyQualifiedName": "db.sales.orders"});
        assert_eq!(value.key(), "db.sales.orders");

        let value = serde_json::json!({"name": "orders"});
        assert_eq!(value.key(), "orders");

        let value = serde_json::json!(42);
        assert_eq!(value.key(), "42");
    }
}
