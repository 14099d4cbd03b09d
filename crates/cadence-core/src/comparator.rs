use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pure function over the values of one data node, one value per scenario
/// in comparison order.
pub type Comparator = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Comparator functions addressable by the names used in scenario configs.
#[derive(Clone, Default)]
pub struct ComparatorRegistry {
    functions: BTreeMap<String, Comparator>,
}

impl ComparatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `equal` and `delta`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("equal", equal);
        registry.register("delta", delta);
        registry
    }

    /// Replaces any function already registered under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&Comparator> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for ComparatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in comparators
// ---------------------------------------------------------------------------

/// `true` when every value equals the first.
pub fn equal(values: &[Value]) -> Value {
    Value::Bool(values.windows(2).all(|w| w[0] == w[1]))
}

/// Each later value minus the first. Non-numeric entries yield `null`.
pub fn delta(values: &[Value]) -> Value {
    let Some((first, rest)) = values.split_first() else {
        return Value::Array(Vec::new());
    };
    let base = first.as_f64();
    Value::Array(
        rest.iter()
            .map(|v| match (base, v.as_f64()) {
                (Some(b), Some(x)) => serde_json::json!(x - b),
                _ => Value::Null,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_compares_all() {
        assert_eq!(equal(&[json!(1), json!(1), json!(1)]), json!(true));
        assert_eq!(equal(&[json!({"a": 1}), json!({"a": 2})]), json!(false));
    }

    #[test]
    fn delta_against_first() {
        assert_eq!(delta(&[json!(10), json!(12.5), json!(7)]), json!([2.5, -3.0]));
        assert_eq!(delta(&[json!(10), json!("x")]), json!([null]));
        assert_eq!(delta(&[json!("x"), json!(3)]), json!([null]));
    }

    #[test]
    fn registry_lookup_and_override() {
        let mut registry = ComparatorRegistry::with_builtins();
        assert!(registry.get("equal").is_some());
        assert!(registry.get("nope").is_none());

        registry.register("equal", |_: &[Value]| json!("overridden"));
        let f = registry.get("equal").unwrap();
        assert_eq!(f(&[json!(1), json!(1)]), json!("overridden"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["delta", "equal"]);
    }
}
