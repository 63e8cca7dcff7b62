use std::collections::BTreeMap;

use super::value::Value;

/// Named-value store threaded through a template's request chain.
///
/// Seeded with the target, caller options and template variables, then
/// updated after every request with the response fields and extractor
/// outputs so later requests can reference them.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn merge(&mut self, other: &BTreeMap<String, Value>) {
        for (k, v) in other {
            self.values.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_overwrite() {
        let mut env = Environment::new();
        env.set("target", Value::Str("http://a".into()));
        env.set("target", Value::Str("http://b".into()));
        assert_eq!(env.get("target"), Some(&Value::Str("http://b".into())));
        assert!(env.get("missing").is_none());
    }

    #[test]
    fn test_merge() {
        let mut env = Environment::new();
        let mut extra = BTreeMap::new();
        extra.insert("csrf".to_string(), Value::Str("tok".into()));
        env.merge(&extra);
        assert!(env.contains("csrf"));
    }
}
