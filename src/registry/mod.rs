//! Name → template mapping shared between the loader and the controller.
//!
//! Multiple-reader / single-writer discipline; locks are held only for
//! the duration of one atomic operation, never across an execution.

pub mod loader;

pub use loader::Loader;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::engine::{Engine, Outcome};
use crate::errors::{PoxideError, Result};
use crate::expr::Value;
use crate::template::{Info, Template};

/// Backend-polymorphic template wrapper, capped at the engine boundary.
///
/// YAML is the only backend today; a scripted variant would slot in as a
/// second arm without the registry or controller changing shape.
#[derive(Debug)]
pub enum TemplateHandle {
    Yaml(Template),
}

impl TemplateHandle {
    pub fn info(&self) -> &Info {
        match self {
            TemplateHandle::Yaml(template) => &template.info,
        }
    }

    pub async fn execute(
        &self,
        engine: &Engine,
        target: &str,
        options: &BTreeMap<String, Value>,
    ) -> Outcome {
        match self {
            TemplateHandle::Yaml(template) => engine.execute(template, target, options).await,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    pocs: RwLock<HashMap<String, Arc<TemplateHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under a name. Duplicate names are rejected.
    pub fn register(&self, name: impl Into<String>, handle: TemplateHandle) -> Result<()> {
        let name = name.into();
        let mut pocs = self.pocs.write().unwrap();
        if pocs.contains_key(&name) {
            return Err(PoxideError::Duplicate(name));
        }
        pocs.insert(name, Arc::new(handle));
        Ok(())
    }

    pub fn unregister(&self, name: &str) {
        self.pocs.write().unwrap().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<Arc<TemplateHandle>> {
        self.pocs.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pocs.read().unwrap().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pocs.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.pocs.read().unwrap().len()
    }

    pub fn clear(&self) {
        self.pocs.write().unwrap().clear();
    }

    /// Case-insensitive substring search over registry name, template
    /// name and description.
    pub fn search(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        let pocs = self.pocs.read().unwrap();
        let mut results: Vec<String> = pocs
            .iter()
            .filter(|(name, handle)| {
                let info = handle.info();
                name.to_lowercase().contains(&query)
                    || info.name.to_lowercase().contains(&query)
                    || info.description.to_lowercase().contains(&query)
            })
            .map(|(name, _)| name.clone())
            .collect();
        results.sort();
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parse;

    fn make_template(name: &str, description: &str) -> TemplateHandle {
        let yaml = format!(
            "info:\n  name: {name}\n  description: {description}\nrequests:\n  - method: GET\n    path: /\n"
        );
        TemplateHandle::Yaml(parse(&yaml).unwrap())
    }

    #[test]
    fn test_register_get_unregister() {
        let registry = Registry::new();
        registry
            .register("cve-2024-0001", make_template("Test POC", "d"))
            .unwrap();
        assert!(registry.get("cve-2024-0001").is_some());
        assert_eq!(registry.count(), 1);

        registry.unregister("cve-2024-0001");
        assert!(registry.get("cve-2024-0001").is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = Registry::new();
        registry.register("x", make_template("a", "")).unwrap();
        let err = registry.register("x", make_template("b", "")).unwrap_err();
        assert!(matches!(err, PoxideError::Duplicate(name) if name == "x"));
    }

    #[test]
    fn test_list_reflects_registrations() {
        let registry = Registry::new();
        registry.register("b", make_template("b", "")).unwrap();
        registry.register("a", make_template("a", "")).unwrap();
        assert_eq!(registry.list(), vec!["a".to_string(), "b".to_string()]);
        registry.unregister("a");
        assert_eq!(registry.list(), vec!["b".to_string()]);
    }

    #[test]
    fn test_search_matches_name_info_and_description() {
        let registry = Registry::new();
        registry
            .register("cve-2024-1234", make_template("Apache RCE", "remote code execution"))
            .unwrap();
        registry
            .register("weak-auth", make_template("Weak Auth", "default credentials"))
            .unwrap();

        assert_eq!(registry.search("APACHE"), vec!["cve-2024-1234".to_string()]);
        assert_eq!(registry.search("credentials"), vec!["weak-auth".to_string()]);
        assert_eq!(registry.search("2024-1234"), vec!["cve-2024-1234".to_string()]);
        assert!(registry.search("nothing").is_empty());
    }

    #[test]
    fn test_concurrent_readers() {
        let registry = Arc::new(Registry::new());
        registry.register("x", make_template("x", "")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    assert!(registry.get("x").is_some());
                    assert_eq!(registry.list().len(), 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
