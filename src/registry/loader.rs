use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::errors::{PoxideError, Result};
use crate::template;

use super::{Registry, TemplateHandle};

/// Ingests template files into the registry and tracks what it loaded so
/// the set can be unloaded again as a unit.
pub struct Loader {
    registry: Arc<Registry>,
    loaded: RwLock<HashSet<String>>,
}

impl Loader {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            loaded: RwLock::new(HashSet::new()),
        }
    }

    /// Parse and register one template file. The registry name is the
    /// file stem. Re-loading a name this loader already tracks is
    /// idempotent: the name comes back with a warning instead of an
    /// error.
    pub fn load_file(&self, path: &Path) -> Result<String> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PoxideError::Config(format!("cannot derive POC name from '{}'", path.display()))
            })?;

        if self.loaded.read().unwrap().contains(&name) {
            warn!(poc = %name, path = %path.display(), "POC already loaded, skipping");
            return Ok(name);
        }

        let parsed = template::parse_file(path)?;
        self.registry
            .register(name.clone(), TemplateHandle::Yaml(parsed))?;
        self.loaded.write().unwrap().insert(name.clone());
        info!(poc = %name, path = %path.display(), "Loaded POC template");
        Ok(name)
    }

    /// Walk a directory tree and load every `.yaml` / `.yml` file.
    /// Per-file failures are logged and skipped; the returned list is the
    /// successfully loaded subset.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<String>> {
        if !dir.is_dir() {
            return Err(PoxideError::Config(format!(
                "POC directory does not exist: {}",
                dir.display()
            )));
        }

        let mut names = Vec::new();
        for extension in ["yaml", "yml"] {
            let pattern = dir.join(format!("**/*.{extension}"));
            let pattern = pattern.to_string_lossy();
            let entries = glob::glob(&pattern)
                .map_err(|e| PoxideError::Config(format!("invalid glob pattern: {e}")))?;
            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable directory entry");
                        continue;
                    }
                };
                match self.load_file(&path) {
                    Ok(name) => names.push(name),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to load POC");
                    }
                }
            }
        }
        Ok(names)
    }

    /// Bulk variant of [`load_file`](Self::load_file) with the same
    /// warn-and-continue policy as [`load_dir`](Self::load_dir).
    pub fn load_files(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match self.load_file(path) {
                Ok(name) => names.push(name),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load POC");
                }
            }
        }
        Ok(names)
    }

    /// Remove a tracked template from the registry. Unknown names error
    /// so a double unload is visible to the caller.
    pub fn unload(&self, name: &str) -> Result<()> {
        if !self.loaded.write().unwrap().remove(name) {
            return Err(PoxideError::TemplateNotFound(name.to_string()));
        }
        self.registry.unregister(name);
        Ok(())
    }

    /// Unload everything this loader has tracked.
    pub fn clear(&self) {
        let names: Vec<String> = self.loaded.write().unwrap().drain().collect();
        for name in names {
            self.registry.unregister(&name);
        }
    }

    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.read().unwrap().iter().cloned().collect();
        names.sort();
        names
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().unwrap().contains(name)
    }

    pub fn count(&self) -> usize {
        self.loaded.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GOOD: &str = "info:\n  name: good-poc\nrequests:\n  - method: GET\n    path: /\n";

    fn make_loader() -> (Loader, Arc<Registry>, tempfile::TempDir) {
        let registry = Arc::new(Registry::new());
        let loader = Loader::new(Arc::clone(&registry));
        let dir = tempfile::tempdir().unwrap();
        (loader, registry, dir)
    }

    #[test]
    fn test_load_file_uses_stem_as_name() {
        let (loader, registry, dir) = make_loader();
        let path = dir.path().join("cve-2024-9999.yaml");
        fs::write(&path, GOOD).unwrap();

        let name = loader.load_file(&path).unwrap();
        assert_eq!(name, "cve-2024-9999");
        assert!(registry.get("cve-2024-9999").is_some());
        assert!(loader.is_loaded("cve-2024-9999"));
    }

    #[test]
    fn test_reload_is_idempotent() {
        let (loader, registry, dir) = make_loader();
        let path = dir.path().join("p.yaml");
        fs::write(&path, GOOD).unwrap();

        assert_eq!(loader.load_file(&path).unwrap(), "p");
        assert_eq!(loader.load_file(&path).unwrap(), "p");
        assert_eq!(registry.count(), 1);
        assert_eq!(loader.count(), 1);
    }

    #[test]
    fn test_unload_twice_errors() {
        let (loader, _registry, dir) = make_loader();
        let path = dir.path().join("p.yaml");
        fs::write(&path, GOOD).unwrap();
        loader.load_file(&path).unwrap();

        loader.unload("p").unwrap();
        let err = loader.unload("p").unwrap_err();
        assert!(matches!(err, PoxideError::TemplateNotFound(name) if name == "p"));
    }

    #[test]
    fn test_load_dir_skips_malformed() {
        let (loader, registry, dir) = make_loader();
        fs::write(dir.path().join("good.yaml"), GOOD).unwrap();
        fs::write(dir.path().join("bad.yaml"), "requests: []\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "not yaml").unwrap();

        let names = loader.load_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["good".to_string()]);
        assert!(registry.get("good").is_some());
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn test_load_dir_recurses() {
        let (loader, _registry, dir) = make_loader();
        let nested = dir.path().join("web/apache");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.yml"), GOOD).unwrap();

        let names = loader.load_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["deep".to_string()]);
    }

    #[test]
    fn test_load_missing_dir_errors() {
        let (loader, _registry, dir) = make_loader();
        let missing = dir.path().join("nope");
        assert!(loader.load_dir(&missing).is_err());
    }

    #[test]
    fn test_clear_unloads_everything() {
        let (loader, registry, dir) = make_loader();
        fs::write(dir.path().join("a.yaml"), GOOD).unwrap();
        fs::write(dir.path().join("b.yaml"), GOOD).unwrap();
        loader.load_dir(dir.path()).unwrap();
        assert_eq!(registry.count(), 2);

        loader.clear();
        assert_eq!(registry.count(), 0);
        assert_eq!(loader.count(), 0);
    }
}
