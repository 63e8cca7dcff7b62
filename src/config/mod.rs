//! Persisted key-value configuration, organized in named sections
//! (provider credentials, proxy settings, sink paths).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::errors::{PoxideError, Result};

/// Abstract sectioned key-value store consumed by CLI callers and search
/// providers.
pub trait ConfigStore: Send + Sync {
    fn get(&self, section: &str, key: &str) -> Option<String>;

    fn set(&self, section: &str, key: &str, value: &str) -> Result<()>;

    fn delete(&self, section: &str, key: &str) -> Result<()>;
}

type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// YAML-backed store; every mutation persists immediately.
pub struct YamlConfigStore {
    path: PathBuf,
    sections: RwLock<Sections>,
}

impl YamlConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let sections = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&text)
                .map_err(|e| PoxideError::Config(format!("{}: {e}", path.display())))?
        } else {
            Sections::new()
        };

        Ok(Self {
            path,
            sections: RwLock::new(sections),
        })
    }

    /// `~/.poxide.yaml`, falling back to the working directory when no
    /// home is set.
    pub fn default_path() -> PathBuf {
        match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(".poxide.yaml"),
            None => PathBuf::from(".poxide.yaml"),
        }
    }

    pub fn get_section(&self, section: &str) -> Option<BTreeMap<String, String>> {
        self.sections.read().unwrap().get(section).cloned()
    }

    fn save(&self, sections: &Sections) -> Result<()> {
        let text = serde_yaml::to_string(sections)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl ConfigStore for YamlConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections
            .read()
            .unwrap()
            .get(section)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut sections = self.sections.write().unwrap();
        sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save(&sections)
    }

    fn delete(&self, section: &str, key: &str) -> Result<()> {
        let mut sections = self.sections.write().unwrap();
        if let Some(entries) = sections.get_mut(section) {
            entries.remove(key);
            return self.save(&sections);
        }
        Ok(())
    }
}
