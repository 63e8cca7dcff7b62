//! Top-level orchestration: resolves templates, injects OAST variables,
//! runs the engine and fans results out to sinks.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, warn};

use crate::engine::Engine;
use crate::errors::{PoxideError, Result};
use crate::expr::Value;
use crate::output::{Output, ResultSink};
use crate::providers::{OASTProvider, TargetEnumerator};
use crate::registry::{Loader, Registry, TemplateHandle};

/// Execution intent. `verify` and `attack` run the same chain for a YAML
/// template; sinks can tell them apart by the evidence label. `shell` is
/// rejected for YAML templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Verify,
    Attack,
    Shell,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Verify => "verify",
            Mode::Attack => "attack",
            Mode::Shell => "shell",
        }
    }
}

impl FromStr for Mode {
    type Err = PoxideError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "verify" => Ok(Mode::Verify),
            "attack" => Ok(Mode::Attack),
            "shell" => Ok(Mode::Shell),
            other => Err(PoxideError::ModeUnsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Controller {
    registry: Arc<Registry>,
    loader: Arc<Loader>,
    engine: Engine,
    results: Mutex<Vec<Output>>,
    options: RwLock<BTreeMap<String, Value>>,
    sinks: Vec<Box<dyn ResultSink>>,
    enumerators: HashMap<String, Arc<dyn TargetEnumerator>>,
    oast: Option<Arc<dyn OASTProvider>>,
    shutting_down: AtomicBool,
}

impl Controller {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        let loader = Arc::new(Loader::new(Arc::clone(&registry)));
        Self {
            registry,
            loader,
            engine: Engine::new(),
            results: Mutex::new(Vec::new()),
            options: RwLock::new(BTreeMap::new()),
            sinks: Vec::new(),
            enumerators: HashMap::new(),
            oast: None,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_enumerator(mut self, enumerator: Arc<dyn TargetEnumerator>) -> Self {
        self.enumerators
            .insert(enumerator.name().to_string(), enumerator);
        self
    }

    pub fn with_oast(mut self, oast: Arc<dyn OASTProvider>) -> Self {
        self.oast = Some(oast);
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn loader(&self) -> Arc<Loader> {
        Arc::clone(&self.loader)
    }

    /// Bring every sink up. Sink failures are logged, not fatal.
    pub fn initialize(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.init().and_then(|_| sink.start()) {
                warn!(sink = sink.name(), error = %e, "Result sink failed to start");
            }
        }
    }

    pub fn load_poc(&self, path: &std::path::Path) -> Result<String> {
        self.loader.load_file(path)
    }

    pub fn load_pocs_from_dir(&self, dir: &std::path::Path) -> Result<Vec<String>> {
        self.loader.load_dir(dir)
    }

    pub fn unload_poc(&self, name: &str) -> Result<()> {
        self.loader.unload(name)
    }

    pub fn clear_pocs(&self) {
        self.loader.clear();
    }

    pub fn loaded_pocs(&self) -> Vec<String> {
        self.loader.loaded()
    }

    pub fn poc_count(&self) -> usize {
        self.loader.count()
    }

    pub fn set_option(&self, key: impl Into<String>, value: Value) {
        self.options.write().unwrap().insert(key.into(), value);
    }

    pub fn get_option(&self, key: &str) -> Option<Value> {
        self.options.read().unwrap().get(key).cloned()
    }

    /// Execute a loaded POC against one target.
    ///
    /// The current option map is snapshotted before the chain starts, so
    /// concurrent `set_option` calls never tear a running execution.
    pub async fn execute_poc(&self, name: &str, target: &str, mode: Mode) -> Result<Output> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(PoxideError::ShuttingDown);
        }

        let handle = self
            .registry
            .get(name)
            .ok_or_else(|| PoxideError::TemplateNotFound(name.to_string()))?;

        let mut options = self.options.read().unwrap().clone();
        self.inject_oast(&mut options);

        info!(poc = %name, target = %target, mode = %mode, "Executing POC");

        let output = match mode {
            Mode::Verify => {
                self.run(&handle, target, &options, "VerifyInfo", "target is not vulnerable")
                    .await
            }
            Mode::Attack => {
                self.run(&handle, target, &options, "AttackInfo", "attack failed")
                    .await
            }
            Mode::Shell => {
                Output::failure(PoxideError::ModeUnsupported("shell".to_string()).to_string())
            }
        };

        self.results.lock().unwrap().push(output.clone());
        self.notify_sinks(&output);

        Ok(output)
    }

    async fn run(
        &self,
        handle: &TemplateHandle,
        target: &str,
        options: &BTreeMap<String, Value>,
        label: &str,
        negative_message: &str,
    ) -> Output {
        let outcome = handle.execute(&self.engine, target, options).await;

        if outcome.matched {
            let mut evidence = BTreeMap::new();
            evidence.insert("URL".to_string(), Value::Str(target.to_string()));
            evidence.insert("Matched".to_string(), Value::Bool(true));
            evidence.insert("Extracted".to_string(), Value::Map(outcome.extracted));

            let mut data = BTreeMap::new();
            data.insert(label.to_string(), Value::Map(evidence));
            Output::success(data)
        } else if let Some(error) = outcome.last_error {
            Output::failure(format!("POC execution failed: {error}"))
        } else {
            Output::failure(negative_message)
        }
    }

    fn inject_oast(&self, options: &mut BTreeMap<String, Value>) {
        let Some(oast) = &self.oast else {
            return;
        };
        if !oast.is_available() {
            return;
        }
        let domain = oast.get_domain();
        if !domain.is_empty() {
            options.insert("oast_domain".to_string(), Value::Str(domain));
        }
        let url = oast.get_url();
        if !url.is_empty() {
            options.insert("oast_url".to_string(), Value::Str(url));
        }
    }

    fn notify_sinks(&self, output: &Output) {
        for sink in &self.sinks {
            if let Err(e) = sink.handle(output) {
                warn!(sink = sink.name(), error = %e, "Result sink failed");
            }
        }
    }

    /// Delegate a dork query to a registered search provider.
    pub async fn search_targets(&self, provider: &str, dork: &str) -> Result<Vec<String>> {
        let enumerator = self
            .enumerators
            .get(provider)
            .ok_or_else(|| PoxideError::ProviderNotFound(provider.to_string()))?;
        if !enumerator.is_available() {
            return Err(PoxideError::ProviderUnavailable(provider.to_string()));
        }
        enumerator.search(dork, 1, "host").await
    }

    /// Poll the OAST side channel, if one is configured and reachable.
    pub async fn check_oast_interaction(&self) -> bool {
        match &self.oast {
            Some(oast) if oast.is_available() => oast.check_interaction().await,
            _ => false,
        }
    }

    pub fn get_results(&self) -> Vec<Output> {
        self.results.lock().unwrap().clone()
    }

    pub fn clear_results(&self) {
        self.results.lock().unwrap().clear();
    }

    /// Refuse new executions, stop every sink and drop collected results.
    /// In-flight executions are left to finish.
    pub fn shutdown(&self) -> Result<()> {
        self.shutting_down.store(true, Ordering::SeqCst);
        for sink in &self.sinks {
            if let Err(e) = sink.stop() {
                warn!(sink = sink.name(), error = %e, "Result sink failed to stop");
            }
        }
        self.clear_results();
        Ok(())
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
