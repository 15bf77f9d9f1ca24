//! Composite engine running several child engines one after another.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use super::{EngineCore, EngineSettings, ScriptingEngine, bound};
use crate::error::{Error, Result};

pub struct MultiEngine {
    core: EngineCore,
    engines: RwLock<Vec<Arc<dyn ScriptingEngine>>>,
}

impl MultiEngine {
    pub fn new(engines: Vec<Arc<dyn ScriptingEngine>>) -> Arc<Self> {
        bound(Arc::new(Self {
            core: EngineCore::new(EngineSettings::default()),
            engines: RwLock::new(engines),
        }))
    }

    pub fn engines(&self) -> Vec<Arc<dyn ScriptingEngine>> {
        self.engines.read().clone()
    }

    /// Append a child. It is not started until the composite reaches it.
    pub fn add_engine(&self, engine: Arc<dyn ScriptingEngine>) {
        self.engines.write().push(engine);
    }

    /// Stop and remove the first child with the given configuration.
    /// Returns `false` if there is none.
    pub async fn remove_engine(&self, configuration: &str) -> bool {
        let found = {
            let engines = self.engines.read();
            engines
                .iter()
                .find(|e| e.configuration() == configuration)
                .cloned()
        };
        let Some(engine) = found else {
            return false;
        };
        engine.stop_execution().await;
        self.engines
            .write()
            .retain(|e| !Arc::ptr_eq(e, &engine));
        info!(engine = configuration, "engine removed");
        true
    }

    /// The first child, in order, that is not in `done`, with its position.
    fn next_child(
        &self,
        done: &[Arc<dyn ScriptingEngine>],
    ) -> Option<(usize, Arc<dyn ScriptingEngine>)> {
        self.engines
            .read()
            .iter()
            .enumerate()
            .find(|(_, e)| !done.iter().any(|d| Arc::ptr_eq(d, *e)))
            .map(|(index, e)| (index, Arc::clone(e)))
    }
}

#[async_trait]
impl ScriptingEngine for MultiEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    fn configuration(&self) -> String {
        let children: Vec<String> = self
            .engines
            .read()
            .iter()
            .map(|e| format!("--engine \"{}\"", e.configuration()))
            .collect();
        if children.is_empty() {
            "multi".to_string()
        } else {
            format!("multi {}", children.join(" "))
        }
    }

    async fn execute(&self) -> Result<()> {
        self.core.start()?;
        let mut errors = Vec::new();
        // children are tracked by identity so removals do not skip any
        let mut done: Vec<Arc<dyn ScriptingEngine>> = Vec::new();
        while let Some((index, engine)) = self.next_child(&done) {
            if self.core.is_stopped() {
                break;
            }
            done.push(Arc::clone(&engine));
            if engine.is_stopped() {
                warn!(index, "skipping stopped child engine");
                continue;
            }
            info!(index, engine = %engine.configuration(), "executing child engine");
            if let Err(e) = engine.execute().await {
                error!(index, "child engine failed: {e}");
                errors.push(format!("engine #{index}: {e}"));
            }
        }
        self.core.stop();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Multiple(errors))
        }
    }

    fn pause_execution(&self) {
        for engine in self.engines() {
            engine.pause_execution();
        }
        self.core.pause();
    }

    fn resume_execution(&self) {
        for engine in self.engines() {
            engine.resume_execution();
        }
        self.core.resume();
    }

    async fn stop_execution(&self) {
        for engine in self.engines() {
            engine.stop_execution().await;
        }
        self.core.stop();
    }
}
