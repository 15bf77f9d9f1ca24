//! Wrapping an engine to add behaviour around its lifecycle.
//!
//! An [`Enhancer`] owns a base engine and an [`Enhancement`]. It shares the
//! base engine's core, so pausing or stopping either one is the same thing.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::command_handler::CommandHandler;
use super::{EngineCore, ScriptingEngine, bound};
use crate::error::Result;

/// Behaviour an [`Enhancer`] adds to its base engine.
#[async_trait]
pub trait Enhancement: Send + Sync + 'static {
    /// Short name, used as the head of the configuration string.
    fn name(&self) -> String;

    /// Handler to install into the base engine before it runs.
    fn command_handler(&self) -> Option<Arc<dyn CommandHandler>> {
        None
    }

    /// Runs before the base engine starts. An error aborts startup.
    async fn pre_execute(&self, _base: &dyn ScriptingEngine) -> Result<()> {
        Ok(())
    }

    /// Runs before the base engine is stopped. Cannot prevent the stop.
    async fn pre_stop(&self, _base: &dyn ScriptingEngine) {}
}

pub struct Enhancer<E: Enhancement> {
    base: Arc<dyn ScriptingEngine>,
    enhancement: E,
}

impl<E: Enhancement> Enhancer<E> {
    pub fn new(base: Arc<dyn ScriptingEngine>, enhancement: E) -> Arc<Self> {
        bound(Arc::new(Self { base, enhancement }))
    }

    pub fn base(&self) -> &Arc<dyn ScriptingEngine> {
        &self.base
    }

    pub fn enhancement(&self) -> &E {
        &self.enhancement
    }
}

#[async_trait]
impl<E: Enhancement> ScriptingEngine for Enhancer<E> {
    fn core(&self) -> &EngineCore {
        self.base.core()
    }

    fn configuration(&self) -> String {
        format!(
            "{} --base \"{}\"",
            self.enhancement.name(),
            self.base.configuration()
        )
    }

    async fn execute(&self) -> Result<()> {
        if let Some(handler) = self.enhancement.command_handler() {
            debug!(enhancer = %self.enhancement.name(), "installing command handler");
            self.base.core().set_command_handler(handler);
        }
        self.enhancement.pre_execute(self.base.as_ref()).await?;
        self.base.execute().await
    }

    fn pause_execution(&self) {
        self.base.pause_execution();
    }

    fn resume_execution(&self) {
        self.base.resume_execution();
    }

    async fn stop_execution(&self) {
        self.enhancement.pre_stop(self.base.as_ref()).await;
        self.base.stop_execution().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::manual_feed::ManualFeedEngine;
    use crate::engine::{EngineSettings, EngineState};
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
        refuse: bool,
    }

    #[async_trait]
    impl Enhancement for Counting {
        fn name(&self) -> String {
            "counting".to_string()
        }

        async fn pre_execute(&self, _base: &dyn ScriptingEngine) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(Error::Handler("refused".to_string()));
            }
            Ok(())
        }

        async fn pre_stop(&self, _base: &dyn ScriptingEngine) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn configuration_wraps_base() {
        let base = ManualFeedEngine::new(EngineSettings::default());
        let engine = Enhancer::new(base, Counting::default());
        assert_eq!(
            engine.configuration(),
            "counting --base \"manual-feed --max-commands 100 --max-concurrent-jobs 1\""
        );
    }

    #[tokio::test]
    async fn failed_pre_execute_keeps_base_idle() {
        let base = ManualFeedEngine::new(EngineSettings::default());
        let engine = Enhancer::new(
            base.clone(),
            Counting {
                refuse: true,
                ..Counting::default()
            },
        );
        let err = engine.execute().await.unwrap_err();
        assert_eq!(err.to_string(), "refused");
        assert_eq!(base.state(), EngineState::Created);
    }

    #[tokio::test]
    async fn lifecycle_is_shared_with_base() {
        let base = ManualFeedEngine::new(EngineSettings::default());
        let counting = Counting::default();
        let started = Arc::clone(&counting.started);
        let stopped = Arc::clone(&counting.stopped);
        let engine = Enhancer::new(base.clone(), counting);

        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.execute().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        engine.pause_execution();
        assert!(base.is_paused());
        engine.resume_execution();
        assert!(!base.is_paused());

        engine.stop_execution().await;
        runner.await.unwrap().unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(base.is_stopped());
    }

    #[tokio::test]
    async fn enhancer_owns_the_shared_core() {
        let base = ManualFeedEngine::new(EngineSettings::default());
        let engine = Enhancer::new(base.clone(), Counting::default());
        let owner = base.core().engine().unwrap();
        assert_eq!(owner.configuration(), engine.configuration());
    }
}
