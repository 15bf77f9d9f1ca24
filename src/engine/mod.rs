//! Scripting engines: runtimes that accept remote commands and drive them
//! through permission checks and handlers.
//!
//! Every engine owns (or, for enhancers, borrows from its base) an
//! [`EngineCore`] holding the lifecycle flags, the handler policies, and the
//! job pool. Lifecycle is `Created -> Running <-> Paused -> Stopped`, and
//! `Stopped` is terminal.

pub mod command_handler;
pub mod enhancer;
pub mod file_polling;
pub mod forwarding;
pub mod manual_feed;
pub mod multi;
pub mod socket;
pub mod topology;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::{ApplicationContext, FlowContext, RemoteCommand};
use crate::consts::{DEFAULT_MAX_CONCURRENT_JOBS, NOT_PERMITTED};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::job::{Job, JobPool};
use crate::policy::{
    AllowAll, LoggingHandler, PermissionHandler, RequestHandler, ResponseHandler,
};

use command_handler::{CommandHandler, DefaultCommandHandler};

/// The outermost boundary. main.rs only knows this trait.
/// Enhancers wrap around it.
#[async_trait]
pub trait ScriptingEngine: Send + Sync {
    fn core(&self) -> &EngineCore;

    /// Canonical description of how this engine is configured. Two engines
    /// with equal configuration strings are considered the same engine.
    fn configuration(&self) -> String;

    /// Run the accept loop until the engine is stopped.
    async fn execute(&self) -> Result<()>;

    fn pause_execution(&self) {
        self.core().pause();
    }

    fn resume_execution(&self) {
        self.core().resume();
    }

    async fn stop_execution(&self) {
        self.core().stop();
    }

    fn is_paused(&self) -> bool {
        self.core().is_paused()
    }

    fn is_stopped(&self) -> bool {
        self.core().is_stopped()
    }

    fn state(&self) -> EngineState {
        self.core().state()
    }

    /// Hand a job to the worker pool, waiting while it is saturated.
    async fn queue_job(&self, job: Job) -> Result<()> {
        self.core().queue_job(job).await
    }
}

/// Where an engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    running: bool,
    paused: bool,
    stopped: bool,
}

impl Flags {
    fn state(self) -> EngineState {
        if self.stopped {
            EngineState::Stopped
        } else if self.paused {
            EngineState::Paused
        } else if self.running {
            EngineState::Running
        } else {
            EngineState::Created
        }
    }
}

/// Handlers and limits an engine starts with.
#[derive(Clone)]
pub struct EngineSettings {
    pub permission_handler: Arc<dyn PermissionHandler>,
    pub request_handler: Arc<dyn RequestHandler>,
    pub response_handler: Arc<dyn ResponseHandler>,
    pub max_concurrent_jobs: usize,
    pub application_context: Option<Arc<dyn ApplicationContext>>,
    pub flow_context: Option<Arc<dyn FlowContext>>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            permission_handler: Arc::new(AllowAll),
            request_handler: Arc::new(LoggingHandler),
            response_handler: Arc::new(LoggingHandler),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            application_context: None,
            flow_context: None,
        }
    }
}

/// State shared by every engine: lifecycle flags, handler policies, the
/// command handler slot, and the job pool.
pub struct EngineCore {
    flags: watch::Sender<Flags>,
    permission_handler: RwLock<Arc<dyn PermissionHandler>>,
    request_handler: RwLock<Arc<dyn RequestHandler>>,
    response_handler: RwLock<Arc<dyn ResponseHandler>>,
    application_context: RwLock<Option<Arc<dyn ApplicationContext>>>,
    flow_context: RwLock<Option<Arc<dyn FlowContext>>>,
    default_handler: Arc<DefaultCommandHandler>,
    command_handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    max_concurrent_jobs: AtomicUsize,
    pool: Mutex<Option<JobPool>>,
    engine: RwLock<Option<Weak<dyn ScriptingEngine>>>,
    events: EventBus,
}

impl EngineCore {
    pub fn new(settings: EngineSettings) -> Self {
        let (flags, _) = watch::channel(Flags::default());
        Self {
            flags,
            permission_handler: RwLock::new(settings.permission_handler),
            request_handler: RwLock::new(settings.request_handler),
            response_handler: RwLock::new(settings.response_handler),
            application_context: RwLock::new(settings.application_context),
            flow_context: RwLock::new(settings.flow_context),
            default_handler: Arc::new(DefaultCommandHandler::new()),
            command_handler: RwLock::new(None),
            max_concurrent_jobs: AtomicUsize::new(settings.max_concurrent_jobs.max(1)),
            pool: Mutex::new(None),
            engine: RwLock::new(None),
            events: EventBus::default(),
        }
    }

    /// Record the engine that owns this core. Command handlers installed in
    /// the core get it as their owner. An enhancer binds after its base, so
    /// the outermost engine ends up owning the core.
    pub fn bind(&self, engine: Weak<dyn ScriptingEngine>) {
        *self.engine.write() = Some(engine.clone());
        self.default_handler.set_owner(engine.clone());
        if let Some(handler) = self.command_handler.read().as_ref() {
            handler.set_owner(engine);
        }
    }

    /// The owning engine, if it is bound and still alive.
    pub fn engine(&self) -> Option<Arc<dyn ScriptingEngine>> {
        self.engine.read().as_ref().and_then(Weak::upgrade)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- lifecycle ---

    pub fn state(&self) -> EngineState {
        self.flags.borrow().state()
    }

    pub fn is_paused(&self) -> bool {
        let flags = *self.flags.borrow();
        flags.paused && !flags.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.borrow().stopped
    }

    /// Enter the running state. Fails once the engine has been stopped.
    pub fn start(&self) -> Result<()> {
        let mut stopped = false;
        let changed = self.flags.send_if_modified(|flags| {
            if flags.stopped {
                stopped = true;
                return false;
            }
            let changed = !flags.running;
            flags.running = true;
            changed
        });
        if stopped {
            return Err(Error::Stopped);
        }
        if changed {
            self.announce();
        }
        Ok(())
    }

    pub fn pause(&self) {
        let changed = self.flags.send_if_modified(|flags| {
            if flags.stopped || flags.paused {
                return false;
            }
            flags.paused = true;
            true
        });
        if changed {
            info!("engine paused");
            self.announce();
        }
    }

    pub fn resume(&self) {
        let changed = self.flags.send_if_modified(|flags| {
            if flags.stopped || !flags.paused {
                return false;
            }
            flags.paused = false;
            true
        });
        if changed {
            info!("engine resumed");
            self.announce();
        }
    }

    /// Stop for good: clears the pause flag and drops queued jobs.
    /// Running jobs finish on their own.
    pub fn stop(&self) {
        let changed = self.flags.send_if_modified(|flags| {
            if flags.stopped {
                return false;
            }
            flags.stopped = true;
            flags.paused = false;
            flags.running = false;
            true
        });
        if let Some(pool) = self.pool.lock().take() {
            pool.cancel();
        }
        if changed {
            info!("engine stopped");
            self.announce();
        }
    }

    fn announce(&self) {
        self.events.emit(Event::StateChanged {
            state: self.state(),
        });
    }

    /// Wait until the engine is not paused. Returns `false` if it was
    /// stopped instead.
    pub async fn wait_while_paused(&self) -> bool {
        let mut rx = self.flags.subscribe();
        rx.wait_for(|flags| !flags.paused || flags.stopped)
            .await
            .map(|flags| !flags.stopped)
            .unwrap_or(false)
    }

    /// Resolves once the engine is stopped.
    pub async fn wait_stopped(&self) {
        let mut rx = self.flags.subscribe();
        let _ = rx.wait_for(|flags| flags.stopped).await;
    }

    // --- permission gate ---

    /// Apply the permission handler. A rejected command is reported to the
    /// request handler exactly once and must not be processed further.
    pub fn admit(&self, command: &dyn RemoteCommand) -> bool {
        if self.permission_handler().permitted(command) {
            return true;
        }
        warn!(command = command.name(), "command not permitted");
        self.request_handler().request_rejected(command, NOT_PERMITTED);
        false
    }

    // --- handlers ---

    pub fn permission_handler(&self) -> Arc<dyn PermissionHandler> {
        self.permission_handler.read().clone()
    }

    pub fn set_permission_handler(&self, handler: Arc<dyn PermissionHandler>) {
        *self.permission_handler.write() = handler;
    }

    pub fn request_handler(&self) -> Arc<dyn RequestHandler> {
        self.request_handler.read().clone()
    }

    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.request_handler.write() = handler;
    }

    pub fn response_handler(&self) -> Arc<dyn ResponseHandler> {
        self.response_handler.read().clone()
    }

    pub fn set_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        *self.response_handler.write() = handler;
    }

    pub fn application_context(&self) -> Option<Arc<dyn ApplicationContext>> {
        self.application_context.read().clone()
    }

    pub fn set_application_context(&self, context: Option<Arc<dyn ApplicationContext>>) {
        *self.application_context.write() = context;
    }

    pub fn flow_context(&self) -> Option<Arc<dyn FlowContext>> {
        self.flow_context.read().clone()
    }

    pub fn set_flow_context(&self, context: Option<Arc<dyn FlowContext>>) {
        *self.flow_context.write() = context;
    }

    /// The installed command handler, or the generic one.
    pub fn command_handler(&self) -> Arc<dyn CommandHandler> {
        match self.command_handler.read().as_ref() {
            Some(handler) => Arc::clone(handler),
            None => Arc::clone(&self.default_handler) as Arc<dyn CommandHandler>,
        }
    }

    /// Only a handler installed with [`set_command_handler`](Self::set_command_handler).
    pub fn installed_command_handler(&self) -> Option<Arc<dyn CommandHandler>> {
        self.command_handler.read().clone()
    }

    pub fn set_command_handler(&self, handler: Arc<dyn CommandHandler>) {
        if let Some(engine) = self.engine.read().as_ref() {
            handler.set_owner(engine.clone());
        }
        *self.command_handler.write() = Some(handler);
    }

    // --- job queue ---

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs.load(Ordering::Acquire)
    }

    /// Change the pool size. The current pool finishes its queue in the
    /// background and a new one is built on next use.
    pub fn set_max_concurrent_jobs(&self, max: usize) -> Result<()> {
        if max < 1 {
            return Err(Error::Config(format!(
                "max concurrent jobs must be at least 1, got {max}"
            )));
        }
        self.max_concurrent_jobs.store(max, Ordering::Release);
        if let Some(pool) = self.pool.lock().take() {
            debug!(old = pool.size(), new = max, "rebuilding job pool");
            pool.close();
        }
        Ok(())
    }

    /// Make sure a pool exists.
    pub fn start_pool(&self) {
        let mut pool = self.pool.lock();
        if pool.is_none() && !self.is_stopped() {
            *pool = Some(JobPool::new(self.max_concurrent_jobs()));
        }
    }

    pub async fn queue_job(&self, job: Job) -> Result<()> {
        let sender = {
            let mut pool = self.pool.lock();
            if self.is_stopped() {
                return Err(Error::Stopped);
            }
            pool.get_or_insert_with(|| JobPool::new(self.max_concurrent_jobs()))
                .sender()
        };
        sender.send(job).await.map_err(|_| Error::Stopped)
    }

    /// Run every queued job to completion and wait for the workers.
    pub async fn shutdown_pool(&self) {
        let pool = self.pool.lock().take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }

    /// Set the application context on a command, plus the flow context for
    /// flow-aware commands when one is configured.
    pub fn inject_contexts(&self, command: &mut dyn RemoteCommand) {
        command.set_application_context(self.application_context());
        if let Some(flow) = self.flow_context()
            && let Some(aware) = command.flow_aware()
        {
            aware.set_flow_context(flow);
        }
    }
}

/// Bind a freshly built engine into its own core.
pub(crate) fn bound<E: ScriptingEngine + 'static>(engine: Arc<E>) -> Arc<E> {
    let weak: Weak<dyn ScriptingEngine> = Arc::downgrade(&engine) as Weak<dyn ScriptingEngine>;
    engine.core().bind(weak);
    engine
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::mock::{MockCommand, Probe};
    use crate::policy::DenyAll;
    use crate::policy::mock::{Outcome, RecordingHandler};
    use std::time::Duration;

    #[test]
    fn new_core_is_created() {
        let core = EngineCore::default();
        assert_eq!(core.state(), EngineState::Created);
        assert!(!core.is_paused());
        assert!(!core.is_stopped());
    }

    #[test]
    fn start_pause_resume_stop() {
        let core = EngineCore::default();
        core.start().unwrap();
        assert_eq!(core.state(), EngineState::Running);
        core.pause();
        assert_eq!(core.state(), EngineState::Paused);
        core.resume();
        assert_eq!(core.state(), EngineState::Running);
        core.pause();
        core.stop();
        assert_eq!(core.state(), EngineState::Stopped);
        assert!(!core.is_paused());
    }

    #[test]
    fn stopped_is_terminal() {
        let core = EngineCore::default();
        core.stop();
        assert!(matches!(core.start(), Err(Error::Stopped)));
        core.pause();
        assert!(!core.is_paused());
        core.resume();
        assert_eq!(core.state(), EngineState::Stopped);
    }

    #[test]
    fn max_concurrent_jobs_is_validated() {
        let core = EngineCore::default();
        assert!(core.set_max_concurrent_jobs(0).is_err());
        core.set_max_concurrent_jobs(4).unwrap();
        assert_eq!(core.max_concurrent_jobs(), 4);
    }

    #[test]
    fn settings_clamp_max_jobs() {
        let core = EngineCore::new(EngineSettings {
            max_concurrent_jobs: 0,
            ..EngineSettings::default()
        });
        assert_eq!(core.max_concurrent_jobs(), 1);
    }

    #[test]
    fn admit_rejects_exactly_once() {
        let recorder = Arc::new(RecordingHandler::new());
        let core = EngineCore::new(EngineSettings {
            permission_handler: Arc::new(DenyAll),
            request_handler: recorder.clone(),
            ..EngineSettings::default()
        });
        let probe = Probe::new();
        let command = MockCommand::request("denied", &probe);

        assert!(!core.admit(&command));
        assert_eq!(
            recorder.outcomes(),
            vec![Outcome::RequestRejected(
                "denied".to_string(),
                NOT_PERMITTED.to_string()
            )]
        );
        assert_eq!(probe.requests(), 0);
    }

    #[tokio::test]
    async fn wait_while_paused_returns_on_resume() {
        let core = Arc::new(EngineCore::default());
        core.start().unwrap();
        core.pause();

        let waiter = {
            let core = Arc::clone(&core);
            tokio::spawn(async move { core.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        core.resume();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_while_paused_returns_false_on_stop() {
        let core = Arc::new(EngineCore::default());
        core.pause();
        let waiter = {
            let core = Arc::clone(&core);
            tokio::spawn(async move { core.wait_while_paused().await })
        };
        core.stop();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn queue_job_after_stop_fails() {
        let core = EngineCore::default();
        core.stop();
        let result = core.queue_job(Job::new("late", async { Ok(()) })).await;
        assert!(matches!(result, Err(Error::Stopped)));
    }

    #[tokio::test]
    async fn state_changes_are_announced() {
        let core = EngineCore::default();
        let mut rx = core.events().subscribe();
        core.start().unwrap();
        core.stop();
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::StateChanged {
                state: EngineState::Running
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Event::StateChanged {
                state: EngineState::Stopped
            }
        );
    }
}
