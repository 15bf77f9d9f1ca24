//! In-process producer/consumer engine. Any caller holding the engine can
//! feed it commands with [`ManualFeedEngine::add_command`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, error, info, warn};

use super::{EngineCore, EngineSettings, ScriptingEngine, bound};
use crate::command::RemoteCommand;
use crate::consts::{DEFAULT_MAX_COMMANDS, QUEUE_POLL_TIMEOUT};
use crate::error::{Error, Result};

type Receiver = Arc<AsyncMutex<mpsc::Receiver<Box<dyn RemoteCommand>>>>;

struct CommandQueue {
    capacity: usize,
    sender: mpsc::Sender<Box<dyn RemoteCommand>>,
    receiver: Receiver,
}

impl CommandQueue {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            capacity,
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
        }
    }

    fn buffered(&self) -> usize {
        self.capacity - self.sender.capacity()
    }
}

pub struct ManualFeedEngine {
    core: EngineCore,
    queue: Mutex<CommandQueue>,
}

impl ManualFeedEngine {
    pub fn new(settings: EngineSettings) -> Arc<Self> {
        bound(Arc::new(Self {
            core: EngineCore::new(settings),
            queue: Mutex::new(CommandQueue::new(DEFAULT_MAX_COMMANDS)),
        }))
    }

    /// An engine whose queue holds at most `max_commands` commands.
    pub fn with_max_commands(settings: EngineSettings, max_commands: usize) -> Result<Arc<Self>> {
        let engine = Self::new(settings);
        engine.set_max_commands(max_commands)?;
        Ok(engine)
    }

    pub fn max_commands(&self) -> usize {
        self.queue.lock().capacity
    }

    /// Replace the queue with one of the new capacity. Commands still
    /// buffered in the old queue are lost.
    pub fn set_max_commands(&self, max_commands: usize) -> Result<()> {
        if max_commands < 1 {
            return Err(Error::Config(format!(
                "max commands must be at least 1, got {max_commands}"
            )));
        }
        let mut queue = self.queue.lock();
        let lost = queue.buffered();
        if lost > 0 {
            warn!(lost, "discarding buffered commands on queue resize");
        }
        if lost == queue.capacity {
            warn!("producers waiting on the full queue will fail");
        }
        *queue = CommandQueue::new(max_commands);
        Ok(())
    }

    /// Number of commands waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.queue.lock().buffered()
    }

    /// Queue a command for the engine loop, waiting while the queue is full.
    /// Fails with [`Error::QueueReplaced`] if the queue is resized while
    /// waiting.
    pub async fn add_command(&self, command: Box<dyn RemoteCommand>) -> Result<()> {
        if self.core.is_stopped() {
            return Err(Error::Stopped);
        }
        let sender = self.queue.lock().sender.clone();
        sender.send(command).await.map_err(|_| {
            if self.core.is_stopped() {
                Error::Stopped
            } else {
                Error::QueueReplaced
            }
        })
    }

    async fn next_command(&self) -> Option<Box<dyn RemoteCommand>> {
        let receiver = Arc::clone(&self.queue.lock().receiver);
        let mut receiver = receiver.lock().await;
        tokio::time::timeout(QUEUE_POLL_TIMEOUT, receiver.recv())
            .await
            .ok()
            .flatten()
    }

    async fn process(&self, command: Box<dyn RemoteCommand>) {
        if !self.core.admit(command.as_ref()) {
            return;
        }
        let name = command.name().to_string();
        debug!(command = %name, "handling queued command");
        if let Err(e) = self.core.command_handler().handle(command).await {
            error!(command = %name, "failed to handle command: {e}");
        }
    }
}

#[async_trait]
impl ScriptingEngine for ManualFeedEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    fn configuration(&self) -> String {
        format!(
            "manual-feed --max-commands {} --max-concurrent-jobs {}",
            self.max_commands(),
            self.core.max_concurrent_jobs()
        )
    }

    async fn execute(&self) -> Result<()> {
        self.core.start()?;
        info!(max_commands = self.max_commands(), "manual feed engine running");

        loop {
            if !self.core.wait_while_paused().await {
                break;
            }
            let next = tokio::select! {
                _ = self.core.wait_stopped() => break,
                next = self.next_command() => next,
            };
            if let Some(command) = next {
                self.process(command).await;
            }
        }

        info!("manual feed engine finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::mock::{MockCommand, Probe};

    #[test]
    fn default_capacity() {
        let engine = ManualFeedEngine::new(EngineSettings::default());
        assert_eq!(engine.max_commands(), DEFAULT_MAX_COMMANDS);
        assert_eq!(
            engine.configuration(),
            "manual-feed --max-commands 100 --max-concurrent-jobs 1"
        );
    }

    #[test]
    fn max_commands_is_validated() {
        assert!(ManualFeedEngine::with_max_commands(EngineSettings::default(), 0).is_err());
    }

    #[tokio::test]
    async fn resize_discards_buffered_commands() {
        let engine = ManualFeedEngine::new(EngineSettings::default());
        let probe = Probe::new();
        engine
            .add_command(Box::new(MockCommand::request("lost", &probe)))
            .await
            .unwrap();
        assert_eq!(engine.pending(), 1);

        engine.set_max_commands(5).unwrap();
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.max_commands(), 5);
    }

    #[tokio::test]
    async fn resize_fails_waiting_producer() {
        let engine = ManualFeedEngine::with_max_commands(EngineSettings::default(), 1).unwrap();
        let probe = Probe::new();
        engine
            .add_command(Box::new(MockCommand::request("first", &probe)))
            .await
            .unwrap();

        let waiting = {
            let engine = Arc::clone(&engine);
            let probe = Arc::clone(&probe);
            tokio::spawn(async move {
                engine
                    .add_command(Box::new(MockCommand::request("second", &probe)))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        engine.set_max_commands(4).unwrap();
        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(Error::QueueReplaced)));
        assert!(!engine.is_stopped());
    }

    #[tokio::test]
    async fn add_after_stop_fails() {
        let engine = ManualFeedEngine::new(EngineSettings::default());
        engine.stop_execution().await;
        let probe = Probe::new();
        let result = engine
            .add_command(Box::new(MockCommand::request("late", &probe)))
            .await;
        assert!(matches!(result, Err(Error::Stopped)));
    }
}
