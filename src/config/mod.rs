//! Engine configuration, read from TOML.
//!
//! One table describes one engine, selected by its `type` key. Wrapping
//! engines nest their base engine under `base`:
//!
//! ```toml
//! type = "main"
//!
//! [base]
//! type = "socket"
//! port = 12345
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ApplicationContext;
use crate::connection::{Connection, TcpConnection};
use crate::engine::file_polling::{FilePollingEngine, PollingOptions};
use crate::engine::forwarding::forwarding_engine;
use crate::engine::manual_feed::ManualFeedEngine;
use crate::engine::multi::MultiEngine;
use crate::engine::socket::SocketEngine;
use crate::engine::topology::{main_engine, master_engine, slave_engine, worker_engine};
use crate::engine::{EngineSettings, ScriptingEngine};
use crate::error::{Error, Result};
use crate::policy::{OutcomePolicy, PermissionPolicy};

mod defaults {
    use crate::consts;

    pub fn address() -> String {
        consts::DEFAULT_ADDRESS.to_string()
    }

    pub const fn port() -> u16 {
        consts::DEFAULT_PORT
    }

    pub const fn max_concurrent_jobs() -> usize {
        consts::DEFAULT_MAX_CONCURRENT_JOBS
    }

    pub const fn max_commands() -> usize {
        consts::DEFAULT_MAX_COMMANDS
    }

    pub const fn atomic_move() -> bool {
        true
    }

    pub const fn poll_interval_ms() -> u64 {
        consts::DEFAULT_POLL_INTERVAL.as_millis() as u64
    }

    pub const fn settle_ms() -> u64 {
        consts::DEFAULT_SETTLE_TIME.as_millis() as u64
    }
}

/// The `[handlers]` table of a leaf engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    pub permission: PermissionPolicy,
    pub request: OutcomePolicy,
    pub response: OutcomePolicy,
}

fn settings(
    handlers: HandlerConfig,
    max_concurrent_jobs: usize,
    context: &Option<Arc<dyn ApplicationContext>>,
) -> Result<EngineSettings> {
    if max_concurrent_jobs < 1 {
        return Err(Error::Config(format!(
            "max_concurrent_jobs must be at least 1, got {max_concurrent_jobs}"
        )));
    }
    Ok(EngineSettings {
        permission_handler: handlers.permission.handler(),
        request_handler: handlers.request.request_handler(),
        response_handler: handlers.response.response_handler(),
        max_concurrent_jobs,
        application_context: context.clone(),
        flow_context: None,
    })
}

fn connection(descriptor: &str) -> Result<Arc<dyn Connection>> {
    Ok(Arc::new(TcpConnection::parse(descriptor)?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "defaults::address")]
    pub address: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default = "defaults::max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub handlers: HandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePollingConfig {
    pub incoming: PathBuf,
    pub processing: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
    #[serde(default = "defaults::atomic_move")]
    pub atomic_move: bool,
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "defaults::settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "defaults::max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub handlers: HandlerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualFeedConfig {
    #[serde(default = "defaults::max_commands")]
    pub max_commands: usize,
    #[serde(default = "defaults::max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default)]
    pub handlers: HandlerConfig,
}

/// `main` or `master`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    pub base: Box<EngineConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub base: Box<EngineConfig>,
    /// `host:port` of the main engine.
    pub main: String,
    /// `host:port` this worker is reachable on.
    pub connection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveConfig {
    pub base: Box<EngineConfig>,
    /// `host:port` of the master engine.
    pub master: String,
    /// `host:port` this slave is reachable on.
    pub connection: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardConfig {
    pub base: Box<EngineConfig>,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiConfig {
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineConfig {
    Socket(SocketConfig),
    FilePolling(FilePollingConfig),
    ManualFeed(ManualFeedConfig),
    Main(HubConfig),
    Master(HubConfig),
    Worker(WorkerConfig),
    Slave(SlaveConfig),
    Forward(ForwardConfig),
    Multi(MultiConfig),
}

impl EngineConfig {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// The `type` key of this table.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Socket(_) => "socket",
            Self::FilePolling(_) => "file-polling",
            Self::ManualFeed(_) => "manual-feed",
            Self::Main(_) => "main",
            Self::Master(_) => "master",
            Self::Worker(_) => "worker",
            Self::Slave(_) => "slave",
            Self::Forward(_) => "forward",
            Self::Multi(_) => "multi",
        }
    }

    pub fn build(&self) -> Result<Arc<dyn ScriptingEngine>> {
        self.build_with(None)
    }

    /// Build the engine tree, giving every leaf engine `context`.
    pub fn build_with(
        &self,
        context: Option<Arc<dyn ApplicationContext>>,
    ) -> Result<Arc<dyn ScriptingEngine>> {
        let engine: Arc<dyn ScriptingEngine> = match self {
            Self::Socket(c) => SocketEngine::new(
                settings(c.handlers, c.max_concurrent_jobs, &context)?,
                c.address.clone(),
                c.port,
            ),
            Self::FilePolling(c) => {
                if c.poll_interval_ms == 0 {
                    return Err(Error::Config("poll_interval_ms must be positive".to_string()));
                }
                let options = PollingOptions {
                    atomic_move: c.atomic_move,
                    poll_interval: Duration::from_millis(c.poll_interval_ms),
                    settle_time: Duration::from_millis(c.settle_ms),
                    ..PollingOptions::new(&c.incoming, &c.processing, &c.processed, &c.failed)
                };
                FilePollingEngine::new(settings(c.handlers, c.max_concurrent_jobs, &context)?, options)
            }
            Self::ManualFeed(c) => ManualFeedEngine::with_max_commands(
                settings(c.handlers, c.max_concurrent_jobs, &context)?,
                c.max_commands,
            )?,
            Self::Main(c) => main_engine(c.base.build_with(context)?),
            Self::Master(c) => master_engine(c.base.build_with(context)?),
            Self::Worker(c) => worker_engine(
                c.base.build_with(context)?,
                connection(&c.main)?,
                connection(&c.connection)?,
            ),
            Self::Slave(c) => slave_engine(
                c.base.build_with(context)?,
                connection(&c.master)?,
                connection(&c.connection)?,
            ),
            Self::Forward(c) => forwarding_engine(c.base.build_with(context)?, connection(&c.target)?),
            Self::Multi(c) => {
                let engines = c
                    .engines
                    .iter()
                    .map(|e| e.build_with(context.clone()))
                    .collect::<Result<Vec<_>>>()?;
                MultiEngine::new(engines)
            }
        };
        Ok(engine)
    }
}
