//! Socket engine: one command per TCP connection, read until the peer
//! closes its side.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::command_handler::dispatch_direct;
use super::{EngineCore, EngineSettings, ScriptingEngine, bound};
use crate::command::CommandProcessor;
use crate::commands::CommandRegistry;
use crate::error::{Error, Result};
use crate::events::Event;
use crate::job::Job;

pub struct SocketEngine {
    core: EngineCore,
    address: String,
    port: u16,
    processor: Arc<dyn CommandProcessor>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl SocketEngine {
    pub fn new(settings: EngineSettings, address: impl Into<String>, port: u16) -> Arc<Self> {
        Self::with_processor(settings, address, port, Arc::new(CommandRegistry::new()))
    }

    pub fn with_processor(
        settings: EngineSettings,
        address: impl Into<String>,
        port: u16,
        processor: Arc<dyn CommandProcessor>,
    ) -> Arc<Self> {
        bound(Arc::new(Self {
            core: EngineCore::new(settings),
            address: address.into(),
            port,
            processor,
            local_addr: Mutex::new(None),
        }))
    }

    /// The bound address once the engine is listening. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

/// Read one command from `stream` and run it on `owner`.
async fn serve(
    owner: Arc<dyn ScriptingEngine>,
    processor: Arc<dyn CommandProcessor>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await?;
    if data.is_empty() {
        warn!(%peer, "no data received, ignoring connection");
        return Ok(());
    }

    let command = processor.parse(&data)?;
    debug!(%peer, command = command.name(), "received command");

    let core = owner.core();
    if !core.admit(command.as_ref()) {
        return Ok(());
    }
    match core.installed_command_handler() {
        Some(handler) => handler.handle(command).await,
        None => {
            dispatch_direct(owner.as_ref(), command).await;
            Ok(())
        }
    }
}

#[async_trait]
impl ScriptingEngine for SocketEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    fn configuration(&self) -> String {
        format!(
            "socket --address {} --port {} --max-concurrent-jobs {}",
            self.address,
            self.port,
            self.core.max_concurrent_jobs()
        )
    }

    async fn execute(&self) -> Result<()> {
        let owner = self.core.engine().ok_or(Error::NoOwner)?;
        self.core.start()?;

        let listener = TcpListener::bind((self.address.as_str(), self.port)).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(addr);
        info!(%addr, "socket engine listening");
        self.core.events().emit(Event::Listening { addr });
        self.core.start_pool();

        loop {
            if !self.core.wait_while_paused().await {
                break;
            }
            let accepted = tokio::select! {
                _ = self.core.wait_stopped() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("failed to accept connection: {e}");
                    continue;
                }
            };

            let job = Job::new(
                format!("connection {peer}"),
                serve(Arc::clone(&owner), Arc::clone(&self.processor), stream, peer),
            );
            if let Err(e) = self.core.queue_job(job).await {
                debug!(%peer, "connection dropped: {e}");
            }
        }

        info!(%addr, "socket engine finished");
        Ok(())
    }
}
