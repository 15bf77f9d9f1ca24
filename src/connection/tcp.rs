use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::Connection;
use crate::command::{CommandProcessor, RemoteCommand};
use crate::commands::CommandRegistry;
use crate::error::{Error, Result};

/// Sends each command on a fresh TCP stream and closes it afterwards.
/// The receiving socket engine reads until EOF, so there is no length header.
#[derive(Clone)]
pub struct TcpConnection {
    host: String,
    port: u16,
    processor: Arc<dyn CommandProcessor>,
}

impl TcpConnection {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_processor(host, port, Arc::new(CommandRegistry::new()))
    }

    pub fn with_processor(
        host: impl Into<String>,
        port: u16,
        processor: Arc<dyn CommandProcessor>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            processor,
        }
    }

    /// Parse a `host:port` descriptor.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (host, port) = descriptor
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("expected host:port, got '{descriptor}'")))?;
        if host.is_empty() {
            return Err(Error::Config(format!("missing host in '{descriptor}'")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("invalid port in '{descriptor}': {e}")))?;
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn send(&self, command: &dyn RemoteCommand) -> Result<()> {
        let data = self.processor.format(command)?;
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| Error::Send(format!("cannot connect to {}: {e}", self.descriptor())))?;
        stream.write_all(&data).await?;
        stream.shutdown().await?;
        debug!(
            command = command.name(),
            peer = %self.descriptor(),
            bytes = data.len(),
            "sent command"
        );
        Ok(())
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn descriptor(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn send_request(&self, command: &dyn RemoteCommand) -> Result<()> {
        if !command.is_request() {
            return Err(Error::Send(format!(
                "'{}' is not a request",
                command.name()
            )));
        }
        self.send(command).await
    }

    async fn send_response(&self, command: &dyn RemoteCommand) -> Result<()> {
        if command.is_request() {
            return Err(Error::Send(format!(
                "'{}' is not a response",
                command.name()
            )));
        }
        self.send(command).await
    }
}
