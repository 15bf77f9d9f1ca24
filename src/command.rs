//! The remote command boundary.
//!
//! A [`RemoteCommand`] is either a request (handled with a
//! [`RequestHandler`]) or a response. Responses are only handled by commands
//! that expose a [`ResponseCommand`]; everything else is reported as
//! response-incapable. Commands are decoded by a [`CommandProcessor`], get
//! their contexts injected once by the engine, and are consumed by exactly
//! one handler.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::engine::ScriptingEngine;
use crate::error::Result;
use crate::policy::{RequestHandler, ResponseHandler};

/// The host application an engine runs inside.
pub trait ApplicationContext: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
}

/// The flow a command was issued from, for commands that care.
pub trait FlowContext: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
}

/// Capability of commands that accept a flow context.
pub trait FlowAware {
    fn set_flow_context(&mut self, context: Arc<dyn FlowContext>);
}

/// Application context used by the `herald` binary.
#[derive(Debug, Clone)]
pub struct HostApplication {
    name: String,
}

impl HostApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ApplicationContext for HostApplication {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Which side of a main/worker or master/slave pair a topology command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerRole {
    Worker,
    Slave,
}

impl PeerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Slave => "slave",
        }
    }

    /// Name of the engine that keeps the peer set, e.g. `"main"`.
    pub fn hub(self) -> &'static str {
        match self {
            Self::Worker => "main",
            Self::Slave => "master",
        }
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a topology command asks the hub to do with its peer set.
#[derive(Debug, Clone)]
pub enum PeerAction {
    Register(Arc<dyn Connection>),
    Deregister(Arc<dyn Connection>),
    KillAll,
}

/// A request or response crossing the system boundary.
#[async_trait]
pub trait RemoteCommand: Send + Sync + fmt::Debug {
    /// Registry name, e.g. `"ping"`.
    fn name(&self) -> &str;

    fn is_request(&self) -> bool;

    /// Command-specific data carried on the wire.
    fn payload(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn set_application_context(&mut self, context: Option<Arc<dyn ApplicationContext>>);

    fn application_context(&self) -> Option<&Arc<dyn ApplicationContext>>;

    /// `Some` for commands that accept a flow context.
    fn flow_aware(&mut self) -> Option<&mut dyn FlowAware> {
        None
    }

    /// `Some` for commands that can handle responses.
    fn response(&self) -> Option<&dyn ResponseCommand> {
        None
    }

    /// `Some` when this command manages the peer set of a `role` hub.
    fn peer_action(&self, _role: PeerRole) -> Option<PeerAction> {
        None
    }

    async fn handle_request(&self, engine: &dyn ScriptingEngine, handler: &dyn RequestHandler);
}

/// Response-handling capability of a command.
#[async_trait]
pub trait ResponseCommand: Send + Sync {
    fn error_message(&self) -> Option<&str>;

    async fn handle_response(&self, engine: &dyn ScriptingEngine, handler: &dyn ResponseHandler);
}

/// Decodes commands from bytes and encodes them back.
pub trait CommandProcessor: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<Box<dyn RemoteCommand>>;
    fn format(&self, command: &dyn RemoteCommand) -> Result<Vec<u8>>;
}

/// Wire form of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub command: String,
    pub request: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn of(command: &dyn RemoteCommand) -> Self {
        Self {
            command: command.name().to_string(),
            request: command.is_request(),
            payload: command.payload(),
        }
    }
}
