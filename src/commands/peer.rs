//! Topology commands: peers registering with, leaving, and being killed by
//! their main/master engine.
//!
//! These are only meaningful to a hub engine, which intercepts them before
//! generic dispatch. Anywhere else they fail as a request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::{ApplicationContext, Envelope, PeerAction, PeerRole, RemoteCommand};
use crate::connection::{Connection, TcpConnection};
use crate::engine::ScriptingEngine;
use crate::error::{Error, Result};
use crate::policy::RequestHandler;

pub fn register_name(role: PeerRole) -> String {
    format!("register-{role}")
}

pub fn deregister_name(role: PeerRole) -> String {
    format!("deregister-{role}")
}

pub fn kill_name(role: PeerRole) -> String {
    format!("kill-{role}s")
}

/// Recover the role from a command name such as `"register-slave"`.
fn role_of(name: &str) -> Result<PeerRole> {
    if name.ends_with("worker") || name.ends_with("workers") {
        Ok(PeerRole::Worker)
    } else if name.ends_with("slave") || name.ends_with("slaves") {
        Ok(PeerRole::Slave)
    } else {
        Err(Error::Parse(format!("no peer role in '{name}'")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PeerPayload {
    connection: String,
}

fn parse_connection(envelope: Envelope) -> Result<Arc<dyn Connection>> {
    if !envelope.request {
        return Err(Error::Parse(format!(
            "{} can only be sent as a request",
            envelope.command
        )));
    }
    let payload: PeerPayload =
        serde_json::from_value(envelope.payload).map_err(|e| Error::Parse(e.to_string()))?;
    Ok(Arc::new(TcpConnection::parse(&payload.connection)?))
}

fn connection_payload(connection: &dyn Connection) -> serde_json::Value {
    serde_json::to_value(PeerPayload {
        connection: connection.descriptor(),
    })
    .unwrap_or_default()
}

fn not_a_hub(command: &dyn RemoteCommand, role: PeerRole, handler: &dyn RequestHandler) {
    handler.request_failed(
        command,
        &format!("{} can only be handled by a {} engine", command.name(), role.hub()),
    );
}

/// Sent by a peer on startup, carrying the connection it can be reached on.
#[derive(Debug)]
pub struct RegisterPeer {
    name: String,
    role: PeerRole,
    connection: Arc<dyn Connection>,
    context: Option<Arc<dyn ApplicationContext>>,
}

impl RegisterPeer {
    pub fn new(role: PeerRole, connection: Arc<dyn Connection>) -> Self {
        Self {
            name: register_name(role),
            role,
            connection,
            context: None,
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Box<dyn RemoteCommand>> {
        let role = role_of(&envelope.command)?;
        Ok(Box::new(Self::new(role, parse_connection(envelope)?)))
    }
}

#[async_trait]
impl RemoteCommand for RegisterPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_request(&self) -> bool {
        true
    }

    fn payload(&self) -> serde_json::Value {
        connection_payload(self.connection.as_ref())
    }

    fn set_application_context(&mut self, context: Option<Arc<dyn ApplicationContext>>) {
        self.context = context;
    }

    fn application_context(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.context.as_ref()
    }

    fn peer_action(&self, role: PeerRole) -> Option<PeerAction> {
        (role == self.role).then(|| PeerAction::Register(Arc::clone(&self.connection)))
    }

    async fn handle_request(&self, _engine: &dyn ScriptingEngine, handler: &dyn RequestHandler) {
        not_a_hub(self, self.role, handler);
    }
}

/// Sent by a worker before it stops.
#[derive(Debug)]
pub struct DeregisterPeer {
    name: String,
    role: PeerRole,
    connection: Arc<dyn Connection>,
    context: Option<Arc<dyn ApplicationContext>>,
}

impl DeregisterPeer {
    pub fn new(role: PeerRole, connection: Arc<dyn Connection>) -> Self {
        Self {
            name: deregister_name(role),
            role,
            connection,
            context: None,
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Box<dyn RemoteCommand>> {
        let role = role_of(&envelope.command)?;
        Ok(Box::new(Self::new(role, parse_connection(envelope)?)))
    }
}

#[async_trait]
impl RemoteCommand for DeregisterPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_request(&self) -> bool {
        true
    }

    fn payload(&self) -> serde_json::Value {
        connection_payload(self.connection.as_ref())
    }

    fn set_application_context(&mut self, context: Option<Arc<dyn ApplicationContext>>) {
        self.context = context;
    }

    fn application_context(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.context.as_ref()
    }

    fn peer_action(&self, role: PeerRole) -> Option<PeerAction> {
        (role == self.role).then(|| PeerAction::Deregister(Arc::clone(&self.connection)))
    }

    async fn handle_request(&self, _engine: &dyn ScriptingEngine, handler: &dyn RequestHandler) {
        not_a_hub(self, self.role, handler);
    }
}

/// Asks a hub to kill every registered peer.
#[derive(Debug)]
pub struct KillPeers {
    name: String,
    role: PeerRole,
    context: Option<Arc<dyn ApplicationContext>>,
}

impl KillPeers {
    pub fn new(role: PeerRole) -> Self {
        Self {
            name: kill_name(role),
            role,
            context: None,
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Box<dyn RemoteCommand>> {
        if !envelope.request {
            return Err(Error::Parse(format!(
                "{} can only be sent as a request",
                envelope.command
            )));
        }
        Ok(Box::new(Self::new(role_of(&envelope.command)?)))
    }
}

#[async_trait]
impl RemoteCommand for KillPeers {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_request(&self) -> bool {
        true
    }

    fn set_application_context(&mut self, context: Option<Arc<dyn ApplicationContext>>) {
        self.context = context;
    }

    fn application_context(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.context.as_ref()
    }

    fn peer_action(&self, role: PeerRole) -> Option<PeerAction> {
        (role == self.role).then_some(PeerAction::KillAll)
    }

    async fn handle_request(&self, _engine: &dyn ScriptingEngine, handler: &dyn RequestHandler) {
        not_a_hub(self, self.role, handler);
    }
}
