//! Main/worker and master/slave topologies.
//!
//! A hub engine (`main` or `master`) wraps a base engine and grabs every
//! command before generic dispatch: peer registration commands maintain a
//! [`LoadBalancer`], a kill-all empties it, and anything else is forwarded
//! to one of the registered peers. A peer engine (`worker` or `slave`)
//! registers with its hub before its base engine starts.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::command_handler::{CommandHandler, OwnerSlot};
use super::enhancer::{Enhancement, Enhancer};
use super::ScriptingEngine;
use crate::command::{PeerAction, PeerRole, RemoteCommand};
use crate::commands::kill::Kill;
use crate::commands::peer::{DeregisterPeer, RegisterPeer};
use crate::connection::{Connection, LoadBalancer};
use crate::error::Result;
use crate::events::{Event, EventBus};

pub type HubEngine = Enhancer<Hub>;
pub type PeerEngine = Enhancer<Peer>;

/// A command as seen by a hub.
#[derive(Debug)]
pub enum PeerCommand {
    Register(Arc<dyn Connection>),
    Deregister(Arc<dyn Connection>),
    KillAll,
    Other(Box<dyn RemoteCommand>),
}

impl PeerCommand {
    pub fn classify(command: Box<dyn RemoteCommand>, role: PeerRole) -> Self {
        match command.peer_action(role) {
            Some(PeerAction::Register(connection)) => Self::Register(connection),
            Some(PeerAction::Deregister(connection)) => Self::Deregister(connection),
            Some(PeerAction::KillAll) => Self::KillAll,
            None => Self::Other(command),
        }
    }
}

/// The hub's command handler.
pub struct PeerGrabber {
    owner: OwnerSlot,
    role: PeerRole,
    peers: Arc<LoadBalancer>,
}

impl PeerGrabber {
    pub fn new(role: PeerRole, peers: Arc<LoadBalancer>) -> Self {
        Self {
            owner: OwnerSlot::default(),
            role,
            peers,
        }
    }

    fn register(&self, connection: Arc<dyn Connection>, events: &EventBus) {
        let peer = connection.descriptor();
        if self.peers.add_connection(connection) {
            info!(role = %self.role, %peer, "peer registered");
            events.emit(Event::PeerRegistered { peer });
        } else {
            debug!(role = %self.role, %peer, "peer already registered");
        }
    }

    fn deregister(&self, connection: &dyn Connection, events: &EventBus) {
        let peer = connection.descriptor();
        if self.peers.remove_connection(connection) {
            info!(role = %self.role, %peer, "peer deregistered");
            events.emit(Event::PeerDeregistered { peer });
        } else {
            debug!(role = %self.role, %peer, "peer was not registered");
        }
    }

    /// Remove every peer and tell it to stop. A peer is removed before the
    /// kill is sent, so one that cannot be reached still ends up removed.
    async fn kill_all(&self, events: &EventBus) {
        let snapshot = self.peers.connections();
        info!(role = %self.role, peers = snapshot.len(), "killing all peers");
        let kill = Kill::new();
        for connection in snapshot {
            self.deregister(connection.as_ref(), events);
            if let Err(e) = connection.send_request(&kill).await {
                error!(peer = %connection.descriptor(), "failed to send kill: {e}");
            }
        }
    }

    async fn forward(&self, command: Box<dyn RemoteCommand>) -> Result<()> {
        debug!(command = command.name(), "forwarding to peer");
        if command.is_request() {
            self.peers.send_request(command.as_ref()).await
        } else {
            self.peers.send_response(command.as_ref()).await
        }
    }
}

#[async_trait]
impl CommandHandler for PeerGrabber {
    fn set_owner(&self, owner: Weak<dyn ScriptingEngine>) {
        self.owner.set(owner);
    }

    fn owner(&self) -> Option<Arc<dyn ScriptingEngine>> {
        self.owner.get()
    }

    async fn do_handle(
        &self,
        owner: &dyn ScriptingEngine,
        command: Box<dyn RemoteCommand>,
    ) -> Result<()> {
        let events = owner.core().events();
        match PeerCommand::classify(command, self.role) {
            PeerCommand::Register(connection) => self.register(connection, events),
            PeerCommand::Deregister(connection) => self.deregister(connection.as_ref(), events),
            PeerCommand::KillAll => self.kill_all(events).await,
            PeerCommand::Other(command) => self.forward(command).await?,
        }
        Ok(())
    }
}

/// Keeps the peer set of a `main` or `master` engine.
pub struct Hub {
    role: PeerRole,
    peers: Arc<LoadBalancer>,
    grabber: Arc<PeerGrabber>,
}

impl Hub {
    pub fn new(role: PeerRole) -> Self {
        let peers = Arc::new(LoadBalancer::new());
        let grabber = Arc::new(PeerGrabber::new(role, Arc::clone(&peers)));
        Self {
            role,
            peers,
            grabber,
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn peers(&self) -> &Arc<LoadBalancer> {
        &self.peers
    }
}

#[async_trait]
impl Enhancement for Hub {
    fn name(&self) -> String {
        self.role.hub().to_string()
    }

    fn command_handler(&self) -> Option<Arc<dyn CommandHandler>> {
        Some(Arc::clone(&self.grabber) as Arc<dyn CommandHandler>)
    }
}

/// Registers a `worker` or `slave` with its hub.
pub struct Peer {
    role: PeerRole,
    hub: Arc<dyn Connection>,
    own: Arc<dyn Connection>,
}

impl Peer {
    /// `hub` is where the main/master listens, `own` is where this peer
    /// can be reached.
    pub fn new(role: PeerRole, hub: Arc<dyn Connection>, own: Arc<dyn Connection>) -> Self {
        Self { role, hub, own }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }
}

#[async_trait]
impl Enhancement for Peer {
    fn name(&self) -> String {
        format!(
            "{} --{} {} --connection {}",
            self.role,
            self.role.hub(),
            self.hub.descriptor(),
            self.own.descriptor()
        )
    }

    async fn pre_execute(&self, _base: &dyn ScriptingEngine) -> Result<()> {
        info!(role = %self.role, hub = %self.hub.descriptor(), "registering with {}", self.role.hub());
        let register = RegisterPeer::new(self.role, Arc::clone(&self.own));
        self.hub.send_request(&register).await
    }

    async fn pre_stop(&self, base: &dyn ScriptingEngine) {
        if self.role != PeerRole::Worker || base.is_stopped() {
            return;
        }
        let deregister = DeregisterPeer::new(self.role, Arc::clone(&self.own));
        if let Err(e) = self.hub.send_request(&deregister).await {
            warn!(hub = %self.hub.descriptor(), "failed to deregister: {e}");
        }
    }
}

pub fn main_engine(base: Arc<dyn ScriptingEngine>) -> Arc<HubEngine> {
    Enhancer::new(base, Hub::new(PeerRole::Worker))
}

pub fn master_engine(base: Arc<dyn ScriptingEngine>) -> Arc<HubEngine> {
    Enhancer::new(base, Hub::new(PeerRole::Slave))
}

pub fn worker_engine(
    base: Arc<dyn ScriptingEngine>,
    main: Arc<dyn Connection>,
    own: Arc<dyn Connection>,
) -> Arc<PeerEngine> {
    Enhancer::new(base, Peer::new(PeerRole::Worker, main, own))
}

pub fn slave_engine(
    base: Arc<dyn ScriptingEngine>,
    master: Arc<dyn Connection>,
    own: Arc<dyn Connection>,
) -> Arc<PeerEngine> {
    Enhancer::new(base, Peer::new(PeerRole::Slave, master, own))
}
