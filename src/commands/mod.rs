//! Built-in remote commands and the registry that decodes them.
//!
//! Commands travel as a JSON [`Envelope`]. The [`CommandRegistry`] maps
//! envelope names to factories and implements [`CommandProcessor`].
//! Additional commands can be registered at runtime via
//! `registry.register("name", factory)`.

pub mod kill;
pub mod mock;
pub mod peer;
pub mod ping;

use std::collections::HashMap;

use crate::command::{CommandProcessor, Envelope, PeerRole, RemoteCommand};
use crate::error::{Error, Result};

/// Builds a command from its wire form.
pub type CommandFactory = fn(Envelope) -> Result<Box<dyn RemoteCommand>>;

/// Holds registered command factories.
pub struct CommandRegistry {
    factories: HashMap<String, CommandFactory>,
}

impl CommandRegistry {
    /// Create a registry with all built-in commands.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("ping", ping::Ping::from_envelope);
        registry.register("kill", kill::Kill::from_envelope);
        for role in [PeerRole::Worker, PeerRole::Slave] {
            registry.register(&peer::register_name(role), peer::RegisterPeer::from_envelope);
            registry.register(
                &peer::deregister_name(role),
                peer::DeregisterPeer::from_envelope,
            );
            registry.register(&peer::kill_name(role), peer::KillPeers::from_envelope);
        }
        registry
    }

    /// Register an additional command, replacing any factory of the same name.
    pub fn register(&mut self, name: &str, factory: CommandFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// All registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessor for CommandRegistry {
    fn parse(&self, data: &[u8]) -> Result<Box<dyn RemoteCommand>> {
        let envelope: Envelope =
            serde_json::from_slice(data).map_err(|e| Error::Parse(e.to_string()))?;
        let factory = self
            .factories
            .get(&envelope.command)
            .ok_or_else(|| Error::Parse(format!("unknown command: {}", envelope.command)))?;
        factory(envelope)
    }

    fn format(&self, command: &dyn RemoteCommand) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&Envelope::of(command))?)
    }
}
