//! Proxy engine: every command the base engine receives is relayed
//! unchanged to one fixed connection.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, error};

use super::command_handler::{CommandHandler, OwnerSlot};
use super::enhancer::{Enhancement, Enhancer};
use super::ScriptingEngine;
use crate::command::RemoteCommand;
use crate::connection::Connection;
use crate::error::Result;

pub type ForwardingEngine = Enhancer<Forward>;

pub struct ForwardGrabber {
    owner: OwnerSlot,
    target: Arc<dyn Connection>,
}

impl ForwardGrabber {
    pub fn new(target: Arc<dyn Connection>) -> Self {
        Self {
            owner: OwnerSlot::default(),
            target,
        }
    }
}

#[async_trait]
impl CommandHandler for ForwardGrabber {
    fn set_owner(&self, owner: Weak<dyn ScriptingEngine>) {
        self.owner.set(owner);
    }

    fn owner(&self) -> Option<Arc<dyn ScriptingEngine>> {
        self.owner.get()
    }

    async fn do_handle(
        &self,
        _owner: &dyn ScriptingEngine,
        command: Box<dyn RemoteCommand>,
    ) -> Result<()> {
        let target = self.target.descriptor();
        debug!(command = command.name(), %target, "relaying");
        let sent = if command.is_request() {
            self.target.send_request(command.as_ref()).await
        } else {
            self.target.send_response(command.as_ref()).await
        };
        // failed commands are not kept for replay
        if let Err(e) = &sent {
            error!(command = command.name(), %target, "failed to relay: {e}");
        }
        sent
    }
}

pub struct Forward {
    target: Arc<dyn Connection>,
    grabber: Arc<ForwardGrabber>,
}

impl Forward {
    pub fn new(target: Arc<dyn Connection>) -> Self {
        let grabber = Arc::new(ForwardGrabber::new(Arc::clone(&target)));
        Self { target, grabber }
    }

    pub fn target(&self) -> &Arc<dyn Connection> {
        &self.target
    }
}

#[async_trait]
impl Enhancement for Forward {
    fn name(&self) -> String {
        format!("forward --target {}", self.target.descriptor())
    }

    fn command_handler(&self) -> Option<Arc<dyn CommandHandler>> {
        Some(Arc::clone(&self.grabber) as Arc<dyn CommandHandler>)
    }
}

pub fn forwarding_engine(
    base: Arc<dyn ScriptingEngine>,
    target: Arc<dyn Connection>,
) -> Arc<ForwardingEngine> {
    Enhancer::new(base, Forward::new(target))
}
