//! Routing a command to request or response processing.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{error, warn};

use super::ScriptingEngine;
use crate::command::RemoteCommand;
use crate::consts::RESPONSE_UNSUPPORTED;
use crate::error::{Error, Result};

/// Validates a command and routes it. Handlers are stateless apart from a
/// back-reference to the engine that owns them.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn set_owner(&self, owner: Weak<dyn ScriptingEngine>);

    fn owner(&self) -> Option<Arc<dyn ScriptingEngine>>;

    /// Fails with "No owner set!" until an owner is set.
    fn check(&self) -> Result<Arc<dyn ScriptingEngine>> {
        self.owner().ok_or(Error::NoOwner)
    }

    async fn handle(&self, command: Box<dyn RemoteCommand>) -> Result<()> {
        let owner = self.check()?;
        self.do_handle(owner.as_ref(), command).await
    }

    async fn do_handle(
        &self,
        owner: &dyn ScriptingEngine,
        command: Box<dyn RemoteCommand>,
    ) -> Result<()>;
}

/// Holds a handler's owner.
#[derive(Default)]
pub struct OwnerSlot(RwLock<Option<Weak<dyn ScriptingEngine>>>);

impl OwnerSlot {
    pub fn set(&self, owner: Weak<dyn ScriptingEngine>) {
        *self.0.write() = Some(owner);
    }

    pub fn get(&self) -> Option<Arc<dyn ScriptingEngine>> {
        self.0.read().as_ref().and_then(Weak::upgrade)
    }
}

/// The generic handler: inject contexts, then run the command as a request
/// or a response.
#[derive(Default)]
pub struct DefaultCommandHandler {
    owner: OwnerSlot,
}

impl DefaultCommandHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandHandler for DefaultCommandHandler {
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
        dispatch(owner, command).await;
        Ok(())
    }
}

/// Inject the owner's contexts and hand the command to the owner's request
/// or response handler. A response that cannot handle responses is reported
/// as a failed response.
pub async fn dispatch(owner: &dyn ScriptingEngine, mut command: Box<dyn RemoteCommand>) {
    let core = owner.core();
    core.inject_contexts(command.as_mut());

    if command.is_request() {
        let handler = core.request_handler();
        command.handle_request(owner, handler.as_ref()).await;
        return;
    }

    let handler = core.response_handler();
    match command.response() {
        Some(response) => {
            if let Some(message) = response.error_message() {
                error!(command = command.name(), "{message}");
            }
            response.handle_response(owner, handler.as_ref()).await;
        }
        None => handler.response_failed(command.as_ref(), RESPONSE_UNSUPPORTED),
    }
}

/// Dispatch used by the socket engine: application context only, and a
/// response without response handling is logged and dropped rather than
/// reported.
pub async fn dispatch_direct(owner: &dyn ScriptingEngine, mut command: Box<dyn RemoteCommand>) {
    let core = owner.core();
    command.set_application_context(core.application_context());

    if command.is_request() {
        let handler = core.request_handler();
        command.handle_request(owner, handler.as_ref()).await;
        return;
    }

    match command.response() {
        Some(response) => {
            let handler = core.response_handler();
            response.handle_response(owner, handler.as_ref()).await;
        }
        None => warn!(command = command.name(), "dropping response without response handling"),
    }
}
