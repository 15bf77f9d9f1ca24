//! Permission, request, and response handler policies.
//!
//! Engines consult a [`PermissionHandler`] before anything else touches a
//! command, and report outcomes to a [`RequestHandler`] or
//! [`ResponseHandler`].

pub mod mock;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::command::RemoteCommand;

/// Decides whether a command may be processed at all.
pub trait PermissionHandler: Send + Sync {
    fn permitted(&self, command: &dyn RemoteCommand) -> bool;
}

/// Receives the outcome of request handling.
pub trait RequestHandler: Send + Sync {
    fn request_successful(&self, command: &dyn RemoteCommand);
    fn request_failed(&self, command: &dyn RemoteCommand, message: &str);
    fn request_rejected(&self, command: &dyn RemoteCommand, message: &str);
}

/// Receives the outcome of response handling.
pub trait ResponseHandler: Send + Sync {
    fn response_successful(&self, command: &dyn RemoteCommand);
    fn response_failed(&self, command: &dyn RemoteCommand, message: &str);
}

/// Permits every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionHandler for AllowAll {
    fn permitted(&self, _command: &dyn RemoteCommand) -> bool {
        true
    }
}

/// Rejects every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl PermissionHandler for DenyAll {
    fn permitted(&self, _command: &dyn RemoteCommand) -> bool {
        false
    }
}

/// Writes every outcome to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl RequestHandler for LoggingHandler {
    fn request_successful(&self, command: &dyn RemoteCommand) {
        info!(command = command.name(), "request successful");
    }

    fn request_failed(&self, command: &dyn RemoteCommand, message: &str) {
        error!(command = command.name(), "request failed: {message}");
    }

    fn request_rejected(&self, command: &dyn RemoteCommand, message: &str) {
        warn!(command = command.name(), "request rejected: {message}");
    }
}

impl ResponseHandler for LoggingHandler {
    fn response_successful(&self, command: &dyn RemoteCommand) {
        info!(command = command.name(), "response successful");
    }

    fn response_failed(&self, command: &dyn RemoteCommand, message: &str) {
        error!(command = command.name(), "response failed: {message}");
    }
}

/// Ignores every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl RequestHandler for NullHandler {
    fn request_successful(&self, _command: &dyn RemoteCommand) {}
    fn request_failed(&self, _command: &dyn RemoteCommand, _message: &str) {}
    fn request_rejected(&self, _command: &dyn RemoteCommand, _message: &str) {}
}

impl ResponseHandler for NullHandler {
    fn response_successful(&self, _command: &dyn RemoteCommand) {}
    fn response_failed(&self, _command: &dyn RemoteCommand, _message: &str) {}
}

/// Permission policy selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionPolicy {
    #[default]
    AllowAll,
    DenyAll,
}

/// Outcome handler selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomePolicy {
    #[default]
    Logging,
    Null,
}

impl PermissionPolicy {
    pub fn handler(self) -> Arc<dyn PermissionHandler> {
        match self {
            Self::AllowAll => Arc::new(AllowAll),
            Self::DenyAll => Arc::new(DenyAll),
        }
    }
}

impl OutcomePolicy {
    pub fn request_handler(self) -> Arc<dyn RequestHandler> {
        match self {
            Self::Logging => Arc::new(LoggingHandler),
            Self::Null => Arc::new(NullHandler),
        }
    }

    pub fn response_handler(self) -> Arc<dyn ResponseHandler> {
        match self {
            Self::Logging => Arc::new(LoggingHandler),
            Self::Null => Arc::new(NullHandler),
        }
    }
}
