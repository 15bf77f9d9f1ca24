use async_trait::async_trait;
use parking_lot::Mutex;

use super::Connection;
use crate::command::RemoteCommand;
use crate::error::{Error, Result};

/// A command captured by a [`MockConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub command: String,
    pub request: bool,
}

/// An in-process connection for tests. Records what it was asked to send,
/// and fails every send when built with [`MockConnection::failing`].
#[derive(Debug)]
pub struct MockConnection {
    descriptor: String,
    failure: Option<String>,
    sent: Mutex<Vec<Sent>>,
}

impl MockConnection {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            failure: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new(descriptor)
        }
    }

    /// Every send attempt, including failed ones.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    fn record(&self, command: &dyn RemoteCommand, request: bool) -> Result<()> {
        self.sent.lock().push(Sent {
            command: command.name().to_string(),
            request,
        });
        match &self.failure {
            Some(message) => Err(Error::Send(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn descriptor(&self) -> String {
        self.descriptor.clone()
    }

    async fn send_request(&self, command: &dyn RemoteCommand) -> Result<()> {
        self.record(command, true)
    }

    async fn send_response(&self, command: &dyn RemoteCommand) -> Result<()> {
        self.record(command, false)
    }
}
