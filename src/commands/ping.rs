use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::command::{ApplicationContext, Envelope, RemoteCommand, ResponseCommand};
use crate::connection::{Connection, TcpConnection};
use crate::engine::ScriptingEngine;
use crate::error::{Error, Result};
use crate::policy::{RequestHandler, ResponseHandler};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Liveness check. As a request it optionally sends a ping response back to
/// `reply_to` (`host:port`); as a response it reports to the response handler.
#[derive(Debug)]
pub struct Ping {
    request: bool,
    reply_to: Option<String>,
    error: Option<String>,
    context: Option<Arc<dyn ApplicationContext>>,
}

impl Ping {
    pub fn request() -> Self {
        Self {
            request: true,
            reply_to: None,
            error: None,
            context: None,
        }
    }

    pub fn response() -> Self {
        Self {
            request: false,
            ..Self::request()
        }
    }

    pub fn with_reply_to(mut self, descriptor: impl Into<String>) -> Self {
        self.reply_to = Some(descriptor.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Box<dyn RemoteCommand>> {
        let payload: PingPayload = if envelope.payload.is_null() {
            PingPayload::default()
        } else {
            serde_json::from_value(envelope.payload).map_err(|e| Error::Parse(e.to_string()))?
        };
        Ok(Box::new(Self {
            request: envelope.request,
            reply_to: payload.reply_to,
            error: payload.error,
            context: None,
        }))
    }

    async fn reply(&self, descriptor: &str) -> Result<()> {
        let connection = TcpConnection::parse(descriptor)?;
        connection.send_response(&Ping::response()).await
    }
}

#[async_trait]
impl RemoteCommand for Ping {
    fn name(&self) -> &str {
        "ping"
    }

    fn is_request(&self) -> bool {
        self.request
    }

    fn payload(&self) -> serde_json::Value {
        serde_json::to_value(PingPayload {
            reply_to: self.reply_to.clone(),
            error: self.error.clone(),
        })
        .unwrap_or_default()
    }

    fn set_application_context(&mut self, context: Option<Arc<dyn ApplicationContext>>) {
        self.context = context;
    }

    fn application_context(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.context.as_ref()
    }

    fn response(&self) -> Option<&dyn ResponseCommand> {
        Some(self)
    }

    async fn handle_request(&self, _engine: &dyn ScriptingEngine, handler: &dyn RequestHandler) {
        info!(command = "ping", "pong");
        if let Some(reply_to) = &self.reply_to
            && let Err(e) = self.reply(reply_to).await
        {
            handler.request_failed(self, &e.to_string());
            return;
        }
        handler.request_successful(self);
    }
}

#[async_trait]
impl ResponseCommand for Ping {
    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    async fn handle_response(&self, _engine: &dyn ScriptingEngine, handler: &dyn ResponseHandler) {
        match &self.error {
            Some(message) => handler.response_failed(self, message),
            None => handler.response_successful(self),
        }
    }
}
