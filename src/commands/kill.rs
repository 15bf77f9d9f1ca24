use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::command::{ApplicationContext, Envelope, RemoteCommand};
use crate::engine::ScriptingEngine;
use crate::error::{Error, Result};
use crate::policy::RequestHandler;

/// Stops the engine that handles it.
#[derive(Debug, Default)]
pub struct Kill {
    context: Option<Arc<dyn ApplicationContext>>,
}

impl Kill {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Box<dyn RemoteCommand>> {
        if !envelope.request {
            return Err(Error::Parse("kill can only be sent as a request".to_string()));
        }
        Ok(Box::new(Self::new()))
    }
}

#[async_trait]
impl RemoteCommand for Kill {
    fn name(&self) -> &str {
        "kill"
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

    async fn handle_request(&self, engine: &dyn ScriptingEngine, handler: &dyn RequestHandler) {
        info!(engine = %engine.configuration(), "kill received, stopping engine");
        engine.stop_execution().await;
        handler.request_successful(self);
    }
}
