use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::{
    ApplicationContext, FlowAware, FlowContext, RemoteCommand, ResponseCommand,
};
use crate::engine::ScriptingEngine;
use crate::policy::{RequestHandler, ResponseHandler};

/// Shared observation point for [`MockCommand`]s, which are consumed by the
/// engine and cannot be inspected afterwards.
#[derive(Debug, Default)]
pub struct Probe {
    requests: AtomicUsize,
    responses: AtomicUsize,
    application: Mutex<Option<String>>,
    flow: Mutex<Option<String>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many times `handle_request` ran.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// How many times `handle_response` ran.
    pub fn responses(&self) -> usize {
        self.responses.load(Ordering::SeqCst)
    }

    /// Name of the application context seen by the last handled command.
    pub fn application(&self) -> Option<String> {
        self.application.lock().clone()
    }

    /// Name of the flow context injected into the last flow-aware command.
    pub fn flow(&self) -> Option<String> {
        self.flow.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Request,
    Response,
    ResponseIncapable,
}

/// A scripted command for tests.
#[derive(Debug)]
pub struct MockCommand {
    name: String,
    kind: Kind,
    error: Option<String>,
    flow_aware: bool,
    probe: Arc<Probe>,
    context: Option<Arc<dyn ApplicationContext>>,
}

impl MockCommand {
    fn build(name: &str, kind: Kind, probe: &Arc<Probe>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            error: None,
            flow_aware: false,
            probe: Arc::clone(probe),
            context: None,
        }
    }

    pub fn request(name: &str, probe: &Arc<Probe>) -> Self {
        Self::build(name, Kind::Request, probe)
    }

    pub fn response(name: &str, probe: &Arc<Probe>) -> Self {
        Self::build(name, Kind::Response, probe)
    }

    /// A response that cannot handle responses.
    pub fn response_incapable(name: &str, probe: &Arc<Probe>) -> Self {
        Self::build(name, Kind::ResponseIncapable, probe)
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    pub fn flow_aware(mut self) -> Self {
        self.flow_aware = true;
        self
    }

    fn observe_context(&self) {
        *self.probe.application.lock() = self.context.as_ref().map(|c| c.name().to_string());
    }
}

impl FlowAware for MockCommand {
    fn set_flow_context(&mut self, context: Arc<dyn FlowContext>) {
        *self.probe.flow.lock() = Some(context.name().to_string());
    }
}

#[async_trait]
impl RemoteCommand for MockCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_request(&self) -> bool {
        self.kind == Kind::Request
    }

    fn set_application_context(&mut self, context: Option<Arc<dyn ApplicationContext>>) {
        self.context = context;
    }

    fn application_context(&self) -> Option<&Arc<dyn ApplicationContext>> {
        self.context.as_ref()
    }

    fn flow_aware(&mut self) -> Option<&mut dyn FlowAware> {
        if self.flow_aware { Some(self) } else { None }
    }

    fn response(&self) -> Option<&dyn ResponseCommand> {
        match self.kind {
            Kind::Response => Some(self),
            Kind::Request | Kind::ResponseIncapable => None,
        }
    }

    async fn handle_request(&self, _engine: &dyn ScriptingEngine, handler: &dyn RequestHandler) {
        self.observe_context();
        self.probe.requests.fetch_add(1, Ordering::SeqCst);
        handler.request_successful(self);
    }
}

#[async_trait]
impl ResponseCommand for MockCommand {
    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    async fn handle_response(&self, _engine: &dyn ScriptingEngine, handler: &dyn ResponseHandler) {
        self.observe_context();
        self.probe.responses.fetch_add(1, Ordering::SeqCst);
        handler.response_successful(self);
    }
}
