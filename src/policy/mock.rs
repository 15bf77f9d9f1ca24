use parking_lot::Mutex;

use super::{RequestHandler, ResponseHandler};
use crate::command::RemoteCommand;

/// One outcome reported to a [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    RequestSuccessful(String),
    RequestFailed(String, String),
    RequestRejected(String, String),
    ResponseSuccessful(String),
    ResponseFailed(String, String),
}

/// Records every outcome for tests to inspect.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }

    fn record(&self, outcome: Outcome) {
        self.outcomes.lock().push(outcome);
    }
}

impl RequestHandler for RecordingHandler {
    fn request_successful(&self, command: &dyn RemoteCommand) {
        self.record(Outcome::RequestSuccessful(command.name().to_string()));
    }

    fn request_failed(&self, command: &dyn RemoteCommand, message: &str) {
        self.record(Outcome::RequestFailed(
            command.name().to_string(),
            message.to_string(),
        ));
    }

    fn request_rejected(&self, command: &dyn RemoteCommand, message: &str) {
        self.record(Outcome::RequestRejected(
            command.name().to_string(),
            message.to_string(),
        ));
    }
}

impl ResponseHandler for RecordingHandler {
    fn response_successful(&self, command: &dyn RemoteCommand) {
        self.record(Outcome::ResponseSuccessful(command.name().to_string()));
    }

    fn response_failed(&self, command: &dyn RemoteCommand, message: &str) {
        self.record(Outcome::ResponseFailed(
            command.name().to_string(),
            message.to_string(),
        ));
    }
}
