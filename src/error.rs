//! Error type shared by engines, handlers, and connections.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A command handler was asked to handle a command before it had an owner.
    #[error("No owner set!")]
    NoOwner,

    #[error("{label} directory does not exist: {}", path.display())]
    MissingDirectory { label: &'static str, path: PathBuf },

    #[error("{label} directory is not a directory: {}", path.display())]
    NotADirectory { label: &'static str, path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The engine was stopped. Stopped is terminal.
    #[error("engine has been stopped")]
    Stopped,

    /// The command queue was resized while a producer waited on it.
    #[error("command queue was replaced before the command was queued")]
    QueueReplaced,

    #[error("failed to parse command: {0}")]
    Parse(String),

    #[error("failed to send command: {0}")]
    Send(String),

    #[error("{0}")]
    Handler(String),

    /// Errors collected from several child engines.
    #[error("{}", .0.join("\n"))]
    Multiple(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_owner_message() {
        assert_eq!(Error::NoOwner.to_string(), "No owner set!");
    }

    #[test]
    fn multiple_joins_lines() {
        let err = Error::Multiple(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "first\nsecond");
    }

    #[test]
    fn directory_errors_name_the_label() {
        let err = Error::MissingDirectory {
            label: "incoming",
            path: PathBuf::from("/nope"),
        };
        assert!(err.to_string().starts_with("incoming directory"));
        assert!(err.to_string().contains("/nope"));
    }
}
