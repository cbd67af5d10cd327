//! Errors surfaced to callers of the file, command and tmux layers

use std::io;

use thiserror::Error;

use crate::ssh::SshError;

pub type Result<T, E = LinkError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Timed out after {secs}s connecting to {endpoint}")]
    Timeout { endpoint: String, secs: u64 },

    #[error("Command `{command}` failed: {stderr}")]
    Command {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("Command `{command}` did not finish within {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Directory is not empty: {0}")]
    NotEmpty(String),

    #[error("Source and destination are the same file: {0}")]
    SameFile(String),

    #[error("Size walk cancelled at {0}")]
    Cancelled(String),

    #[error("No remote endpoint is configured")]
    NoRemoteEndpoint,

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("SFTP error on {path}: {message}")]
    Sftp { path: String, message: String },

    #[error(transparent)]
    Ssh(#[from] SshError),
}

impl LinkError {
    /// Wrap a local I/O error, promoting `NotFound` to its own variant.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            LinkError::NotFound(path)
        } else {
            LinkError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LinkError::NotFound(_))
    }

    /// The remote transport dropped underneath the operation.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, LinkError::Ssh(e) if e.is_connection_lost())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_promoted() {
        let err = LinkError::io("/tmp/x", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "No such file or directory: /tmp/x");

        let err = LinkError::io("/tmp/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, LinkError::Io { .. }));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = LinkError::Timeout {
            endpoint: "pi@10.0.0.2".into(),
            secs: 5,
        };
        assert!(err.to_string().contains("pi@10.0.0.2"));

        let err = LinkError::Command {
            command: "false".into(),
            stderr: "boom".into(),
            exit_code: Some(1),
        };
        assert_eq!(err.to_string(), "Command `false` failed: boom");
    }

    #[test]
    fn test_connection_lost_passthrough() {
        assert!(LinkError::Ssh(SshError::Disconnected).is_connection_lost());
        assert!(!LinkError::NotEmpty("/a".into()).is_connection_lost());
    }
}
