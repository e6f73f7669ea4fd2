//! Error types for store and command operations
//!
//! Errors are classified by origin:
//! - Validation: bad input, rejected before any write
//! - NotFound / Duplicate: profile lookup failures
//! - Io / Ini / Json: filesystem and codec failures during a write sequence

use thiserror::Error;

/// Error type shared by the AWS file store and the account metadata store.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{0}")]
    Validation(String),

    #[error("Profile \"{0}\" not found")]
    ProfileNotFound(String),

    #[error("Profile \"{0}\" already exists")]
    DuplicateProfile(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("INI error: {0}")]
    Ini(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<std::io::Error> for ProfileError {
    fn from(err: std::io::Error) -> Self {
        ProfileError::Io(err.to_string())
    }
}

/// Serializable error representation for the command surface.
///
/// The UI shell only ever sees this shape; store errors never cross the
/// boundary as panics or raw error types.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub message: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Io,
    /// External tool (AWS CLI) failure. The triggering operation's own
    /// success is unaffected; callers report this as a soft outcome.
    External,
    Internal,
}

impl CommandError {
    pub fn external(message: impl Into<String>) -> Self {
        CommandError {
            message: message.into(),
            kind: ErrorKind::External,
        }
    }
}

impl From<ProfileError> for CommandError {
    fn from(err: ProfileError) -> Self {
        let kind = match &err {
            ProfileError::Validation(_) | ProfileError::DuplicateProfile(_) => {
                ErrorKind::Validation
            }
            ProfileError::ProfileNotFound(_) => ErrorKind::NotFound,
            ProfileError::Io(_) => ErrorKind::Io,
            ProfileError::Ini(_) | ProfileError::Json(_) | ProfileError::Configuration(_) => {
                ErrorKind::Internal
            }
        };
        CommandError {
            message: err.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandError {}
