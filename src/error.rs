//! Error taxonomy shared by the parser, the actions and the engine.

use std::error::Error as StdError;

use crate::{db::DbError, engine::validate::ValidationReport, persist::PersistError};

/// Boxed underlying cause.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Data-dependent failure: malformed changelog, rule violation, drift,
/// duplicate id, unmet execution precondition.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ChangeValidationError {
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl ChangeValidationError {
    /// Error without an underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Error wrapping `cause`.
    pub fn with_cause(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// The message without any cause.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-wraps this error under a more specific message.
    pub fn wrap(self, message: impl Into<String>) -> Self {
        Self::with_cause(message, self)
    }
}

/// The target database cannot be resolved or reached.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StartupError(pub String);

/// Top-level engine error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fatal before any change set is looked at.
    #[error(transparent)]
    Startup(#[from] StartupError),
    /// Fatal to the current change set or run.
    #[error(transparent)]
    ChangeValidation(#[from] ChangeValidationError),
    /// Infrastructure failure from the document store.
    #[error(transparent)]
    Database(#[from] DbError),
    /// The audit store failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// Collect-all validation finished with at least one failure.
    #[error("Validation failed. See the error(s) above for details.")]
    ValidationFailed(Box<ValidationReport>),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Lowercases the first character, used when a message is embedded after a prefix.
pub(crate) fn uncapitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Error while processing change log [<path>]: <cause>`.
pub(crate) fn changelog_error(path: &str, cause: &str) -> String {
    format!(
        "Error while processing change log [{path}]: {}",
        uncapitalize(cause)
    )
}

/// Duplicate id within a single run.
pub(crate) fn duplicate_id_error(path: &str, global_unique_change_id: &str) -> String {
    format!(
        "Error while processing change log [{path}]: globalUniqueChangeId '{global_unique_change_id}' is found multiple times, but globalUniqueChangeId should be unique across change sets."
    )
}
