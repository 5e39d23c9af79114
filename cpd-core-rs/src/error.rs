//! Error types
//!
//! [`DispatchError`] is returned synchronously, before a task exists.
//! [`FailureReason`] is what a single target ends up with once a task is
//! running; it never aborts the other targets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskId;
use crate::types::ChargeBoxId;

/// Errors surfaced to the caller of a dispatch operation
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unsupported OCPP protocol: {0:?}")]
    UnsupportedProtocol(String),

    #[error("No charge points matched the command target")]
    NoTargets,

    #[error("Unknown charge point: {0}")]
    UnknownEndpoint(ChargeBoxId),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unknown task: {0}")]
    TaskNotFound(TaskId),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors reported by an endpoint repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed charge point records: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

/// Rejection returned by a sender when the command could not be handed to
/// the transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("charge point {0} is not connected")]
    NotConnected(ChargeBoxId),

    #[error("charge point {0} has no endpoint address")]
    NoEndpointAddress(ChargeBoxId),

    #[error("could not encode request: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Terminal failure of a single target
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureReason {
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("send failed: {0}")]
    TransportSend(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("charge point reported {code}: {description}")]
    Remote { code: String, description: String },
}
