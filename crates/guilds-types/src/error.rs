//! Error taxonomy for the guilds service, one enum per concern.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::PayloadKind;

/// Errors from broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker unreachable. Fatal at the process level; not retried here.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// No matching RPC reply arrived within the bound.
    #[error("rpc timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A correlated reply arrived, but its payload is not the expected kind.
    #[error("expected reply of kind {expected}, received {actual}")]
    UnexpectedResponseType {
        expected: PayloadKind,
        actual: PayloadKind,
    },

    #[error("publish to '{destination}' failed: {reason}")]
    Publish { destination: String, reason: String },

    /// A wire body could not be decoded into a known payload.
    #[error("failed to decode delivery: {0}")]
    Decode(String),

    /// The broker (or one of its consumer streams) has been closed.
    #[error("broker closed")]
    Closed,
}

/// Errors from command/query dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registered handler for the payload kind. Fatal configuration
    /// error: never retried, never swallowed.
    #[error("no handler registered for {0}")]
    HandlerNotFound(PayloadKind),

    /// A handler was invoked with a payload variant it does not handle.
    #[error("handler for {expected} invoked with {actual}")]
    UnexpectedPayload {
        expected: PayloadKind,
        actual: PayloadKind,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Errors from the aggregate mutation pipeline: a mutation persists through
/// the store and then emits a notification through the broker, and either
/// step can fail.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Errors from persistence collaborators, propagated verbatim to the caller.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Wire-level classification of a query failure, carried by the `Fault`
/// reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    HandlerNotFound,
    UnexpectedPayload,
    Repository,
    Broker,
}

impl From<&DispatchError> for FaultKind {
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::HandlerNotFound(_) => FaultKind::HandlerNotFound,
            DispatchError::UnexpectedPayload { .. } => FaultKind::UnexpectedPayload,
            DispatchError::Repository(_) | DispatchError::Service(ServiceError::Repository(_)) => {
                FaultKind::Repository
            }
            DispatchError::Broker(_) | DispatchError::Service(ServiceError::Broker(_)) => {
                FaultKind::Broker
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
