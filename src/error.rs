//! Error taxonomies for the bridge and the orchestrator.
//!
//! Configuration errors fail fast at the point of misuse. Lookup misses
//! (a result code with no matching requester, a stale state key) are not
//! errors and surface as `Option`/silent drops at their call sites.

use crate::ids::HostId;
use thiserror::Error;

/// Errors raised while installing or persisting a lifecycle bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Host metadata named a provider nobody registered.
    #[error("no bridge provider registered under name '{0}'")]
    UnknownProvider(String),

    /// The active provider cannot attach to this kind of host.
    #[error("{0} does not support retained attachments")]
    UnsupportedHost(HostId),

    /// Bookkeeping could not be encoded into the opaque state container.
    #[error("state encoding failed: {0}")]
    State(#[from] serde_json::Error),
}

/// Errors raised while reconstructing persisted transition handlers.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// A saved handler names a tag with no registered constructor.
    #[error("no transition handler registered for tag '{0}'")]
    UnknownHandlerTag(String),

    /// Handler state could not be encoded.
    #[error("handler state encoding failed: {0}")]
    State(#[from] serde_json::Error),
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result alias for transition operations.
pub type TransitionResult<T> = Result<T, TransitionError>;

/// Result alias for state-container encoding.
pub type StateResult<T> = Result<T, serde_json::Error>;
