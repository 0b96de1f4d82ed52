use crate::domain::inventory::PartId;
use crate::domain::order::OrderId;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Stable, machine-readable classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Forbidden,
    InvalidTransition,
    NotFound,
    InsufficientInventory,
    TransitionFailed,
    TimeoutExceeded,
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientInventory => "insufficient_inventory",
            ErrorKind::TransitionFailed => "transition_failed",
            ErrorKind::TimeoutExceeded => "timeout_exceeded",
            ErrorKind::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the order engine to its callers.
///
/// Every variant leaves the order exactly as it was before the call.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Order {0} not found")]
    NotFound(OrderId),
    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(CollaboratorError),
    #[error("Transition failed: {cause}")]
    TransitionFailed { cause: FailureCause },
    #[error("Timed out after {budget:?} waiting for order {order_id}")]
    TimeoutExceeded { order_id: OrderId, budget: Duration },
    #[error("Validation error: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::InsufficientInventory(_) => ErrorKind::InsufficientInventory,
            EngineError::TransitionFailed { .. } => ErrorKind::TransitionFailed,
            EngineError::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            EngineError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Human-readable detail, suitable for showing to the caller.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::TransitionFailed {
            cause: FailureCause::Store(err),
        }
    }
}

impl From<CollaboratorError> for EngineError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::InsufficientStock { .. } => EngineError::InsufficientInventory(err),
            other => EngineError::TransitionFailed {
                cause: FailureCause::Collaborator(other),
            },
        }
    }
}

/// What made a staged transition fail.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Collaborator(CollaboratorError),
}

impl FailureCause {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FailureCause::Store(StoreError::Timeout(_))
                | FailureCause::Collaborator(CollaboratorError::Timeout { .. })
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Version conflict on order {order_id}: expected {expected}, found {found}")]
    Conflict {
        order_id: OrderId,
        expected: u64,
        found: u64,
    },
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        StoreError::Unavailable(err.into_string())
    }
}

/// Failure reported by an external collaborator (inventory, billing, notifications).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {detail}")]
    Unavailable {
        service: &'static str,
        detail: String,
    },
    #[error("part {part_id}: requested {requested}, available {available}")]
    InsufficientStock {
        part_id: PartId,
        requested: u32,
        available: u32,
    },
    #[error("{service} rejected the request: {detail}")]
    Rejected {
        service: &'static str,
        detail: String,
    },
    #[error("{service} did not answer within {budget:?}")]
    Timeout {
        service: &'static str,
        budget: Duration,
    },
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable { .. } | CollaboratorError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortage_maps_to_insufficient_inventory() {
        let err: EngineError = CollaboratorError::InsufficientStock {
            part_id: PartId::new("screen"),
            requested: 2,
            available: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InsufficientInventory);
        assert!(err.detail().contains("screen"));
    }

    #[test]
    fn test_collaborator_timeout_is_transition_failure() {
        let err: EngineError = CollaboratorError::Timeout {
            service: "billing",
            budget: Duration::from_millis(10),
        }
        .into();
        match err {
            EngineError::TransitionFailed { cause } => assert!(cause.is_timeout()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(ErrorKind::InvalidTransition.as_str(), "invalid_transition");
        assert_eq!(
            serde_json::to_string(&ErrorKind::TimeoutExceeded).unwrap(),
            "\"timeout_exceeded\""
        );
    }
}
