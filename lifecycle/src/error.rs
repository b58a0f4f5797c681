//! Error types for the lifecycle engine.
//!
//! Every expected business outcome is a value, not a panic. The enums are
//! `Clone + PartialEq` so a reducer can keep the last failure in state and
//! tests can compare them directly.

use crate::status::Status;
use crate::types::{ActorId, PaymentStatus, RequestId, Role};
use carelane_core::Version;
use thiserror::Error;

/// Rejections from the state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    /// The requested edge does not exist in the domain graph
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition {
        /// Current status
        from: Status,
        /// Requested status
        to: Status,
    },

    /// The caller may not take this edge (role or ownership)
    #[error("{role} is not authorized to move from {from} to {to}")]
    Unauthorized {
        /// Acting role
        role: Role,
        /// Current status
        from: Status,
        /// Requested status
        to: Status,
    },

    /// A domain precondition does not hold
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Finalising the cost failed
    #[error(transparent)]
    Cost(#[from] CostError),
}

/// Rejections from the assignment policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssignmentError {
    /// No candidate survived filtering
    #[error("no eligible actor")]
    NoEligibleActor,

    /// The request already holds an actor
    #[error("request already assigned to actor {0}")]
    AlreadyAssigned(ActorId),

    /// The request is not in a status that accepts an actor
    #[error("request in {status} cannot be assigned")]
    NotAssignable {
        /// Current status
        status: Status,
    },

    /// Advancing along the assignment edge failed; nothing was bound
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Rejections from cost computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CostError {
    /// Negative, non-finite or overflowing input
    #[error("invalid cost input: {0}")]
    InvalidCostInput(String),
}

/// Rejections from the payment axis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The payment status cannot move this way
    #[error("illegal payment transition from {from} to {to}")]
    IllegalPaymentTransition {
        /// Current payment status
        from: PaymentStatus,
        /// Requested payment status
        to: PaymentStatus,
    },

    /// The caller may not record this payment change
    #[error("{role} may not record payment {to}")]
    Unauthorized {
        /// Acting role
        role: Role,
        /// Requested payment status
        to: PaymentStatus,
    },
}

/// Failures of a request repository.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No request stored under this id
    #[error("request not found: {0}")]
    NotFound(RequestId),

    /// A different request is already stored at the same version
    #[error("concurrency conflict on {id} at version {version}")]
    ConcurrencyConflict {
        /// Request being saved
        id: RequestId,
        /// Version both writers produced
        version: Version,
    },
}

/// Umbrella error for hosts driving the engine through the reducer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// See [`TransitionError`]
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// See [`AssignmentError`]
    #[error(transparent)]
    Assignment(#[from] AssignmentError),

    /// See [`CostError`]
    #[error(transparent)]
    Cost(#[from] CostError),

    /// See [`PaymentError`]
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// See [`RepositoryError`]
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The command names a request the host does not hold
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    /// The command names an actor the host does not hold
    #[error("unknown actor {0}")]
    UnknownActor(ActorId),

    /// Registering the actor would leave its load above its capacity
    #[error("actor {actor_id} carries {load} assignments, above max_concurrent {max_concurrent}")]
    CapacityBelowLoad {
        /// Actor being registered
        actor_id: ActorId,
        /// Load the actor would carry
        load: u32,
        /// Capacity in the new profile
        max_concurrent: u32,
    },
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
