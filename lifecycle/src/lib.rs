//! Carelane lifecycle engine - service requests in a healthcare marketplace
//!
//! One engine drives every provider category the marketplace serves:
//!
//! - **Provider verification**: platform staff review a provider's documents
//! - **Emergency**: an ambulance call, paid up front, dispatched, completed
//! - **Pharmacy order**: verified, prepared, dispatched with a courier
//! - **Lab order**: sample collected, processed, reported
//! - **Homecare booking**: confirmed with a caregiver, possibly rescheduled
//!
//! # Architecture
//!
//! ```text
//!   caller ──► Permission Gate ──► State Machine ──► Request (new value)
//!                                     │     │
//!                      Assignment ◄───┘     └───► Pricing
//!                          │
//!                     Actor roster                Stats ◄── Requests
//! ```
//!
//! Each domain is data ([`domain::DomainGraph`]): its edges, the roles
//! allowed on each edge, the edge that binds an actor. The engine functions
//! are synchronous and side-effect free apart from the `&mut` they are
//! handed. [`reducer::LifecycleReducer`] hosts them inside a
//! [`carelane_runtime::Store`], which serialises every change under one lock
//! and runs persistence and SLA timers as effects.
//!
//! # Usage
//!
//! ```no_run
//! use carelane_lifecycle::{
//!     Caller, DomainType, LifecycleConfig, RequestDraft, Status, TransitionContext,
//!     TransitionPayload, attempt_transition, submit,
//! };
//! use carelane_lifecycle::status::VerificationStatus;
//! use carelane_lifecycle::types::{ProviderId, SubjectId};
//! use chrono::Utc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LifecycleConfig::default();
//! let draft = RequestDraft::new(
//!     DomainType::ProviderVerification,
//!     ProviderId::new(),
//!     SubjectId::new(),
//!     "Nile Valley Clinic",
//! );
//! let case = submit(draft, &config, Utc::now())?;
//!
//! let ctx = TransitionContext::new(Utc::now(), &config);
//! let verified = attempt_transition(
//!     &case,
//!     Status::ProviderVerification(VerificationStatus::Verified),
//!     &Caller::platform(),
//!     &TransitionPayload::default(),
//!     &ctx,
//! )?;
//! assert_eq!(verified.request.version, case.version.next());
//! # Ok(())
//! # }
//! ```

pub mod assignment;
pub mod config;
pub mod domain;
pub mod error;
pub mod machine;
pub mod payment;
pub mod permissions;
pub mod pricing;
pub mod reducer;
pub mod repository;
pub mod request;
pub mod stats;
pub mod status;
pub mod types;

pub use assignment::{TieBreak, assign_actor, assign_and_advance, dispatch_queue, release_actor};
pub use config::{DomainRules, LifecycleConfig};
pub use error::{
    AssignmentError, CostError, LifecycleError, PaymentError, RepositoryError, Result,
    TransitionError,
};
pub use machine::{
    Transition, TransitionContext, TransitionPayload, attempt_transition, available_transitions,
    submit,
};
pub use payment::record_payment;
pub use permissions::{Caller, is_authorized};
pub use pricing::{Cost, CostInput, Discount, PricingConfig, PricingRule, compute_cost};
pub use reducer::{LifecycleAction, LifecycleEnvironment, LifecycleReducer, LifecycleState};
pub use repository::{InMemoryRequestRepository, RequestRepository};
pub use request::{Request, RequestDraft};
pub use stats::{GroupKey, GroupSummary, Stats, StatsQuery, aggregate};
pub use status::{DomainType, Milestone, Status};
pub use types::{Actor, ActorId, Money, ProviderId, RequestId, Role, SubjectId};
