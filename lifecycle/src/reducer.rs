//! Reducer that hosts the engine inside a [`carelane_runtime::Store`].
//!
//! The store reduces every action under one write lock, which gives the
//! engine what it needs from a host: transitions on one request are
//! serialised, and an actor's capacity check and load increment cannot
//! interleave with another assignment.
//!
//! Accepted changes are persisted by an [`Effect::Future`] that runs after
//! the lock is released. Emergency acceptance deadlines are an
//! [`Effect::Delay`] that comes back as [`LifecycleAction::AcceptDeadlineElapsed`]
//! and goes through the same gated transition path as any other caller.

use crate::assignment::{assign_and_advance, dispatch_queue, release_actor};
use crate::config::LifecycleConfig;
use crate::domain::graph;
use crate::error::{LifecycleError, RepositoryError};
use crate::machine::{TransitionContext, TransitionPayload, attempt_transition, submit};
use crate::payment::record_payment;
use crate::permissions::Caller;
use crate::repository::RequestRepository;
use crate::request::{Request, RequestDraft};
use crate::stats::{Stats, StatsQuery, aggregate};
use crate::status::{DomainType, Status};
use crate::types::{Actor, ActorId, PaymentStatus, RequestId};
use carelane_core::environment::Clock;
use carelane_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// State
// ============================================================================

/// Requests and the actor roster held by one host.
#[derive(Clone, Debug, Default)]
pub struct LifecycleState {
    /// Requests by id
    pub requests: HashMap<RequestId, Request>,
    /// Actor roster, shared by every request of every provider
    pub actors: Vec<Actor>,
    /// Why the last command was rejected, or the last failed save
    pub last_error: Option<LifecycleError>,
}

impl LifecycleState {
    /// A request by id
    #[must_use]
    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.requests.get(&id)
    }

    /// An actor by id
    #[must_use]
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|actor| actor.id == id)
    }

    /// Emergencies waiting for a crew, most urgent first
    #[must_use]
    pub fn dispatch_queue(&self) -> Vec<&Request> {
        dispatch_queue(self.requests.values())
    }

    /// Statistics over every held request
    #[must_use]
    pub fn stats(&self, query: &StatsQuery) -> Stats {
        aggregate(self.requests.values(), query)
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Commands sent by callers and events recorded by the reducer.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleAction {
    // Commands
    /// Create a request from a draft
    SubmitRequest {
        /// What to create
        draft: RequestDraft,
    },

    /// Add an actor to the roster (or replace its profile, keeping its load).
    /// Rejected if the load would exceed the profile's `max_concurrent`.
    RegisterActor {
        /// Actor profile
        actor: Actor,
    },

    /// Mark an actor available or not
    SetActorAvailability {
        /// Actor
        actor_id: ActorId,
        /// New availability
        available: bool,
    },

    /// Move a request to a new status
    RequestTransition {
        /// Request
        id: RequestId,
        /// Target status
        target: Status,
        /// Acting party
        caller: Caller,
        /// Reason, new schedule or actual distance
        payload: TransitionPayload,
    },

    /// Bind an actor and advance along the assignment edge
    AssignActor {
        /// Request
        id: RequestId,
        /// Acting party
        caller: Caller,
    },

    /// Record a payment change
    RecordPayment {
        /// Request
        id: RequestId,
        /// New payment status
        to: PaymentStatus,
        /// Acting party
        caller: Caller,
    },

    /// The acceptance deadline of a request passed
    AcceptDeadlineElapsed {
        /// Request
        id: RequestId,
    },

    // Events
    /// A request was created
    RequestSubmitted {
        /// The new request
        request: Request,
    },

    /// A request moved
    TransitionApplied {
        /// The request after the move
        request: Request,
        /// Status before
        from: Status,
        /// Actor whose load is released
        released_actor: Option<ActorId>,
    },

    /// An actor was bound and the request advanced; the actor takes one
    /// unit of load
    ActorAssigned {
        /// The request after the move
        request: Request,
        /// Bound actor
        actor_id: ActorId,
    },

    /// An actor joined the roster
    ActorRegistered {
        /// Actor profile
        actor: Actor,
    },

    /// An actor's availability changed
    ActorAvailabilityChanged {
        /// Actor
        actor_id: ActorId,
        /// New availability
        available: bool,
    },

    /// A payment change was recorded
    PaymentRecorded {
        /// The request after the change
        request: Request,
    },

    /// A command was rejected
    CommandRejected {
        /// Request concerned, if any
        id: Option<RequestId>,
        /// Why
        error: LifecycleError,
    },

    /// Saving a request failed
    PersistenceFailed {
        /// Request concerned
        id: RequestId,
        /// Why
        error: RepositoryError,
    },
}

impl LifecycleAction {
    /// Whether this action is a command (as opposed to a recorded event)
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::SubmitRequest { .. }
                | Self::RegisterActor { .. }
                | Self::SetActorAvailability { .. }
                | Self::RequestTransition { .. }
                | Self::AssignActor { .. }
                | Self::RecordPayment { .. }
                | Self::AcceptDeadlineElapsed { .. }
        )
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies injected into the reducer.
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Source of every timestamp
    pub clock: Arc<dyn Clock>,
    /// Engine configuration
    pub config: Arc<LifecycleConfig>,
    /// Where accepted requests are saved
    pub repository: Arc<dyn RequestRepository>,
}

impl LifecycleEnvironment {
    /// Bundle the dependencies
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
        repository: Arc<dyn RequestRepository>,
    ) -> Self {
        Self {
            clock,
            config: Arc::new(config),
            repository,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer driving the lifecycle engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Apply an event to state. Commands are ignored.
    fn apply_event(state: &mut LifecycleState, action: &LifecycleAction) {
        match action {
            LifecycleAction::RequestSubmitted { request }
            | LifecycleAction::PaymentRecorded { request } => {
                state.requests.insert(request.id, request.clone());
            },
            LifecycleAction::ActorAssigned { request, actor_id } => {
                if let Some(actor) = state.actors.iter_mut().find(|a| a.id == *actor_id) {
                    actor.current_load = actor.current_load.saturating_add(1);
                }
                state.requests.insert(request.id, request.clone());
            },
            LifecycleAction::TransitionApplied {
                request,
                released_actor,
                ..
            } => {
                if let Some(actor_id) = released_actor {
                    release_actor(&mut state.actors, *actor_id);
                }
                state.requests.insert(request.id, request.clone());
            },
            LifecycleAction::ActorRegistered { actor } => {
                match state.actors.iter_mut().find(|a| a.id == actor.id) {
                    Some(existing) => {
                        let load = existing.current_load;
                        *existing = actor.clone();
                        existing.current_load = load;
                    },
                    None => state.actors.push(actor.clone()),
                }
            },
            LifecycleAction::ActorAvailabilityChanged {
                actor_id,
                available,
            } => {
                if let Some(actor) = state.actors.iter_mut().find(|a| a.id == *actor_id) {
                    actor.is_available = *available;
                }
            },
            LifecycleAction::CommandRejected { error, .. } => {
                state.last_error = Some(error.clone());
            },
            LifecycleAction::PersistenceFailed { error, .. } => {
                state.last_error = Some(LifecycleError::Repository(error.clone()));
            },
            LifecycleAction::SubmitRequest { .. }
            | LifecycleAction::RegisterActor { .. }
            | LifecycleAction::SetActorAvailability { .. }
            | LifecycleAction::RequestTransition { .. }
            | LifecycleAction::AssignActor { .. }
            | LifecycleAction::RecordPayment { .. }
            | LifecycleAction::AcceptDeadlineElapsed { .. } => {},
        }
    }

    fn reject(
        state: &mut LifecycleState,
        id: Option<RequestId>,
        error: impl Into<LifecycleError>,
    ) -> SmallVec<[Effect<LifecycleAction>; 4]> {
        let error = error.into();
        tracing::warn!(request_id = ?id, %error, "Command rejected");
        Self::apply_event(state, &LifecycleAction::CommandRejected { id, error });
        SmallVec::new()
    }

    fn persist(env: &LifecycleEnvironment, request: Request) -> Effect<LifecycleAction> {
        let repository = Arc::clone(&env.repository);
        Effect::Future(Box::pin(async move {
            let id = request.id;
            match repository.save(request).await {
                Ok(_) => None,
                Err(error) => Some(LifecycleAction::PersistenceFailed { id, error }),
            }
        }))
    }

    fn count_transition(domain: DomainType, outcome: &'static str) {
        metrics::counter!(
            "lifecycle.transitions.total",
            "domain" => domain.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }

    fn count_assignment(domain: DomainType, outcome: &'static str) {
        metrics::counter!(
            "lifecycle.assignments.total",
            "domain" => domain.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

impl Reducer for LifecycleReducer {
    type State = LifecycleState;
    type Action = LifecycleAction;
    type Environment = LifecycleEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per command
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let now = env.clock.now();
        if action.is_command() {
            state.last_error = None;
        }

        match action {
            // ========== Commands ==========
            LifecycleAction::SubmitRequest { draft } => {
                let domain = draft.domain;
                let request = match submit(draft, &env.config, now) {
                    Ok(request) => request,
                    Err(error) => return Self::reject(state, None, error),
                };
                let id = request.id;

                Self::apply_event(
                    state,
                    &LifecycleAction::RequestSubmitted {
                        request: request.clone(),
                    },
                );

                let mut effects = smallvec![Self::persist(env, request)];
                if let Some(duration) = env.config.rules(domain).accept_timeout {
                    tracing::debug!(request_id = %id, ?duration, "Acceptance deadline scheduled");
                    effects.push(Effect::Delay {
                        duration,
                        action: Box::new(LifecycleAction::AcceptDeadlineElapsed { id }),
                    });
                }
                effects
            },

            LifecycleAction::RegisterActor { actor } => {
                let load = state
                    .actor(actor.id)
                    .map_or(actor.current_load, |existing| existing.current_load);
                if load > actor.max_concurrent {
                    return Self::reject(
                        state,
                        None,
                        LifecycleError::CapacityBelowLoad {
                            actor_id: actor.id,
                            load,
                            max_concurrent: actor.max_concurrent,
                        },
                    );
                }
                tracing::info!(actor_id = %actor.id, name = %actor.name, "Actor registered");
                Self::apply_event(state, &LifecycleAction::ActorRegistered { actor });
                SmallVec::new()
            },

            LifecycleAction::SetActorAvailability {
                actor_id,
                available,
            } => {
                if state.actor(actor_id).is_none() {
                    return Self::reject(state, None, LifecycleError::UnknownActor(actor_id));
                }
                Self::apply_event(
                    state,
                    &LifecycleAction::ActorAvailabilityChanged {
                        actor_id,
                        available,
                    },
                );
                SmallVec::new()
            },

            LifecycleAction::RequestTransition {
                id,
                target,
                caller,
                payload,
            } => {
                let Some(request) = state.request(id) else {
                    return Self::reject(state, Some(id), LifecycleError::UnknownRequest(id));
                };
                let domain = request.domain();
                let ctx = TransitionContext::new(now, &env.config);

                match attempt_transition(request, target, &caller, &payload, &ctx) {
                    Ok(transition) => {
                        Self::count_transition(domain, "applied");
                        let saved = transition.request.clone();
                        Self::apply_event(
                            state,
                            &LifecycleAction::TransitionApplied {
                                request: transition.request,
                                from: transition.from,
                                released_actor: transition.released_actor,
                            },
                        );
                        smallvec![Self::persist(env, saved)]
                    },
                    Err(error) => {
                        Self::count_transition(domain, "rejected");
                        Self::reject(state, Some(id), error)
                    },
                }
            },

            LifecycleAction::AssignActor { id, caller } => {
                let Some(request) = state.requests.get(&id) else {
                    return Self::reject(state, Some(id), LifecycleError::UnknownRequest(id));
                };
                let domain = request.domain();
                let ctx = TransitionContext::new(now, &env.config);

                // Selection runs on a scratch roster; the reservation itself is
                // applied by the ActorAssigned event.
                let mut roster = state.actors.clone();
                match assign_and_advance(request, &mut roster, &caller, &ctx) {
                    Ok(transition) => {
                        Self::count_assignment(domain, "assigned");
                        let Some(actor_id) = transition.request.assigned_actor_id else {
                            return SmallVec::new();
                        };
                        let saved = transition.request.clone();
                        Self::apply_event(
                            state,
                            &LifecycleAction::ActorAssigned {
                                request: transition.request,
                                actor_id,
                            },
                        );
                        smallvec![Self::persist(env, saved)]
                    },
                    Err(error) => {
                        Self::count_assignment(domain, "rejected");
                        Self::reject(state, Some(id), error)
                    },
                }
            },

            LifecycleAction::RecordPayment { id, to, caller } => {
                let Some(request) = state.request(id) else {
                    return Self::reject(state, Some(id), LifecycleError::UnknownRequest(id));
                };

                match record_payment(request, to, &caller, now) {
                    Ok(request) => {
                        let saved = request.clone();
                        Self::apply_event(state, &LifecycleAction::PaymentRecorded { request });
                        smallvec![Self::persist(env, saved)]
                    },
                    Err(error) => Self::reject(state, Some(id), error),
                }
            },

            LifecycleAction::AcceptDeadlineElapsed { id } => {
                let Some(request) = state.request(id) else {
                    return SmallVec::new();
                };
                let g = graph(request.domain());
                let bound = g
                    .assignment
                    .and_then(|(_, to)| to.milestone())
                    .is_some_and(|milestone| request.milestone(milestone).is_some());
                let cancelled = g.terminal.iter().copied().find(|s| s.is_cancelled());

                match cancelled {
                    Some(target) if !bound && !g.is_terminal(request.status) => {
                        tracing::info!(request_id = %id, status = %request.status, "Acceptance deadline elapsed");
                        self.reduce(
                            state,
                            LifecycleAction::RequestTransition {
                                id,
                                target,
                                caller: Caller::system(),
                                payload: TransitionPayload::reason("acceptance deadline elapsed"),
                            },
                            env,
                        )
                    },
                    _ => {
                        tracing::debug!(request_id = %id, "Deadline elapsed after acceptance, ignored");
                        SmallVec::new()
                    },
                }
            },

            // ========== Events ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
