//! The lifecycle state machine.
//!
//! [`attempt_transition`] is the only way a request changes status. It is a
//! pure function from the current request to a new one: on failure the
//! caller keeps the value it passed in, untouched.

use crate::config::LifecycleConfig;
use crate::domain::{CancellationPolicy, graph};
use crate::error::{CostError, TransitionError};
use crate::permissions::{Caller, can_ever_reach, owns};
use crate::pricing::{Cost, compute_cost};
use crate::request::{Request, RequestDraft};
use crate::status::{EmergencyStatus, HomecareStatus, Milestone, Status};
use crate::types::{ActorId, PaymentStatus, RequestId};
use carelane_core::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra data some transitions carry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Rejection or cancellation reason
    pub reason: Option<String>,
    /// New service time (reschedule)
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Distance actually travelled, used when finalising cost
    pub actual_distance_km: Option<f64>,
}

impl TransitionPayload {
    /// Payload carrying a reason
    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Payload carrying a new service time
    #[must_use]
    pub fn reschedule(at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at: Some(at),
            ..Self::default()
        }
    }

    /// Payload carrying the distance actually travelled
    #[must_use]
    pub fn actual_distance(km: f64) -> Self {
        Self {
            actual_distance_km: Some(km),
            ..Self::default()
        }
    }
}

/// Ambient inputs of a transition.
#[derive(Clone, Copy, Debug)]
pub struct TransitionContext<'a> {
    /// Current time, from the host's clock
    pub now: DateTime<Utc>,
    /// Engine configuration
    pub config: &'a LifecycleConfig,
}

impl<'a> TransitionContext<'a> {
    /// Bundle a timestamp and a configuration
    #[must_use]
    pub const fn new(now: DateTime<Utc>, config: &'a LifecycleConfig) -> Self {
        Self { now, config }
    }
}

/// An accepted transition.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// The request after the move
    pub request: Request,
    /// Status before
    pub from: Status,
    /// Status after
    pub to: Status,
    /// Actor whose load the host must release
    pub released_actor: Option<ActorId>,
}

/// Create a request from a draft.
///
/// The request starts in its domain's initial status with `Created` stamped
/// and the cost estimated under the domain's pricing rule.
///
/// # Errors
///
/// Returns [`CostError::InvalidCostInput`] if the draft's billable data is
/// invalid.
pub fn submit(
    draft: RequestDraft,
    config: &LifecycleConfig,
    now: DateTime<Utc>,
) -> Result<Request, CostError> {
    let g = graph(draft.domain);

    let mut request = Request {
        id: RequestId::new(),
        provider_id: draft.provider_id,
        subject_id: draft.subject_id,
        subject_name: draft.subject_name,
        status: g.initial,
        assigned_actor_id: None,
        urgency: draft.urgency,
        service_type: draft.service_type,
        required_capability: draft.required_capability,
        location: draft.location,
        scheduled_at: draft.scheduled_at,
        line_items: draft.line_items,
        distance_km: draft.distance_km,
        discount: draft.discount,
        cost: Cost::default(),
        payment_status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
        milestones: BTreeMap::new(),
        reschedule_count: 0,
        reason: None,
        version: Version::INITIAL,
    };

    request.cost = compute_cost(
        &request.cost_input(),
        &config.rules(draft.domain).pricing,
        &config.pricing,
    )?;
    request.stamp(Milestone::Created, now);

    tracing::info!(
        request_id = %request.id,
        status = %request.status,
        total = %request.cost.total(),
        "Request submitted"
    );

    Ok(request)
}

/// Move `request` to `target` on behalf of `caller`.
///
/// Checks run in a fixed order and the first failure wins:
///
/// 1. `target` must belong to the request's domain
/// 2. the caller's role must be able to enter `target` from somewhere
/// 3. the edge `current → target` must exist
/// 4. the caller's role must be permitted on that edge
/// 5. the caller must own the request
/// 6. domain preconditions must hold
///
/// # Errors
///
/// - [`TransitionError::IllegalTransition`] for checks 1 and 3
/// - [`TransitionError::Unauthorized`] for checks 2, 4 and 5
/// - [`TransitionError::PreconditionFailed`] for check 6
/// - [`TransitionError::Cost`] if finalising the cost fails
#[tracing::instrument(
    skip(request, payload, ctx),
    fields(request_id = %request.id, from = %request.status, to = %target, role = %caller.role)
)]
pub fn attempt_transition(
    request: &Request,
    target: Status,
    caller: &Caller,
    payload: &TransitionPayload,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, TransitionError> {
    let from = request.status;
    let domain = request.domain();
    let g = graph(domain);

    let illegal = || TransitionError::IllegalTransition { from, to: target };
    let unauthorized = || TransitionError::Unauthorized {
        role: caller.role,
        from,
        to: target,
    };

    if target.domain() != domain {
        return Err(illegal());
    }
    if g.edges_into(target).next().is_some() && !can_ever_reach(caller.role, domain, target) {
        return Err(unauthorized());
    }
    let edge = g.edge(from, target).ok_or_else(illegal)?;
    if !edge.roles.contains(&caller.role) {
        return Err(unauthorized());
    }
    if !owns(caller, request) {
        return Err(unauthorized());
    }
    check_preconditions(request, target, payload)?;

    let mut next = request.clone();
    next.status = target;
    next.updated_at = ctx.now;
    next.version = request.version.next();
    if let Some(milestone) = target.milestone() {
        next.stamp(milestone, ctx.now);
    }
    if let Some(reason) = &payload.reason {
        next.reason = Some(reason.clone());
    }

    // Payment axis
    if from == Status::Emergency(EmergencyStatus::Pending)
        && target == Status::Emergency(EmergencyStatus::Paid)
        && next.payment_status == PaymentStatus::Pending
    {
        next.payment_status = PaymentStatus::Completed;
    }
    if target.is_cancelled() && next.payment_status == PaymentStatus::Completed {
        next.payment_status = PaymentStatus::Refunded;
    }

    // Actor release
    let released_actor = next.assigned_actor_id.filter(|_| !g.holds_actor(target));
    if released_actor.is_some() {
        let clear = target == Status::HomecareBooking(HomecareStatus::Rescheduled)
            || (target.is_cancelled()
                && ctx.config.rules(domain).cancellation == CancellationPolicy::ClearAssignment);
        if clear {
            next.assigned_actor_id = None;
        }
    }

    // Reschedule loop
    let mut reprice = false;
    if target == Status::HomecareBooking(HomecareStatus::Rescheduled) {
        next.scheduled_at = payload.scheduled_at;
        next.reschedule_count = next.reschedule_count.saturating_add(1);
        reprice = true;
    }

    // Final cost
    if target == g.success {
        if let Some(km) = payload.actual_distance_km {
            next.distance_km = km;
        }
        reprice = true;
    }

    if reprice {
        next.cost = compute_cost(
            &next.cost_input(),
            &ctx.config.rules(domain).pricing,
            &ctx.config.pricing,
        )?;
    }

    tracing::debug!(
        version = %next.version,
        released = ?released_actor,
        "Transition applied"
    );

    Ok(Transition {
        request: next,
        from,
        to: target,
        released_actor,
    })
}

fn check_preconditions(
    request: &Request,
    target: Status,
    payload: &TransitionPayload,
) -> Result<(), TransitionError> {
    let g = graph(request.domain());

    if g.is_assignment_edge(request.status, target) && request.assigned_actor_id.is_none() {
        return Err(TransitionError::PreconditionFailed(format!(
            "{target} requires an assigned actor"
        )));
    }

    if target.is_rejected() && payload.reason.as_deref().is_none_or(|r| r.trim().is_empty()) {
        return Err(TransitionError::PreconditionFailed(
            "rejection requires a reason".to_string(),
        ));
    }

    if target == Status::HomecareBooking(HomecareStatus::Rescheduled)
        && payload.scheduled_at.is_none()
    {
        return Err(TransitionError::PreconditionFailed(
            "rescheduling requires a new scheduled time".to_string(),
        ));
    }

    Ok(())
}

/// Targets `caller` could request from the current status.
///
/// Considers edges, roles and ownership. Preconditions depend on the payload
/// and are not evaluated.
#[must_use]
pub fn available_transitions(request: &Request, caller: &Caller) -> Vec<Status> {
    if !owns(caller, request) {
        return Vec::new();
    }
    graph(request.domain())
        .edges_from(request.status)
        .filter(|edge| edge.roles.contains(&caller.role))
        .map(|edge| edge.to)
        .collect()
}
