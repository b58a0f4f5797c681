//! Assignment policy: pick an eligible actor and bind it to a request.
//!
//! Eligibility is fixed (same provider, available, below capacity, holding
//! the required capability). Ranking among eligible actors is a per-domain
//! [`TieBreak`] from configuration, with a final tie broken by actor id so
//! the choice is deterministic.

use crate::domain::graph;
use crate::error::{AssignmentError, TransitionError};
use crate::machine::{Transition, TransitionContext, TransitionPayload, attempt_transition};
use crate::permissions::Caller;
use crate::request::Request;
use crate::status::{DomainType, Milestone};
use crate::types::{Actor, ActorId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How equally eligible actors are ranked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Closest to the request's location first, then least loaded
    Nearest,
    /// Lowest current load first, then closest
    LeastLoaded,
}

fn distance_to(actor: &Actor, request: &Request) -> f64 {
    match (actor.location, request.location) {
        (Some(from), Some(to)) => from.distance_km(&to),
        _ => f64::INFINITY,
    }
}

fn rank(tie_break: TieBreak, request: &Request, a: &Actor, b: &Actor) -> Ordering {
    let by_distance = || distance_to(a, request).total_cmp(&distance_to(b, request));
    let by_load = || a.current_load.cmp(&b.current_load);

    match tie_break {
        TieBreak::Nearest => by_distance().then_with(by_load),
        TieBreak::LeastLoaded => by_load().then_with(by_distance),
    }
    .then_with(|| a.id.cmp(&b.id))
}

/// Whether `actor` could take `request` right now.
#[must_use]
pub fn is_eligible(actor: &Actor, request: &Request) -> bool {
    actor.provider_id == request.provider_id
        && actor.has_capacity()
        && actor.has_capability(request.required_capability.as_ref())
}

/// Index of the best eligible actor in `pool`, if any.
#[must_use]
pub fn select_actor(request: &Request, pool: &[Actor], tie_break: TieBreak) -> Option<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, actor)| is_eligible(actor, request))
        .min_by(|(_, a), (_, b)| rank(tie_break, request, a, b))
        .map(|(idx, _)| idx)
}

/// Bind the best eligible actor from `pool` to `request`.
///
/// On success the request holds the actor's id, `Assigned` is stamped,
/// `version` is bumped and the actor's `current_load` is incremented. The
/// capacity check and the increment happen on the same `&mut` borrow, so a
/// host that serialises calls on the pool gets an atomic reservation.
///
/// # Errors
///
/// - [`AssignmentError::AlreadyAssigned`] if the request holds an actor
/// - [`AssignmentError::NotAssignable`] if the request is not waiting on its
///   domain's assignment edge
/// - [`AssignmentError::NoEligibleActor`] if filtering leaves nobody
pub fn assign_actor(
    request: &mut Request,
    pool: &mut [Actor],
    tie_break: TieBreak,
    now: DateTime<Utc>,
) -> Result<ActorId, AssignmentError> {
    if let Some(actor_id) = request.assigned_actor_id {
        return Err(AssignmentError::AlreadyAssigned(actor_id));
    }

    let waiting_for_actor = graph(request.domain())
        .assignment
        .is_some_and(|(from, _)| from == request.status);
    if !waiting_for_actor {
        return Err(AssignmentError::NotAssignable {
            status: request.status,
        });
    }

    let Some(idx) = select_actor(request, pool, tie_break) else {
        tracing::warn!(request_id = %request.id, pool = pool.len(), "No eligible actor");
        return Err(AssignmentError::NoEligibleActor);
    };

    let actor = &mut pool[idx];
    actor.current_load += 1;

    request.assigned_actor_id = Some(actor.id);
    request.stamp(Milestone::Assigned, now);
    request.updated_at = now;
    request.version = request.version.next();

    tracing::info!(
        request_id = %request.id,
        actor_id = %actor.id,
        load = actor.current_load,
        max = actor.max_concurrent,
        "Actor assigned"
    );

    Ok(actor.id)
}

/// Return one unit of load to `actor_id`. Returns whether the actor was found.
pub fn release_actor(pool: &mut [Actor], actor_id: ActorId) -> bool {
    match pool.iter_mut().find(|actor| actor.id == actor_id) {
        Some(actor) => {
            actor.current_load = actor.current_load.saturating_sub(1);
            tracing::debug!(actor_id = %actor_id, load = actor.current_load, "Actor released");
            true
        },
        None => false,
    }
}

/// Emergencies still waiting for a crew, most urgent first.
///
/// Keeps non-terminal `EMERGENCY` requests without an assigned actor and
/// orders them by urgency (highest first), then submission time, then id.
#[must_use]
pub fn dispatch_queue<'a, I>(requests: I) -> Vec<&'a Request>
where
    I: IntoIterator<Item = &'a Request>,
{
    let g = graph(DomainType::Emergency);
    let mut queue: Vec<&Request> = requests
        .into_iter()
        .filter(|r| r.domain() == DomainType::Emergency)
        .filter(|r| r.assigned_actor_id.is_none() && !g.is_terminal(r.status))
        .collect();
    queue.sort_by(|a, b| {
        b.urgency
            .cmp(&a.urgency)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    queue
}

/// Assign an actor and advance along the domain's assignment edge, all or
/// nothing.
///
/// Neither `request` nor `pool` is modified on failure. On success the
/// returned transition carries the updated request and the pool holds the
/// reservation.
///
/// # Errors
///
/// Any [`AssignmentError`]; a rejected transition is wrapped in
/// [`AssignmentError::Transition`] and the reservation is rolled back.
pub fn assign_and_advance(
    request: &Request,
    pool: &mut [Actor],
    caller: &Caller,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, AssignmentError> {
    let Some((_, target)) = graph(request.domain()).assignment else {
        return Err(AssignmentError::NotAssignable {
            status: request.status,
        });
    };

    let mut draft = request.clone();
    let tie_break = ctx.config.rules(request.domain()).tie_break;
    let actor_id = assign_actor(&mut draft, pool, tie_break, ctx.now)?;

    attempt_transition(&draft, target, caller, &TransitionPayload::default(), ctx).map_err(
        |error: TransitionError| {
            release_actor(pool, actor_id);
            AssignmentError::Transition(error)
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::machine::submit;
    use crate::request::RequestDraft;
    use crate::status::{DomainType, EmergencyStatus, HomecareStatus, Status};
    use crate::types::{ActorKind, GeoPoint, ProviderId, RequestId, SubjectId, Urgency};
    use carelane_testing::test_epoch;
    use chrono::Duration;

    fn booking(provider: ProviderId) -> Request {
        let draft = RequestDraft::new(
            DomainType::HomecareBooking,
            provider,
            SubjectId::new(),
            "Mrs. Haddad",
        )
        .requires("wound-care")
        .at(GeoPoint::new(30.05, 31.24));
        #[allow(clippy::unwrap_used)]
        submit(draft, &LifecycleConfig::default(), test_epoch()).unwrap()
    }

    fn caregiver(provider: ProviderId, name: &str) -> Actor {
        Actor::new(provider, name, ActorKind::Caregiver, 2).with_capability("wound-care")
    }

    #[test]
    fn picks_the_only_matching_actor() {
        let provider = ProviderId::new();
        let mut request = booking(provider);
        let mut unavailable = caregiver(provider, "Busy");
        unavailable.is_available = false;
        let mut pool = vec![
            Actor::new(provider, "Wrong skill", ActorKind::Caregiver, 2).with_capability("pediatrics"),
            unavailable,
            caregiver(provider, "Right one"),
        ];
        let expected = pool[2].id;

        let chosen = assign_actor(&mut request, &mut pool, TieBreak::Nearest, test_epoch());

        assert_eq!(chosen, Ok(expected));
        assert_eq!(request.assigned_actor_id, Some(expected));
        assert_eq!(pool[2].current_load, 1);
        assert!(request.milestone(Milestone::Assigned).is_some());
    }

    #[test]
    fn nearest_wins_under_nearest_tie_break() {
        let provider = ProviderId::new();
        let mut request = booking(provider);
        let far = caregiver(provider, "Far").at(GeoPoint::new(31.2, 29.9));
        let near = caregiver(provider, "Near").at(GeoPoint::new(30.06, 31.25));
        let unknown = caregiver(provider, "Unknown location");
        let near_id = near.id;
        let mut pool = vec![unknown, far, near];

        assert_eq!(
            assign_actor(&mut request, &mut pool, TieBreak::Nearest, test_epoch()),
            Ok(near_id)
        );
    }

    #[test]
    fn least_loaded_wins_under_least_loaded_tie_break() {
        let provider = ProviderId::new();
        let mut request = booking(provider);
        let mut busy_near = caregiver(provider, "Busy near").at(GeoPoint::new(30.05, 31.24));
        busy_near.current_load = 1;
        let idle_far = caregiver(provider, "Idle far").at(GeoPoint::new(31.2, 29.9));
        let idle_id = idle_far.id;
        let mut pool = vec![busy_near, idle_far];

        assert_eq!(
            assign_actor(&mut request, &mut pool, TieBreak::LeastLoaded, test_epoch()),
            Ok(idle_id)
        );
    }

    #[test]
    fn final_tie_is_lowest_actor_id() {
        let provider = ProviderId::new();
        let request = booking(provider);
        let pool = vec![caregiver(provider, "A"), caregiver(provider, "B")];
        let lowest = pool.iter().map(|a| a.id).min();

        let idx = select_actor(&request, &pool, TieBreak::Nearest);
        assert_eq!(idx.map(|i| pool[i].id), lowest);
    }

    #[test]
    fn saturated_or_foreign_actors_are_ineligible() {
        let provider = ProviderId::new();
        let mut request = booking(provider);
        let mut full = caregiver(provider, "Full");
        full.current_load = full.max_concurrent;
        let foreign = caregiver(ProviderId::new(), "Other agency");
        let mut pool = vec![full, foreign];

        assert_eq!(
            assign_actor(&mut request, &mut pool, TieBreak::Nearest, test_epoch()),
            Err(AssignmentError::NoEligibleActor)
        );
        assert!(request.assigned_actor_id.is_none());
        assert_eq!(pool[0].current_load, pool[0].max_concurrent);
        assert_eq!(pool[1].current_load, 0);
    }

    #[test]
    fn cannot_assign_twice_or_outside_the_assignment_state() {
        let provider = ProviderId::new();
        let mut request = booking(provider);
        let mut pool = vec![caregiver(provider, "One"), caregiver(provider, "Two")];

        let first = assign_actor(&mut request, &mut pool, TieBreak::Nearest, test_epoch());
        let Ok(first) = first else {
            unreachable!("first assignment must succeed");
        };
        assert_eq!(
            assign_actor(&mut request, &mut pool, TieBreak::Nearest, test_epoch()),
            Err(AssignmentError::AlreadyAssigned(first))
        );

        let mut confirmed = booking(provider);
        confirmed.status = Status::HomecareBooking(HomecareStatus::Confirmed);
        assert!(matches!(
            assign_actor(&mut confirmed, &mut pool, TieBreak::Nearest, test_epoch()),
            Err(AssignmentError::NotAssignable { .. })
        ));
    }

    #[test]
    fn assign_and_advance_rolls_back_on_unauthorized() {
        let provider = ProviderId::new();
        let config = LifecycleConfig::default();
        let ctx = TransitionContext::new(test_epoch(), &config);
        let mut emergency = submit(
            RequestDraft::new(DomainType::Emergency, provider, SubjectId::new(), "Caller"),
            &config,
            test_epoch(),
        )
        .unwrap_or_else(|e| unreachable!("{e}"));
        emergency.status = Status::Emergency(EmergencyStatus::Paid);

        let mut pool = vec![Actor::new(provider, "Medic", ActorKind::Paramedic, 1)];
        let client = Caller::client(emergency.subject_id);

        let result = assign_and_advance(&emergency, &mut pool, &client, &ctx);

        assert!(matches!(
            result,
            Err(AssignmentError::Transition(TransitionError::Unauthorized { .. }))
        ));
        assert_eq!(pool[0].current_load, 0);
        assert!(emergency.assigned_actor_id.is_none());
    }

    #[test]
    fn assign_and_advance_binds_and_moves() -> Result<(), AssignmentError> {
        let provider = ProviderId::new();
        let config = LifecycleConfig::default();
        let ctx = TransitionContext::new(test_epoch(), &config);
        let request = booking(provider);
        let mut pool = vec![caregiver(provider, "Nadia")];

        let transition = assign_and_advance(&request, &mut pool, &Caller::staff(provider), &ctx)?;

        assert_eq!(
            transition.request.status,
            Status::HomecareBooking(HomecareStatus::Confirmed)
        );
        assert_eq!(transition.request.assigned_actor_id, Some(pool[0].id));
        assert_eq!(pool[0].current_load, 1);
        assert!(transition.released_actor.is_none());
        Ok(())
    }

    #[test]
    fn release_saturates_at_zero() {
        let provider = ProviderId::new();
        let mut pool = vec![caregiver(provider, "Idle")];
        let id = pool[0].id;

        assert!(release_actor(&mut pool, id));
        assert_eq!(pool[0].current_load, 0);
        assert!(!release_actor(&mut pool, ActorId::new()));
    }

    fn emergency(provider: ProviderId, urgency: Urgency, minutes: i64) -> Request {
        let draft = RequestDraft::new(DomainType::Emergency, provider, SubjectId::new(), "Caller")
            .urgency(urgency);
        submit(draft, &LifecycleConfig::default(), test_epoch() + Duration::minutes(minutes)).unwrap()
    }

    #[test]
    fn dispatch_queue_puts_critical_calls_first() {
        let provider = ProviderId::new();
        let routine = emergency(provider, Urgency::Routine, 0);
        let critical = emergency(provider, Urgency::Critical, 5);
        let urgent = emergency(provider, Urgency::Urgent, 10);
        let mut accepted = emergency(provider, Urgency::Critical, 1);
        accepted.assigned_actor_id = Some(ActorId::new());
        let mut cancelled = emergency(provider, Urgency::Critical, 2);
        cancelled.status = Status::Emergency(EmergencyStatus::Cancelled);
        let booking = booking(provider);

        let all = [routine.clone(), accepted, cancelled, booking, urgent.clone(), critical.clone()];
        let order: Vec<RequestId> = dispatch_queue(&all).into_iter().map(|r| r.id).collect();

        assert_eq!(order, vec![critical.id, urgent.id, routine.id]);
    }

    #[test]
    fn equal_urgency_is_served_in_arrival_order() {
        let provider = ProviderId::new();
        let later = emergency(provider, Urgency::Urgent, 7);
        let earlier = emergency(provider, Urgency::Urgent, 3);

        let all = [later.clone(), earlier.clone()];
        let order: Vec<RequestId> = dispatch_queue(&all).into_iter().map(|r| r.id).collect();

        assert_eq!(order, vec![earlier.id, later.id]);
    }
}
