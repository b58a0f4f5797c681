//! Per-domain state graphs and permission tables, as data.
//!
//! One engine serves all five provider categories. Each domain contributes a
//! [`DomainGraph`]: its edges (with the roles allowed to trigger each),
//! initial and terminal states, the edge that binds an actor, and the
//! statuses during which an actor stays bound.

use crate::status::{
    DomainType, EmergencyStatus as E, HomecareStatus as H, LabStatus as L, PharmacyStatus as P,
    Status, VerificationStatus as V,
};
use crate::types::Role;
use serde::{Deserialize, Serialize};

/// A directed edge of a domain graph and the roles permitted to take it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Source status
    pub from: Status,
    /// Target status
    pub to: Status,
    /// Roles allowed to trigger the move
    pub roles: &'static [Role],
}

/// What happens to `assigned_actor_id` when a request is cancelled.
///
/// The actor's load is released either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Unset the actor reference
    ClearAssignment,
    /// Keep the actor reference for audit
    RetainAssignment,
}

/// Static description of one domain's lifecycle.
#[derive(Debug)]
pub struct DomainGraph {
    /// Domain described
    pub domain: DomainType,
    /// Status a submitted request starts in
    pub initial: Status,
    /// Terminal status counted as completion
    pub success: Status,
    /// All terminal statuses
    pub terminal: &'static [Status],
    /// Every legal edge
    pub edges: &'static [Edge],
    /// The edge that binds an actor, if the domain assigns actors
    pub assignment: Option<(Status, Status)>,
    /// Non-terminal statuses during which the bound actor's load is held
    pub holding: &'static [Status],
}

impl DomainGraph {
    /// Find the edge `from → to`
    #[must_use]
    pub fn edge(&self, from: Status, to: Status) -> Option<&'static Edge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    /// Edges leaving `from`
    pub fn edges_from(&self, from: Status) -> impl Iterator<Item = &'static Edge> + '_ {
        self.edges.iter().filter(move |e| e.from == from)
    }

    /// Edges entering `to`
    pub fn edges_into(&self, to: Status) -> impl Iterator<Item = &'static Edge> + '_ {
        self.edges.iter().filter(move |e| e.to == to)
    }

    /// Whether `status` is terminal
    #[must_use]
    pub fn is_terminal(&self, status: Status) -> bool {
        self.terminal.contains(&status)
    }

    /// Whether an actor bound to a request in `status` keeps its load reserved
    #[must_use]
    pub fn holds_actor(&self, status: Status) -> bool {
        self.holding.contains(&status)
    }

    /// Whether `from → to` is the actor-binding edge
    #[must_use]
    pub fn is_assignment_edge(&self, from: Status, to: Status) -> bool {
        self.assignment == Some((from, to))
    }
}

/// The graph for `domain`
#[must_use]
pub fn graph(domain: DomainType) -> &'static DomainGraph {
    match domain {
        DomainType::Emergency => &EMERGENCY,
        DomainType::PharmacyOrder => &PHARMACY,
        DomainType::LabOrder => &LAB,
        DomainType::HomecareBooking => &HOMECARE,
        DomainType::ProviderVerification => &VERIFICATION,
    }
}

// ============================================================================
// Permission sets
// ============================================================================

const PLATFORM: &[Role] = &[Role::Platform];
const PROVIDER_SIDE: &[Role] = &[Role::Provider, Role::Staff];
const FIELD: &[Role] = &[Role::Provider, Role::Staff, Role::Operator];
const PAYERS: &[Role] = &[Role::Client, Role::Provider, Role::Staff, Role::Platform];
const RESCHEDULERS: &[Role] = &[Role::Client, Role::Provider, Role::Staff];
const EARLY_CANCEL: &[Role] = &[
    Role::Client,
    Role::Provider,
    Role::Staff,
    Role::Operator,
    Role::Platform,
    Role::System,
];
const LATE_CANCEL: &[Role] = &[
    Role::Provider,
    Role::Staff,
    Role::Operator,
    Role::Platform,
    Role::System,
];

const fn edge(from: Status, to: Status, roles: &'static [Role]) -> Edge {
    Edge { from, to, roles }
}

// ============================================================================
// PROVIDER_VERIFICATION
// ============================================================================

const fn v(status: V) -> Status {
    Status::ProviderVerification(status)
}

static VERIFICATION: DomainGraph = DomainGraph {
    domain: DomainType::ProviderVerification,
    initial: v(V::Pending),
    success: v(V::Verified),
    terminal: &[v(V::Verified), v(V::Rejected)],
    edges: &[
        edge(v(V::Pending), v(V::InReview), PLATFORM),
        edge(v(V::Pending), v(V::Verified), PLATFORM),
        edge(v(V::Pending), v(V::Rejected), PLATFORM),
        edge(v(V::InReview), v(V::Verified), PLATFORM),
        edge(v(V::InReview), v(V::Rejected), PLATFORM),
    ],
    assignment: None,
    holding: &[],
};

// ============================================================================
// EMERGENCY
// ============================================================================

const fn e(status: E) -> Status {
    Status::Emergency(status)
}

static EMERGENCY: DomainGraph = DomainGraph {
    domain: DomainType::Emergency,
    initial: e(E::Pending),
    success: e(E::Completed),
    terminal: &[e(E::Completed), e(E::Cancelled)],
    edges: &[
        edge(e(E::Pending), e(E::Paid), PAYERS),
        edge(e(E::Paid), e(E::Accepted), FIELD),
        edge(e(E::Accepted), e(E::InProgress), FIELD),
        edge(e(E::InProgress), e(E::Arriving), FIELD),
        edge(e(E::Arriving), e(E::Completed), FIELD),
        edge(e(E::Pending), e(E::Cancelled), EARLY_CANCEL),
        edge(e(E::Paid), e(E::Cancelled), EARLY_CANCEL),
        edge(e(E::Accepted), e(E::Cancelled), LATE_CANCEL),
        edge(e(E::InProgress), e(E::Cancelled), LATE_CANCEL),
        edge(e(E::Arriving), e(E::Cancelled), LATE_CANCEL),
    ],
    assignment: Some((e(E::Paid), e(E::Accepted))),
    holding: &[e(E::Accepted), e(E::InProgress), e(E::Arriving)],
};

// ============================================================================
// PHARMACY_ORDER
// ============================================================================

const fn p(status: P) -> Status {
    Status::PharmacyOrder(status)
}

static PHARMACY: DomainGraph = DomainGraph {
    domain: DomainType::PharmacyOrder,
    initial: p(P::Pending),
    success: p(P::Delivered),
    terminal: &[p(P::Delivered), p(P::Cancelled)],
    edges: &[
        edge(p(P::Pending), p(P::Verified), PROVIDER_SIDE),
        edge(p(P::Verified), p(P::Processing), PROVIDER_SIDE),
        edge(p(P::Processing), p(P::Dispatched), PROVIDER_SIDE),
        edge(p(P::Dispatched), p(P::Delivered), FIELD),
        edge(p(P::Pending), p(P::Cancelled), EARLY_CANCEL),
        edge(p(P::Verified), p(P::Cancelled), LATE_CANCEL),
        edge(p(P::Processing), p(P::Cancelled), LATE_CANCEL),
    ],
    assignment: Some((p(P::Processing), p(P::Dispatched))),
    holding: &[p(P::Dispatched)],
};

// ============================================================================
// LAB_ORDER
// ============================================================================

const fn l(status: L) -> Status {
    Status::LabOrder(status)
}

static LAB: DomainGraph = DomainGraph {
    domain: DomainType::LabOrder,
    initial: l(L::Ordered),
    success: l(L::Completed),
    terminal: &[l(L::Completed), l(L::Cancelled)],
    edges: &[
        edge(l(L::Ordered), l(L::Collected), FIELD),
        edge(l(L::Collected), l(L::Processing), PROVIDER_SIDE),
        edge(l(L::Processing), l(L::Completed), PROVIDER_SIDE),
        edge(l(L::Ordered), l(L::Cancelled), EARLY_CANCEL),
        edge(l(L::Collected), l(L::Cancelled), LATE_CANCEL),
    ],
    assignment: Some((l(L::Ordered), l(L::Collected))),
    holding: &[l(L::Collected), l(L::Processing)],
};

// ============================================================================
// HOMECARE_BOOKING
// ============================================================================

const fn h(status: H) -> Status {
    Status::HomecareBooking(status)
}

static HOMECARE: DomainGraph = DomainGraph {
    domain: DomainType::HomecareBooking,
    initial: h(H::Pending),
    success: h(H::Completed),
    terminal: &[h(H::Completed), h(H::Cancelled)],
    edges: &[
        edge(h(H::Pending), h(H::Confirmed), PROVIDER_SIDE),
        edge(h(H::Confirmed), h(H::InProgress), FIELD),
        edge(h(H::InProgress), h(H::Completed), FIELD),
        edge(h(H::Pending), h(H::Cancelled), EARLY_CANCEL),
        edge(h(H::Confirmed), h(H::Cancelled), EARLY_CANCEL),
        edge(h(H::Rescheduled), h(H::Cancelled), EARLY_CANCEL),
        edge(h(H::Pending), h(H::Rescheduled), RESCHEDULERS),
        edge(h(H::Confirmed), h(H::Rescheduled), RESCHEDULERS),
        edge(h(H::Rescheduled), h(H::Pending), PROVIDER_SIDE),
    ],
    assignment: Some((h(H::Pending), h(H::Confirmed))),
    holding: &[h(H::Confirmed), h(H::InProgress)],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_edge_stays_inside_its_domain() {
        for domain in DomainType::ALL {
            let g = graph(domain);
            assert_eq!(g.domain, domain);
            assert_eq!(g.initial.domain(), domain);
            for edge in g.edges {
                assert_eq!(edge.from.domain(), domain, "{edge:?}");
                assert_eq!(edge.to.domain(), domain, "{edge:?}");
                assert!(!edge.roles.is_empty(), "{edge:?}");
            }
        }
    }

    #[test]
    fn no_edge_leaves_a_terminal_state() {
        for domain in DomainType::ALL {
            let g = graph(domain);
            assert!(g.is_terminal(g.success));
            for terminal in g.terminal {
                assert_eq!(g.edges_from(*terminal).count(), 0, "{terminal}");
            }
        }
    }

    #[test]
    fn assignment_edge_exists_and_lands_in_a_holding_state() {
        for domain in DomainType::ALL {
            let g = graph(domain);
            if let Some((from, to)) = g.assignment {
                assert!(g.edge(from, to).is_some());
                assert!(g.holds_actor(to));
                assert!(g.is_assignment_edge(from, to));
            } else {
                assert!(g.holding.is_empty());
            }
        }
    }

    #[test]
    fn every_non_terminal_emergency_state_can_cancel() {
        let g = graph(DomainType::Emergency);
        for status in Status::all(DomainType::Emergency) {
            if !g.is_terminal(status) {
                assert!(g.edge(status, e(E::Cancelled)).is_some(), "{status}");
            }
        }
    }

    #[test]
    fn pharmacy_cannot_cancel_after_dispatch() {
        let g = graph(DomainType::PharmacyOrder);
        assert!(g.edge(p(P::Processing), p(P::Cancelled)).is_some());
        assert!(g.edge(p(P::Dispatched), p(P::Cancelled)).is_none());
    }

    #[test]
    fn lab_cannot_cancel_once_processing() {
        let g = graph(DomainType::LabOrder);
        assert!(g.edge(l(L::Collected), l(L::Cancelled)).is_some());
        assert!(g.edge(l(L::Processing), l(L::Cancelled)).is_none());
    }
}
