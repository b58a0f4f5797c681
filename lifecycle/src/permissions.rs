//! Permission gate: may this caller move a request along this edge?
//!
//! Pure lookups over the domain tables. Nothing here mutates state; the
//! state machine is the only code that acts on the answers.

use crate::domain::graph;
use crate::request::Request;
use crate::status::{DomainType, Status};
use crate::types::{ProviderId, Role, SubjectId};
use serde::{Deserialize, Serialize};

/// Whether `role` may trigger `from → to` in `domain`.
///
/// `false` when the edge does not exist.
#[must_use]
pub fn is_authorized(role: Role, domain: DomainType, from: Status, to: Status) -> bool {
    graph(domain)
        .edge(from, to)
        .is_some_and(|edge| edge.roles.contains(&role))
}

/// Whether `role` may enter `to` from any state of `domain`.
#[must_use]
pub fn can_ever_reach(role: Role, domain: DomainType, to: Status) -> bool {
    graph(domain)
        .edges_into(to)
        .any(|edge| edge.roles.contains(&role))
}

/// The acting party: its role and the entity it acts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Acting role
    pub role: Role,
    /// Provider the caller belongs to (provider, staff, operator)
    pub provider_id: Option<ProviderId>,
    /// Subject the caller is (client)
    pub subject_id: Option<SubjectId>,
}

impl Caller {
    /// Marketplace staff
    #[must_use]
    pub const fn platform() -> Self {
        Self {
            role: Role::Platform,
            provider_id: None,
            subject_id: None,
        }
    }

    /// Automated scheduler
    #[must_use]
    pub const fn system() -> Self {
        Self {
            role: Role::System,
            provider_id: None,
            subject_id: None,
        }
    }

    /// Provider administrator
    #[must_use]
    pub const fn provider(provider_id: ProviderId) -> Self {
        Self::member(Role::Provider, provider_id)
    }

    /// Provider staff member
    #[must_use]
    pub const fn staff(provider_id: ProviderId) -> Self {
        Self::member(Role::Staff, provider_id)
    }

    /// Field operator working for a provider
    #[must_use]
    pub const fn operator(provider_id: ProviderId) -> Self {
        Self::member(Role::Operator, provider_id)
    }

    /// Client acting for themselves
    #[must_use]
    pub const fn client(subject_id: SubjectId) -> Self {
        Self {
            role: Role::Client,
            provider_id: None,
            subject_id: Some(subject_id),
        }
    }

    const fn member(role: Role, provider_id: ProviderId) -> Self {
        Self {
            role,
            provider_id: Some(provider_id),
            subject_id: None,
        }
    }
}

/// Ownership check.
///
/// Platform and system callers act across tenants. Provider-side callers
/// must belong to the request's provider; clients must be its subject.
#[must_use]
pub fn owns(caller: &Caller, request: &Request) -> bool {
    match caller.role {
        Role::Platform | Role::System => true,
        Role::Provider | Role::Staff | Role::Operator => {
            caller.provider_id == Some(request.provider_id)
        },
        Role::Client => caller.subject_id == Some(request.subject_id),
    }
}
