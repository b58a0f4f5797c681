//! The request entity and the draft it is submitted from.

use crate::pricing::{Cost, CostInput, Discount};
use crate::status::{DomainType, Milestone, Status};
use crate::types::{
    ActorId, Capability, GeoPoint, LineItem, PaymentStatus, ProviderId, RequestId, SubjectId,
    Urgency,
};
use carelane_core::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A service request: emergency call, pharmacy order, lab order, homecare
/// booking or provider verification case.
///
/// Created by [`crate::machine::submit`]; changed only by the machine,
/// assignment and payment functions, each of which bumps `version`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Identifier
    pub id: RequestId,
    /// Provider entity the request belongs to
    pub provider_id: ProviderId,
    /// Client, patient or provider being served or reviewed
    pub subject_id: SubjectId,
    /// Display name of the subject
    pub subject_name: String,
    /// Current status (carries the domain)
    pub status: Status,
    /// Bound actor, if any
    pub assigned_actor_id: Option<ActorId>,
    /// Urgency level
    pub urgency: Urgency,
    /// Grouping key: emergency type, test type, service category
    pub service_type: Option<String>,
    /// Capability an assigned actor must hold
    pub required_capability: Option<Capability>,
    /// Where the service takes place
    pub location: Option<GeoPoint>,
    /// When the service is scheduled
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Billable lines
    pub line_items: Vec<LineItem>,
    /// Estimated (or, once finalised, actual) distance
    pub distance_km: f64,
    /// Requested discount
    pub discount: Discount,
    /// Current cost (estimate until finalised)
    pub cost: Cost,
    /// Payment axis
    pub payment_status: PaymentStatus,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last accepted change
    pub updated_at: DateTime<Utc>,
    /// Milestone timestamps, each set at most once
    pub milestones: BTreeMap<Milestone, DateTime<Utc>>,
    /// Number of times the booking was rescheduled
    pub reschedule_count: u32,
    /// Rejection or cancellation reason
    pub reason: Option<String>,
    /// Optimistic concurrency version
    pub version: Version,
}

impl Request {
    /// Domain of the request
    #[must_use]
    pub const fn domain(&self) -> DomainType {
        self.status.domain()
    }

    /// Timestamp of `milestone`, if reached
    #[must_use]
    pub fn milestone(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        self.milestones.get(&milestone).copied()
    }

    /// Latest milestone timestamp
    #[must_use]
    pub fn latest_milestone(&self) -> Option<DateTime<Utc>> {
        self.milestones.values().max().copied()
    }

    /// Stamp `milestone` unless already set.
    ///
    /// The stamp is never earlier than any existing milestone, so the
    /// sequence stays non-decreasing even if the clock steps backwards.
    /// Returns whether a stamp was written.
    pub fn stamp(&mut self, milestone: Milestone, now: DateTime<Utc>) -> bool {
        if self.milestones.contains_key(&milestone) {
            return false;
        }
        let at = self.latest_milestone().map_or(now, |latest| latest.max(now));
        self.milestones.insert(milestone, at);
        true
    }

    /// Inputs for (re)computing this request's cost
    #[must_use]
    pub fn cost_input(&self) -> CostInput {
        CostInput {
            line_items: self.line_items.clone(),
            distance_km: self.distance_km,
            urgency: self.urgency,
            scheduled_at: self.scheduled_at,
            discount: self.discount,
        }
    }

    /// Minutes between two milestones, if both are stamped
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn minutes_between(&self, from: Milestone, to: Milestone) -> Option<f64> {
        let (start, end) = (self.milestone(from)?, self.milestone(to)?);
        Some((end - start).num_seconds() as f64 / 60.0)
    }
}

/// What a caller submits to create a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestDraft {
    /// Domain to create the request in
    pub domain: DomainType,
    /// Owning provider
    pub provider_id: ProviderId,
    /// Subject served
    pub subject_id: SubjectId,
    /// Subject display name
    pub subject_name: String,
    /// Urgency
    pub urgency: Urgency,
    /// Grouping key
    pub service_type: Option<String>,
    /// Capability an actor must hold
    pub required_capability: Option<Capability>,
    /// Service location
    pub location: Option<GeoPoint>,
    /// Service time
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Billable lines
    pub line_items: Vec<LineItem>,
    /// Estimated distance
    pub distance_km: f64,
    /// Discount
    pub discount: Discount,
}

impl RequestDraft {
    /// Start a draft with routine urgency and nothing billable
    #[must_use]
    pub fn new(
        domain: DomainType,
        provider_id: ProviderId,
        subject_id: SubjectId,
        subject_name: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            provider_id,
            subject_id,
            subject_name: subject_name.into(),
            urgency: Urgency::Routine,
            service_type: None,
            required_capability: None,
            location: None,
            scheduled_at: None,
            line_items: Vec::new(),
            distance_km: 0.0,
            discount: Discount::None,
        }
    }

    /// Set the urgency
    #[must_use]
    pub const fn urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Set the grouping key
    #[must_use]
    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    /// Require a capability from the assigned actor
    #[must_use]
    pub fn requires(mut self, capability: impl Into<Capability>) -> Self {
        self.required_capability = Some(capability.into());
        self
    }

    /// Set the service location
    #[must_use]
    pub const fn at(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the service time
    #[must_use]
    pub const fn scheduled(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Add a billable line
    #[must_use]
    pub fn item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    /// Set the estimated distance
    #[must_use]
    pub const fn distance_km(mut self, km: f64) -> Self {
        self.distance_km = km;
        self
    }

    /// Set the discount
    #[must_use]
    pub const fn discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }
}
