//! Domains, their closed status enumerations, and milestone names.
//!
//! Every domain has its own status enum. [`Status`] wraps them so a status
//! always carries its domain: a pharmacy status can never be handed to the
//! emergency graph by accident.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider category whose state machine and pricing rules apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainType {
    /// Ambulance / emergency dispatch
    Emergency,
    /// Pharmacy order fulfilment
    PharmacyOrder,
    /// Laboratory order processing
    LabOrder,
    /// Homecare booking
    HomecareBooking,
    /// Provider onboarding verification
    ProviderVerification,
}

impl DomainType {
    /// Every domain
    pub const ALL: [Self; 5] = [
        Self::Emergency,
        Self::PharmacyOrder,
        Self::LabOrder,
        Self::HomecareBooking,
        Self::ProviderVerification,
    ];

    /// Wire name (`EMERGENCY`, `PHARMACY_ORDER`, ...)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::PharmacyOrder => "PHARMACY_ORDER",
            Self::LabOrder => "LAB_ORDER",
            Self::HomecareBooking => "HOMECARE_BOOKING",
            Self::ProviderVerification => "PROVIDER_VERIFICATION",
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider verification case status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum VerificationStatus {
    Pending,
    InReview,
    Verified,
    Rejected,
}

/// Emergency request status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum EmergencyStatus {
    Pending,
    Paid,
    Accepted,
    InProgress,
    Arriving,
    Completed,
    Cancelled,
}

/// Pharmacy order status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum PharmacyStatus {
    Pending,
    Verified,
    Processing,
    Dispatched,
    Delivered,
    Cancelled,
}

/// Lab order status. Wire names are lower-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum LabStatus {
    Ordered,
    Collected,
    Processing,
    Completed,
    Cancelled,
}

/// Homecare booking status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum HomecareStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

/// A status tagged with its domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "domain", content = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// `EMERGENCY`
    Emergency(EmergencyStatus),
    /// `PHARMACY_ORDER`
    PharmacyOrder(PharmacyStatus),
    /// `LAB_ORDER`
    LabOrder(LabStatus),
    /// `HOMECARE_BOOKING`
    HomecareBooking(HomecareStatus),
    /// `PROVIDER_VERIFICATION`
    ProviderVerification(VerificationStatus),
}

impl Status {
    /// The domain this status belongs to
    #[must_use]
    pub const fn domain(self) -> DomainType {
        match self {
            Self::Emergency(_) => DomainType::Emergency,
            Self::PharmacyOrder(_) => DomainType::PharmacyOrder,
            Self::LabOrder(_) => DomainType::LabOrder,
            Self::HomecareBooking(_) => DomainType::HomecareBooking,
            Self::ProviderVerification(_) => DomainType::ProviderVerification,
        }
    }

    /// Every status of `domain`, in declaration order
    #[must_use]
    pub fn all(domain: DomainType) -> Vec<Self> {
        use EmergencyStatus as E;
        use HomecareStatus as H;
        use LabStatus as L;
        use PharmacyStatus as P;
        use VerificationStatus as V;

        match domain {
            DomainType::Emergency => [
                E::Pending,
                E::Paid,
                E::Accepted,
                E::InProgress,
                E::Arriving,
                E::Completed,
                E::Cancelled,
            ]
            .into_iter()
            .map(Self::Emergency)
            .collect(),
            DomainType::PharmacyOrder => [
                P::Pending,
                P::Verified,
                P::Processing,
                P::Dispatched,
                P::Delivered,
                P::Cancelled,
            ]
            .into_iter()
            .map(Self::PharmacyOrder)
            .collect(),
            DomainType::LabOrder => [
                L::Ordered,
                L::Collected,
                L::Processing,
                L::Completed,
                L::Cancelled,
            ]
            .into_iter()
            .map(Self::LabOrder)
            .collect(),
            DomainType::HomecareBooking => [
                H::Pending,
                H::Confirmed,
                H::InProgress,
                H::Completed,
                H::Cancelled,
                H::Rescheduled,
            ]
            .into_iter()
            .map(Self::HomecareBooking)
            .collect(),
            DomainType::ProviderVerification => {
                [V::Pending, V::InReview, V::Verified, V::Rejected]
                    .into_iter()
                    .map(Self::ProviderVerification)
                    .collect()
            },
        }
    }

    /// Wire name of the status without its domain
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emergency(s) => match s {
                EmergencyStatus::Pending => "PENDING",
                EmergencyStatus::Paid => "PAID",
                EmergencyStatus::Accepted => "ACCEPTED",
                EmergencyStatus::InProgress => "IN_PROGRESS",
                EmergencyStatus::Arriving => "ARRIVING",
                EmergencyStatus::Completed => "COMPLETED",
                EmergencyStatus::Cancelled => "CANCELLED",
            },
            Self::PharmacyOrder(s) => match s {
                PharmacyStatus::Pending => "PENDING",
                PharmacyStatus::Verified => "VERIFIED",
                PharmacyStatus::Processing => "PROCESSING",
                PharmacyStatus::Dispatched => "DISPATCHED",
                PharmacyStatus::Delivered => "DELIVERED",
                PharmacyStatus::Cancelled => "CANCELLED",
            },
            Self::LabOrder(s) => match s {
                LabStatus::Ordered => "ordered",
                LabStatus::Collected => "collected",
                LabStatus::Processing => "processing",
                LabStatus::Completed => "completed",
                LabStatus::Cancelled => "cancelled",
            },
            Self::HomecareBooking(s) => match s {
                HomecareStatus::Pending => "PENDING",
                HomecareStatus::Confirmed => "CONFIRMED",
                HomecareStatus::InProgress => "IN_PROGRESS",
                HomecareStatus::Completed => "COMPLETED",
                HomecareStatus::Cancelled => "CANCELLED",
                HomecareStatus::Rescheduled => "RESCHEDULED",
            },
            Self::ProviderVerification(s) => match s {
                VerificationStatus::Pending => "PENDING",
                VerificationStatus::InReview => "IN_REVIEW",
                VerificationStatus::Verified => "VERIFIED",
                VerificationStatus::Rejected => "REJECTED",
            },
        }
    }

    /// Whether this is the domain's cancellation state
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(
            self,
            Self::Emergency(EmergencyStatus::Cancelled)
                | Self::PharmacyOrder(PharmacyStatus::Cancelled)
                | Self::LabOrder(LabStatus::Cancelled)
                | Self::HomecareBooking(HomecareStatus::Cancelled)
        )
    }

    /// Whether this is a rejection (verification only)
    #[must_use]
    pub const fn is_rejected(self) -> bool {
        matches!(self, Self::ProviderVerification(VerificationStatus::Rejected))
    }

    /// The milestone first arrival at this status stamps, if any
    #[must_use]
    pub const fn milestone(self) -> Option<Milestone> {
        let milestone = match self {
            Self::Emergency(s) => match s {
                EmergencyStatus::Pending => Milestone::Created,
                EmergencyStatus::Paid => Milestone::Paid,
                EmergencyStatus::Accepted => Milestone::Accepted,
                EmergencyStatus::InProgress => Milestone::Started,
                EmergencyStatus::Arriving => Milestone::Arriving,
                EmergencyStatus::Completed => Milestone::Completed,
                EmergencyStatus::Cancelled => Milestone::Cancelled,
            },
            Self::PharmacyOrder(s) => match s {
                PharmacyStatus::Pending => Milestone::Created,
                PharmacyStatus::Verified => Milestone::Verified,
                PharmacyStatus::Processing => Milestone::Processing,
                PharmacyStatus::Dispatched => Milestone::Dispatched,
                PharmacyStatus::Delivered => Milestone::Delivered,
                PharmacyStatus::Cancelled => Milestone::Cancelled,
            },
            Self::LabOrder(s) => match s {
                LabStatus::Ordered => Milestone::Created,
                LabStatus::Collected => Milestone::Collected,
                LabStatus::Processing => Milestone::Processing,
                LabStatus::Completed => Milestone::Completed,
                LabStatus::Cancelled => Milestone::Cancelled,
            },
            Self::HomecareBooking(s) => match s {
                HomecareStatus::Pending => Milestone::Created,
                HomecareStatus::Confirmed => Milestone::Confirmed,
                HomecareStatus::InProgress => Milestone::Started,
                HomecareStatus::Completed => Milestone::Completed,
                HomecareStatus::Cancelled => Milestone::Cancelled,
                HomecareStatus::Rescheduled => return None,
            },
            Self::ProviderVerification(s) => match s {
                VerificationStatus::Pending => Milestone::Created,
                VerificationStatus::InReview => Milestone::Reviewed,
                VerificationStatus::Verified => Milestone::Verified,
                VerificationStatus::Rejected => Milestone::Rejected,
            },
        };
        Some(milestone)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain(), self.as_str())
    }
}

/// Named point-in-time stamps on a request. Each is set at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Milestone {
    Created,
    Reviewed,
    Paid,
    Assigned,
    Accepted,
    Confirmed,
    Collected,
    Processing,
    Dispatched,
    Started,
    Arriving,
    Verified,
    Delivered,
    Completed,
    Rejected,
    Cancelled,
}
