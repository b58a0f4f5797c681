//! Value types shared across the lifecycle engine.
//!
//! Identifiers, money, roles, urgency, capabilities and the actor record.
//! Requests and their statuses live in [`crate::request`] and
//! [`crate::status`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a service request (order, booking, case)
    RequestId
);
uuid_id!(
    /// Unique identifier for an actor (caregiver, technician, paramedic, courier, doctor)
    ActorId
);
uuid_id!(
    /// Unique identifier for a provider entity (pharmacy, lab, agency, ...)
    ProviderId
);
uuid_id!(
    /// Unique identifier for the client, patient or provider a request serves
    SubjectId
);

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents.
///
/// Signed so that a negative caller input survives long enough to be
/// rejected as invalid instead of wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units, if it fits
    #[must_use]
    pub const fn checked_from_major(units: i64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Checks if the amount is negative
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts with overflow checking (the result may be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_mul(self, quantity: i64) -> Option<Self> {
        match self.0.checked_mul(quantity) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

// ============================================================================
// Roles, urgency, payment
// ============================================================================

/// The role a caller acts in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Marketplace operator staff (verifies providers)
    Platform,
    /// Owner/administrator of a provider entity
    Provider,
    /// Staff member of a provider entity
    Staff,
    /// Field operator (paramedic, courier, caregiver) acting for a provider
    Operator,
    /// The client/patient served by a request
    Client,
    /// Automated scheduler (SLA timeouts)
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Platform => "PLATFORM",
            Self::Provider => "PROVIDER",
            Self::Staff => "STAFF",
            Self::Operator => "OPERATOR",
            Self::Client => "CLIENT",
            Self::System => "SYSTEM",
        };
        f.write_str(name)
    }
}

/// Urgency of a request; ordered from least to most urgent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    /// Scheduled, no surcharge
    #[default]
    Routine,
    /// Same-day
    Urgent,
    /// Life-threatening / immediate dispatch
    Critical,
}

/// Payment axis, independent of the lifecycle status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Not paid yet (or invoiced)
    #[default]
    Pending,
    /// Paid in full
    Completed,
    /// Paid, then refunded
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Refunded => "REFUNDED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Capabilities and geography
// ============================================================================

/// A specialisation or certification an actor holds and a request may require.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capability(String);

impl Capability {
    /// Creates a capability tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Capability {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WGS84 position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl GeoPoint {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Creates a point
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle (haversine) distance in kilometres
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

// ============================================================================
// Line items
// ============================================================================

/// One billable line: a medication, a test, a service hour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Display name, also the grouping key for top-N statistics
    pub name: String,
    /// Quantity (must be non-negative)
    pub quantity: i64,
    /// Price per unit (must be non-negative)
    pub unit_price: Money,
}

impl LineItem {
    /// Creates a line item
    #[must_use]
    pub fn new(name: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
        }
    }
}

// ============================================================================
// Actors
// ============================================================================

/// What kind of person an actor is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    /// Homecare caregiver
    Caregiver,
    /// Lab technician / phlebotomist
    Technician,
    /// Ambulance crew
    Paramedic,
    /// Pharmacy delivery courier
    Courier,
    /// Physician
    Doctor,
}

/// A service-delivering person bindable to requests.
///
/// Owned by its provider. Requests only hold an [`ActorId`]; the actor's
/// lifetime is independent of any request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    /// Actor identifier
    pub id: ActorId,
    /// Owning provider
    pub provider_id: ProviderId,
    /// Display name
    pub name: String,
    /// Kind of actor
    pub kind: ActorKind,
    /// Specialisations and certifications
    pub capabilities: BTreeSet<Capability>,
    /// Whether the actor currently accepts work
    pub is_available: bool,
    /// Number of requests currently bound to this actor
    pub current_load: u32,
    /// Upper bound for `current_load`
    pub max_concurrent: u32,
    /// Last known position
    pub location: Option<GeoPoint>,
}

impl Actor {
    /// Creates an available actor with no load
    #[must_use]
    pub fn new(
        provider_id: ProviderId,
        name: impl Into<String>,
        kind: ActorKind,
        max_concurrent: u32,
    ) -> Self {
        Self {
            id: ActorId::new(),
            provider_id,
            name: name.into(),
            kind,
            capabilities: BTreeSet::new(),
            is_available: true,
            current_load: 0,
            max_concurrent,
            location: None,
        }
    }

    /// Adds a capability
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    /// Sets the current location
    #[must_use]
    pub const fn at(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// Whether another request may be bound right now
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.is_available && self.current_load < self.max_concurrent
    }

    /// Whether the actor holds `capability` (`None` means nothing required)
    #[must_use]
    pub fn has_capability(&self, capability: Option<&Capability>) -> bool {
        capability.is_none_or(|c| self.capabilities.contains(c))
    }
}
