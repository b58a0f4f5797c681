//! Configuration for the lifecycle engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::assignment::TieBreak;
use crate::domain::CancellationPolicy;
use crate::pricing::{PricingConfig, PricingRule};
use crate::status::DomainType;
use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Rules one domain runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRules {
    /// How the subtotal is derived
    pub pricing: PricingRule,
    /// How equally eligible actors are ranked
    pub tie_break: TieBreak,
    /// Whether cancellation clears the actor reference
    pub cancellation: CancellationPolicy,
    /// Deadline for leaving the initial state before the scheduler cancels
    pub accept_timeout: Option<Duration>,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Tax and surcharge rates
    pub pricing: PricingConfig,
    /// `EMERGENCY` rules
    pub emergency: DomainRules,
    /// `PHARMACY_ORDER` rules
    pub pharmacy: DomainRules,
    /// `LAB_ORDER` rules
    pub lab: DomainRules,
    /// `HOMECARE_BOOKING` rules
    pub homecare: DomainRules,
    /// `PROVIDER_VERIFICATION` rules
    pub verification: DomainRules,
}

impl LifecycleConfig {
    /// Rules for `domain`
    #[must_use]
    pub const fn rules(&self, domain: DomainType) -> &DomainRules {
        match domain {
            DomainType::Emergency => &self.emergency,
            DomainType::PharmacyOrder => &self.pharmacy,
            DomainType::LabOrder => &self.lab,
            DomainType::HomecareBooking => &self.homecare,
            DomainType::ProviderVerification => &self.verification,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to [`LifecycleConfig::default`].
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let pricing = PricingConfig {
            tax_rate_bps: var_or("CARELANE_TAX_RATE_BPS", defaults.pricing.tax_rate_bps),
            urgent_surcharge_bps: var_or(
                "CARELANE_URGENT_SURCHARGE_BPS",
                defaults.pricing.urgent_surcharge_bps,
            ),
            critical_surcharge_bps: var_or(
                "CARELANE_CRITICAL_SURCHARGE_BPS",
                defaults.pricing.critical_surcharge_bps,
            ),
            night_surcharge_bps: var_or(
                "CARELANE_NIGHT_SURCHARGE_BPS",
                defaults.pricing.night_surcharge_bps,
            ),
            weekend_surcharge_bps: var_or(
                "CARELANE_WEEKEND_SURCHARGE_BPS",
                defaults.pricing.weekend_surcharge_bps,
            ),
            night_start_hour: var_or("CARELANE_NIGHT_START_HOUR", defaults.pricing.night_start_hour)
                .min(23),
            night_end_hour: var_or("CARELANE_NIGHT_END_HOUR", defaults.pricing.night_end_hour)
                .min(23),
        };

        let emergency = DomainRules {
            pricing: PricingRule::DistanceBased {
                base_fee: Money::from_cents(var_or(
                    "CARELANE_EMERGENCY_BASE_FEE_CENTS",
                    EMERGENCY_BASE_FEE_CENTS,
                )),
                per_km: Money::from_cents(var_or(
                    "CARELANE_EMERGENCY_PER_KM_CENTS",
                    EMERGENCY_PER_KM_CENTS,
                )),
            },
            accept_timeout: env::var("CARELANE_EMERGENCY_ACCEPT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(defaults.emergency.accept_timeout, |secs| {
                    (secs > 0).then(|| Duration::from_secs(secs))
                }),
            ..defaults.emergency
        };

        let verification = DomainRules {
            pricing: PricingRule::Flat {
                fee: Money::from_cents(var_or(
                    "CARELANE_VERIFICATION_FEE_CENTS",
                    VERIFICATION_FEE_CENTS,
                )),
            },
            ..defaults.verification
        };

        Self {
            pricing,
            emergency,
            verification,
            ..defaults
        }
    }
}

const EMERGENCY_BASE_FEE_CENTS: i64 = 15_000;
const EMERGENCY_PER_KM_CENTS: i64 = 250;
const VERIFICATION_FEE_CENTS: i64 = 0;
const EMERGENCY_ACCEPT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            emergency: DomainRules {
                pricing: PricingRule::DistanceBased {
                    base_fee: Money::from_cents(EMERGENCY_BASE_FEE_CENTS),
                    per_km: Money::from_cents(EMERGENCY_PER_KM_CENTS),
                },
                tie_break: TieBreak::Nearest,
                cancellation: CancellationPolicy::ClearAssignment,
                accept_timeout: Some(EMERGENCY_ACCEPT_TIMEOUT),
            },
            pharmacy: DomainRules {
                pricing: PricingRule::Itemized,
                tie_break: TieBreak::LeastLoaded,
                cancellation: CancellationPolicy::RetainAssignment,
                accept_timeout: None,
            },
            lab: DomainRules {
                pricing: PricingRule::Itemized,
                tie_break: TieBreak::LeastLoaded,
                cancellation: CancellationPolicy::ClearAssignment,
                accept_timeout: None,
            },
            homecare: DomainRules {
                pricing: PricingRule::Itemized,
                tie_break: TieBreak::Nearest,
                cancellation: CancellationPolicy::ClearAssignment,
                accept_timeout: None,
            },
            verification: DomainRules {
                pricing: PricingRule::Flat {
                    fee: Money::from_cents(VERIFICATION_FEE_CENTS),
                },
                tie_break: TieBreak::LeastLoaded,
                cancellation: CancellationPolicy::ClearAssignment,
                accept_timeout: None,
            },
        }
    }
}
