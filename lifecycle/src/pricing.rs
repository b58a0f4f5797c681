//! Cost computation.
//!
//! All arithmetic is integer cents, rates are basis points (1/100 of a
//! percent) and intermediate products are widened to `i128`, so the same
//! input always yields the same [`Cost`] on every platform.

use crate::error::CostError;
use crate::types::{LineItem, Money, Urgency};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

const BPS_PER_UNIT: i128 = 10_000;

/// A computed cost. The total is derived, never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    subtotal: Money,
    tax: Money,
    surcharge: Money,
    discount: Money,
}

impl Cost {
    /// Line items or distance fee before tax and surcharges
    #[must_use]
    pub const fn subtotal(&self) -> Money {
        self.subtotal
    }

    /// Tax part of the fees
    #[must_use]
    pub const fn tax(&self) -> Money {
        self.tax
    }

    /// Urgency, night and weekend surcharges
    #[must_use]
    pub const fn surcharge(&self) -> Money {
        self.surcharge
    }

    /// Tax plus surcharges
    #[must_use]
    pub const fn fees(&self) -> Money {
        self.tax.saturating_add(self.surcharge)
    }

    /// Deduction applied after fees, already capped
    #[must_use]
    pub const fn discount(&self) -> Money {
        self.discount
    }

    /// `subtotal + fees - discount`
    #[must_use]
    pub const fn total(&self) -> Money {
        self.subtotal
            .saturating_add(self.fees())
            .saturating_sub(self.discount)
    }
}

/// Discount requested by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// No discount
    #[default]
    None,
    /// Fixed amount off
    Flat(Money),
    /// Percentage of `subtotal + fees`, in basis points
    Percent(u32),
}

/// How a domain derives its subtotal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingRule {
    /// Sum of `quantity × unit_price`
    Itemized,
    /// Base fee plus a per-kilometre rate, plus any line items
    DistanceBased {
        /// Dispatch fee
        base_fee: Money,
        /// Rate per kilometre
        per_km: Money,
    },
    /// One fixed fee, plus any line items
    Flat {
        /// Fee
        fee: Money,
    },
}

/// Rates shared by all domains. Every rate is in basis points of the subtotal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Tax rate
    pub tax_rate_bps: u32,
    /// Surcharge for [`Urgency::Urgent`]
    pub urgent_surcharge_bps: u32,
    /// Surcharge for [`Urgency::Critical`]
    pub critical_surcharge_bps: u32,
    /// Surcharge when scheduled inside the night window
    pub night_surcharge_bps: u32,
    /// Surcharge when scheduled on Saturday or Sunday
    pub weekend_surcharge_bps: u32,
    /// First hour (UTC, 0-23) of the night window
    pub night_start_hour: u32,
    /// Hour (UTC, 0-23) the night window ends, exclusive
    pub night_end_hour: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate_bps: 750,
            urgent_surcharge_bps: 2_500,
            critical_surcharge_bps: 5_000,
            night_surcharge_bps: 2_000,
            weekend_surcharge_bps: 1_500,
            night_start_hour: 22,
            night_end_hour: 6,
        }
    }
}

impl PricingConfig {
    fn urgency_bps(&self, urgency: Urgency) -> u32 {
        match urgency {
            Urgency::Routine => 0,
            Urgency::Urgent => self.urgent_surcharge_bps,
            Urgency::Critical => self.critical_surcharge_bps,
        }
    }

    fn is_night(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        if self.night_start_hour <= self.night_end_hour {
            (self.night_start_hour..self.night_end_hour).contains(&hour)
        } else {
            hour >= self.night_start_hour || hour < self.night_end_hour
        }
    }
}

fn is_weekend(at: DateTime<Utc>) -> bool {
    matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Everything a cost depends on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostInput {
    /// Billable lines
    pub line_items: Vec<LineItem>,
    /// Distance for distance-based pricing
    pub distance_km: f64,
    /// Urgency level
    pub urgency: Urgency,
    /// When the service takes place (night/weekend surcharges)
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Requested discount
    pub discount: Discount,
}

fn invalid(reason: impl Into<String>) -> CostError {
    CostError::InvalidCostInput(reason.into())
}

fn to_money(cents: i128) -> Result<Money, CostError> {
    i64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| invalid("amount overflows"))
}

/// `amount × bps / 10 000`, rounded half away from zero
fn apply_bps(amount: Money, bps: u32) -> i128 {
    let product = i128::from(amount.cents()) * i128::from(bps);
    (product + BPS_PER_UNIT / 2) / BPS_PER_UNIT
}

fn items_total(items: &[LineItem]) -> Result<i128, CostError> {
    items.iter().try_fold(0_i128, |acc, item| {
        if item.quantity < 0 {
            return Err(invalid(format!("negative quantity for {}", item.name)));
        }
        if item.unit_price.is_negative() {
            return Err(invalid(format!("negative unit price for {}", item.name)));
        }
        acc.checked_add(i128::from(item.quantity) * i128::from(item.unit_price.cents()))
            .ok_or_else(|| invalid("amount overflows"))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn distance_fee(per_km: Money, distance_km: f64) -> Result<i128, CostError> {
    let cents = (per_km.cents() as f64 * distance_km).round();
    if !cents.is_finite() || cents >= i64::MAX as f64 {
        return Err(invalid("distance fee overflows"));
    }
    Ok(i128::from(cents as i64))
}

fn validate_fee(name: &str, fee: Money) -> Result<(), CostError> {
    if fee.is_negative() {
        return Err(invalid(format!("negative {name}")));
    }
    Ok(())
}

/// Compute the cost of a request.
///
/// Subtotal follows `rule`. Tax and every surcharge are computed from the
/// subtotal and added, never compounded. The discount comes off after fees
/// and is capped so the total never drops below zero.
///
/// # Errors
///
/// [`CostError::InvalidCostInput`] for a negative quantity, unit price,
/// distance or flat discount, a non-finite distance, a percentage above
/// 100 %, a negative rule fee, or an amount that overflows.
pub fn compute_cost(
    input: &CostInput,
    rule: &PricingRule,
    config: &PricingConfig,
) -> Result<Cost, CostError> {
    if !input.distance_km.is_finite() {
        return Err(invalid("distance is not a finite number"));
    }
    if input.distance_km < 0.0 {
        return Err(invalid("negative distance"));
    }

    let items = items_total(&input.line_items)?;
    let subtotal = match *rule {
        PricingRule::Itemized => items,
        PricingRule::DistanceBased { base_fee, per_km } => {
            validate_fee("base fee", base_fee)?;
            validate_fee("per-km rate", per_km)?;
            i128::from(base_fee.cents()) + distance_fee(per_km, input.distance_km)? + items
        },
        PricingRule::Flat { fee } => {
            validate_fee("flat fee", fee)?;
            i128::from(fee.cents()) + items
        },
    };
    let subtotal = to_money(subtotal)?;

    let tax = apply_bps(subtotal, config.tax_rate_bps);

    let mut surcharge = apply_bps(subtotal, config.urgency_bps(input.urgency));
    if let Some(at) = input.scheduled_at {
        if config.is_night(at) {
            surcharge += apply_bps(subtotal, config.night_surcharge_bps);
        }
        if is_weekend(at) {
            surcharge += apply_bps(subtotal, config.weekend_surcharge_bps);
        }
    }

    let gross = i128::from(subtotal.cents()) + tax + surcharge;
    // The total has to fit, not only its parts
    to_money(gross)?;
    let requested = match input.discount {
        Discount::None => 0,
        Discount::Flat(amount) => {
            if amount.is_negative() {
                return Err(invalid("negative discount"));
            }
            i128::from(amount.cents())
        },
        Discount::Percent(bps) => {
            if i128::from(bps) > BPS_PER_UNIT {
                return Err(invalid("discount above 100%"));
            }
            (gross * i128::from(bps) + BPS_PER_UNIT / 2) / BPS_PER_UNIT
        },
    };

    Ok(Cost {
        subtotal,
        tax: to_money(tax)?,
        surcharge: to_money(surcharge)?,
        discount: to_money(requested.min(gross))?,
    })
}
