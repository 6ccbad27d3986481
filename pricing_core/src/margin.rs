//! # Markup and Margin Math
//!
//! Markup is cost-based, margin is price-based:
//!
//! ```text
//! sell   = cost × (1 + markup / 100)
//! margin = markup / (100 + markup) × 100
//! markup = margin / (100 - margin) × 100
//! ```
//!
//! A 100% markup is a 50% margin.

use crate::errors::{PricingError, PricingResult};

/// Convert a markup percentage to the equivalent margin percentage.
///
/// Returns 0 for markups of 0 or less.
///
/// ```rust
/// use pricing_core::margin::markup_to_margin;
///
/// assert_eq!(markup_to_margin(100.0), 50.0);
/// assert_eq!(markup_to_margin(-20.0), 0.0);
/// ```
pub fn markup_to_margin(markup_percent: f64) -> f64 {
    if markup_percent <= 0.0 {
        return 0.0;
    }
    markup_percent / (100.0 + markup_percent) * 100.0
}

/// Convert a margin percentage back to markup.
///
/// Returns 0 for margins of 0 or less. A margin of 100% or more has no
/// finite markup and is rejected.
pub fn margin_to_markup(margin_percent: f64) -> PricingResult<f64> {
    if margin_percent >= 100.0 || !margin_percent.is_finite() {
        return Err(PricingError::validation(
            "margin_percent",
            margin_percent.to_string(),
            "Margin must be below 100%",
        ));
    }
    if margin_percent <= 0.0 {
        return Ok(0.0);
    }
    Ok(margin_percent / (100.0 - margin_percent) * 100.0)
}

/// Apply a markup percentage to a cost.
///
/// ```rust
/// use pricing_core::margin::apply_markup;
///
/// assert_eq!(apply_markup(70.0, 100.0), 140.0);
/// ```
pub fn apply_markup(cost: f64, markup_percent: f64) -> f64 {
    cost * (1.0 + markup_percent / 100.0)
}

/// [`apply_markup`] with the domain checks the pricing service relies on:
/// cost must be a non-negative number and markup at least -100%.
pub fn checked_apply_markup(cost: f64, markup_percent: f64) -> PricingResult<f64> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(PricingError::validation(
            "cost",
            cost.to_string(),
            "Cost must be a non-negative number",
        ));
    }
    if !markup_percent.is_finite() || markup_percent < -100.0 {
        return Err(PricingError::validation(
            "markup_percent",
            markup_percent.to_string(),
            "Markup below -100% implies a negative sell price",
        ));
    }
    Ok(apply_markup(cost, markup_percent))
}

/// Round to whole cents, half away from zero. Display only; stored
/// breakdowns keep full precision.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
