//! # Fabric Requirement
//!
//! When a grid price excludes fabric, the fabric is costed separately from
//! how many whole fabric widths the treatment needs and how long each cut is.
//!
//! ```text
//! widths   = ceil(width × fullness / usable_width)      -- whole widths only
//! cut_drop = drop + hem_allowance, rounded up to the next full pattern repeat
//! units    = widths × cut_drop / 100                     -- linear metres
//! ```
//!
//! Fabric is cut in whole widths, so a treatment needing 2.1 widths buys 3.

use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, PricingResult};

/// Roll and pattern metadata for a fabric material.
///
/// ## JSON Example
///
/// ```json
/// {
///   "usable_width_cm": 137.0,
///   "pattern_repeat_cm": 64.0,
///   "unit_cost": 42.5,
///   "fullness": 2.0,
///   "hem_allowance_cm": 30.0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricSpec {
    /// Usable roll width in centimetres
    pub usable_width_cm: f64,

    /// Vertical pattern repeat in centimetres (0 for plains)
    #[serde(default)]
    pub pattern_repeat_cm: f64,

    /// Cost per linear metre
    pub unit_cost: f64,

    /// Gathering multiplier applied to the finished width
    #[serde(default = "default_fullness")]
    pub fullness: f64,

    /// Extra length per cut for headings and hems (cm)
    #[serde(default)]
    pub hem_allowance_cm: f64,
}

fn default_fullness() -> f64 {
    1.0
}

impl FabricSpec {
    pub fn new(usable_width_cm: f64, unit_cost: f64) -> Self {
        FabricSpec {
            usable_width_cm,
            pattern_repeat_cm: 0.0,
            unit_cost,
            fullness: default_fullness(),
            hem_allowance_cm: 0.0,
        }
    }

    pub fn with_pattern_repeat(mut self, repeat_cm: f64) -> Self {
        self.pattern_repeat_cm = repeat_cm;
        self
    }

    pub fn with_fullness(mut self, fullness: f64) -> Self {
        self.fullness = fullness;
        self
    }

    pub fn with_hem_allowance(mut self, hem_allowance_cm: f64) -> Self {
        self.hem_allowance_cm = hem_allowance_cm;
        self
    }

    pub fn validate(&self) -> PricingResult<()> {
        let subject = "fabric spec";
        if !self.usable_width_cm.is_finite() || self.usable_width_cm <= 0.0 {
            return Err(PricingError::configuration(subject, "usable roll width must be positive"));
        }
        if !self.pattern_repeat_cm.is_finite() || self.pattern_repeat_cm < 0.0 {
            return Err(PricingError::configuration(subject, "pattern repeat cannot be negative"));
        }
        if !self.unit_cost.is_finite() || self.unit_cost < 0.0 {
            return Err(PricingError::configuration(subject, "fabric unit cost cannot be negative"));
        }
        if !self.fullness.is_finite() || self.fullness <= 0.0 {
            return Err(PricingError::configuration(subject, "fullness must be positive"));
        }
        if !self.hem_allowance_cm.is_finite() || self.hem_allowance_cm < 0.0 {
            return Err(PricingError::configuration(subject, "hem allowance cannot be negative"));
        }
        Ok(())
    }
}

/// How much fabric one treatment consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FabricRequirement {
    /// Whole fabric widths
    pub widths: u32,
    /// Length of each cut after hem and repeat allowance (cm)
    pub cut_drop_cm: f64,
    /// Linear metres to order
    pub units: f64,
    /// `units × unit_cost`
    pub cost: f64,
}

/// Work out the fabric needed for a finished width and drop (cm).
pub fn fabric_requirement(
    spec: &FabricSpec,
    width_cm: f64,
    drop_cm: f64,
) -> PricingResult<FabricRequirement> {
    spec.validate()?;
    if !width_cm.is_finite() || width_cm <= 0.0 {
        return Err(PricingError::validation(
            "width",
            width_cm.to_string(),
            "width must be a positive number",
        ));
    }
    if !drop_cm.is_finite() || drop_cm <= 0.0 {
        return Err(PricingError::validation(
            "drop",
            drop_cm.to_string(),
            "drop must be a positive number",
        ));
    }

    let widths = (width_cm * spec.fullness / spec.usable_width_cm).ceil().max(1.0);
    if !widths.is_finite() || widths > f64::from(u32::MAX) {
        return Err(PricingError::validation(
            "width",
            width_cm.to_string(),
            format!("needs {} fabric widths, more than can be cut", widths),
        ));
    }

    let mut cut_drop_cm = drop_cm + spec.hem_allowance_cm;
    if spec.pattern_repeat_cm > 0.0 {
        cut_drop_cm = (cut_drop_cm / spec.pattern_repeat_cm).ceil() * spec.pattern_repeat_cm;
    }

    let units = widths * cut_drop_cm / 100.0;
    Ok(FabricRequirement {
        // Bounded above
        widths: widths as u32,
        cut_drop_cm,
        units,
        cost: units * spec.unit_cost,
    })
}
