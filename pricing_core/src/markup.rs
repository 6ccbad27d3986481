//! # Markup Resolution
//!
//! Picks the markup percentage for a priced line item by walking a fixed
//! fallback chain, most specific first:
//!
//! 1. **Grid** - the pricing grid's own `markup_percentage`, if set (0 counts)
//! 2. **Category** - `category_markups[category_key]`, if > 0
//! 3. **Material/labor** - the class-specific percentage, if > 0
//! 4. **Default** - `default_markup_percentage`
//!
//! The winner is then clamped to `minimum_markup_percentage`. The floor is
//! not a tier: when it lifts the value the source becomes `MinimumFloor`
//! regardless of which tier produced the pre-clamp value.
//!
//! Reordering these tiers changes historical prices on the next resync.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::markup::{resolve, MarkupContext, MarkupSettings, MarkupSource};
//!
//! let mut settings = MarkupSettings::default();
//! settings.default_markup_percentage = 50.0;
//! settings.category_markups.insert("blind_making".to_string(), 30.0);
//!
//! let ctx = MarkupContext::new(&settings)
//!     .with_grid_markup(Some(15.0))
//!     .with_category("blind_making");
//! let resolved = resolve(&ctx);
//! assert_eq!(resolved.percent, 15.0);
//! assert_eq!(resolved.source, MarkupSource::Grid);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::{PricingError, PricingResult};

/// Category keys the settings screen knows about.
pub static KNOWN_CATEGORIES: Lazy<Vec<(&'static str, LineItemClass)>> = Lazy::new(|| {
    vec![
        ("curtain_making", LineItemClass::Labor),
        ("hardware", LineItemClass::Material),
        ("fabric", LineItemClass::Material),
        ("installation", LineItemClass::Labor),
        ("roman_making", LineItemClass::Labor),
        ("blind_making", LineItemClass::Labor),
        ("shutter_making", LineItemClass::Labor),
    ]
});

/// Account-wide markup configuration.
///
/// For `material_markup_percentage`, `labor_markup_percentage` and every
/// category entry, 0 means "unset" and the resolver skips that tier.
///
/// ## JSON Example
///
/// ```json
/// {
///   "default_markup_percentage": 50.0,
///   "minimum_markup_percentage": 20.0,
///   "material_markup_percentage": 0.0,
///   "labor_markup_percentage": 35.0,
///   "category_markups": { "fabric": 60.0, "hardware": 0.0 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupSettings {
    pub default_markup_percentage: f64,

    /// Absolute lower bound on any resolved markup
    pub minimum_markup_percentage: f64,

    #[serde(default)]
    pub material_markup_percentage: f64,

    #[serde(default)]
    pub labor_markup_percentage: f64,

    #[serde(default)]
    pub category_markups: BTreeMap<String, f64>,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        MarkupSettings {
            default_markup_percentage: 50.0,
            minimum_markup_percentage: 0.0,
            material_markup_percentage: 0.0,
            labor_markup_percentage: 0.0,
            category_markups: KNOWN_CATEGORIES
                .iter()
                .map(|(key, _)| (key.to_string(), 0.0))
                .collect(),
        }
    }
}

impl MarkupSettings {
    /// Reject percentages that would allow a negative sell price.
    pub fn validate(&self) -> PricingResult<()> {
        check_percent("default_markup_percentage", self.default_markup_percentage)?;
        check_percent("minimum_markup_percentage", self.minimum_markup_percentage)?;
        check_percent("material_markup_percentage", self.material_markup_percentage)?;
        check_percent("labor_markup_percentage", self.labor_markup_percentage)?;
        for (key, value) in &self.category_markups {
            check_percent(&format!("category_markups.{}", key), *value)?;
        }
        Ok(())
    }

    /// Category markup if set (> 0)
    pub fn category_markup(&self, category_key: &str) -> Option<f64> {
        self.category_markups
            .get(category_key)
            .copied()
            .filter(|pct| *pct > 0.0)
    }

    /// Material or labor markup for a line item class if set (> 0)
    pub fn class_markup(&self, class: LineItemClass) -> Option<f64> {
        let pct = match class {
            LineItemClass::Material => self.material_markup_percentage,
            LineItemClass::Labor => self.labor_markup_percentage,
        };
        Some(pct).filter(|pct| *pct > 0.0)
    }
}

fn check_percent(field: &str, value: f64) -> PricingResult<()> {
    if !value.is_finite() || value < -100.0 {
        return Err(PricingError::validation(
            field,
            value.to_string(),
            "Markup must be a number of at least -100%",
        ));
    }
    Ok(())
}

/// Whether a line item is priced as goods or as work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemClass {
    Material,
    Labor,
}

impl LineItemClass {
    /// Classification for a known category key; `None` for unknown keys.
    pub fn for_category(category_key: &str) -> Option<LineItemClass> {
        KNOWN_CATEGORIES
            .iter()
            .find(|(key, _)| *key == category_key)
            .map(|(_, class)| *class)
            .or_else(|| category_key.ends_with("_making").then_some(LineItemClass::Labor))
    }
}

/// Which rule produced the resolved markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupSource {
    Grid,
    Category,
    MaterialOrLabor,
    Default,
    MinimumFloor,
}

impl fmt::Display for MarkupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkupSource::Grid => write!(f, "grid"),
            MarkupSource::Category => write!(f, "category"),
            MarkupSource::MaterialOrLabor => write!(f, "material_or_labor"),
            MarkupSource::Default => write!(f, "default"),
            MarkupSource::MinimumFloor => write!(f, "minimum_floor"),
        }
    }
}

/// Everything the resolver needs for one line item.
#[derive(Debug, Clone, Copy)]
pub struct MarkupContext<'a> {
    pub settings: &'a MarkupSettings,
    pub grid_markup: Option<f64>,
    pub category_key: Option<&'a str>,
    pub class: Option<LineItemClass>,
}

impl<'a> MarkupContext<'a> {
    pub fn new(settings: &'a MarkupSettings) -> Self {
        MarkupContext {
            settings,
            grid_markup: None,
            category_key: None,
            class: None,
        }
    }

    pub fn with_grid_markup(mut self, grid_markup: Option<f64>) -> Self {
        self.grid_markup = grid_markup;
        self
    }

    /// Set the category; also infers the class if none was given.
    pub fn with_category(mut self, category_key: &'a str) -> Self {
        self.category_key = Some(category_key);
        if self.class.is_none() {
            self.class = LineItemClass::for_category(category_key);
        }
        self
    }

    pub fn with_class(mut self, class: Option<LineItemClass>) -> Self {
        if class.is_some() {
            self.class = class;
        }
        self
    }
}

/// Resolved markup and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMarkup {
    pub percent: f64,
    pub source: MarkupSource,
}

/// Resolve the effective markup for a line item.
pub fn resolve(ctx: &MarkupContext<'_>) -> ResolvedMarkup {
    let settings = ctx.settings;

    let tiered = ctx
        .grid_markup
        .map(|pct| (pct, MarkupSource::Grid))
        .or_else(|| {
            ctx.category_key
                .and_then(|key| settings.category_markup(key))
                .map(|pct| (pct, MarkupSource::Category))
        })
        .or_else(|| {
            ctx.class
                .and_then(|class| settings.class_markup(class))
                .map(|pct| (pct, MarkupSource::MaterialOrLabor))
        })
        .unwrap_or((settings.default_markup_percentage, MarkupSource::Default));

    let (percent, source) = tiered;
    if percent < settings.minimum_markup_percentage {
        ResolvedMarkup {
            percent: settings.minimum_markup_percentage,
            source: MarkupSource::MinimumFloor,
        }
    } else {
        ResolvedMarkup { percent, source }
    }
}
