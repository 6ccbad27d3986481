//! # Price Resolution
//!
//! Turns a measured treatment into a full [`PriceBreakdown`]:
//!
//! 1. Base cost from the grid (banded lookup, plus fabric if the grid
//!    excludes it) or from the flat unit price
//! 2. Markup from the fallback chain in [`crate::markup`]
//! 3. Sell price and margin from [`crate::margin`]
//!
//! Single-item pricing fails fast: bad measurements are a
//! [`PricingError::Validation`], a material with nothing to price from is a
//! [`PricingError::Configuration`]. Nothing here defaults to a zero price.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::grid::{GridKey, GridTable};
//! use pricing_core::markup::{MarkupSettings, MarkupSource};
//! use pricing_core::pricing::price;
//! use pricing_core::treatment::TreatmentInput;
//!
//! let grid = GridTable::from_matrix(
//!     GridKey::new("acme", "roller_blind", "A"),
//!     vec![100.0, 150.0, 200.0],
//!     vec![vec![200.0, 50.0, 70.0, 90.0]],
//! )
//! .unwrap();
//!
//! let mut settings = MarkupSettings::default();
//! settings.default_markup_percentage = 100.0;
//! settings.minimum_markup_percentage = 20.0;
//!
//! let input = TreatmentInput::gridded("misc", &grid, 120.0, 200.0);
//! let breakdown = price(&input, &settings).unwrap();
//! assert_eq!(breakdown.base_cost, 70.0);
//! assert_eq!(breakdown.sell_price, 140.0);
//! assert_eq!(breakdown.resolved_markup_source, MarkupSource::Default);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{PricingError, PricingResult};
use crate::fabric::fabric_requirement;
use crate::grid::GridCell;
use crate::margin::{checked_apply_markup, markup_to_margin};
use crate::markup::{resolve, MarkupContext, MarkupSettings, MarkupSource};
use crate::price_book::PriceBook;
use crate::treatment::{TreatmentInput, TreatmentRecord};

/// How the base cost was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMethod {
    Grid,
    Flat,
}

/// Computed price fields written back onto a treatment record.
///
/// ## JSON Example
///
/// ```json
/// {
///   "method": "grid",
///   "grid_id": "6f1c0a52-93c4-4d43-9a53-2f4d7b0c9e11",
///   "grid_cell": { "column_index": 1, "row_index": 0, "width_band": 150.0, "drop_band": 200.0, "price": 70.0 },
///   "quantity": 1.0,
///   "fabric_required_units": null,
///   "fabric_widths": null,
///   "fabric_cost": 0.0,
///   "base_cost": 70.0,
///   "resolved_markup_percent": 100.0,
///   "resolved_markup_source": "default",
///   "sell_price": 140.0,
///   "margin_percent_equivalent": 50.0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub method: PricingMethod,

    #[serde(default)]
    pub grid_id: Option<Uuid>,

    /// Band the grid lookup quoted
    #[serde(default)]
    pub grid_cell: Option<GridCell>,

    pub quantity: f64,

    /// Linear metres of fabric, when the grid excludes fabric
    #[serde(default)]
    pub fabric_required_units: Option<f64>,

    /// Whole fabric widths, when the grid excludes fabric
    #[serde(default)]
    pub fabric_widths: Option<u32>,

    /// Fabric cost for all units
    #[serde(default)]
    pub fabric_cost: f64,

    /// Cost before markup, for all units
    pub base_cost: f64,

    pub resolved_markup_percent: f64,

    pub resolved_markup_source: MarkupSource,

    pub sell_price: f64,

    pub margin_percent_equivalent: f64,
}

impl PriceBreakdown {
    /// Gross profit: sell price minus base cost
    pub fn profit(&self) -> f64 {
        self.sell_price - self.base_cost
    }
}

/// Price a treatment whose material has already been resolved.
pub fn price(
    input: &TreatmentInput<'_>,
    settings: &MarkupSettings,
) -> PricingResult<PriceBreakdown> {
    input.validate()?;

    let mut grid_id = None;
    let mut grid_cell = None;
    let mut fabric_required_units = None;
    let mut fabric_widths = None;
    let mut fabric_cost = 0.0;

    let (method, unit_cost) = match (input.grid, input.unit_price) {
        (Some(grid), _) => {
            grid.validate()?;
            let cell = grid.lookup_cell(input.width_cm, input.drop_cm)?;
            let mut unit_cost = cell.price;

            if !grid.includes_fabric_price {
                let spec = input.fabric.ok_or_else(|| {
                    PricingError::configuration(
                        format!("grid {}", grid.key),
                        "grid excludes fabric but the material has no fabric spec",
                    )
                })?;
                let req = fabric_requirement(spec, input.width_cm, input.drop_cm)?;
                fabric_required_units = Some(req.units * input.quantity);
                fabric_widths = Some(req.widths);
                fabric_cost = req.cost * input.quantity;
                unit_cost += req.cost;
            }

            grid_id = Some(grid.id);
            grid_cell = Some(cell);
            (PricingMethod::Grid, unit_cost)
        }
        (None, Some(unit_price)) => {
            if !unit_price.is_finite() || unit_price < 0.0 {
                return Err(PricingError::configuration(
                    format!("category {}", input.category_key),
                    format!("unit price {} is not a valid price", unit_price),
                ));
            }
            (PricingMethod::Flat, unit_price)
        }
        (None, None) => {
            return Err(PricingError::configuration(
                format!("category {}", input.category_key),
                "material has neither a pricing grid nor a unit price",
            ));
        }
    };

    let base_cost = unit_cost * input.quantity;

    let ctx = MarkupContext::new(settings)
        .with_class(input.line_class)
        .with_grid_markup(input.grid.and_then(|g| g.markup_percentage))
        .with_category(input.category_key);
    let markup = resolve(&ctx);

    let sell_price = checked_apply_markup(base_cost, markup.percent)?;
    let margin_percent_equivalent = markup_to_margin(markup.percent);

    debug!(
        method = ?method,
        base_cost,
        markup = markup.percent,
        source = %markup.source,
        sell_price,
        "Priced treatment"
    );

    Ok(PriceBreakdown {
        method,
        grid_id,
        grid_cell,
        quantity: input.quantity,
        fabric_required_units,
        fabric_widths,
        fabric_cost,
        base_cost,
        resolved_markup_percent: markup.percent,
        resolved_markup_source: markup.source,
        sell_price,
        margin_percent_equivalent,
    })
}

/// Prices treatments against one immutable [`PriceBook`] snapshot.
///
/// Cloning is cheap and the snapshot is never mutated, so one service can
/// be shared across concurrent requests or resync workers.
#[derive(Debug, Clone)]
pub struct PriceResolutionService {
    book: Arc<PriceBook>,
}

impl PriceResolutionService {
    pub fn new(book: Arc<PriceBook>) -> Self {
        PriceResolutionService { book }
    }

    pub fn book(&self) -> &PriceBook {
        &self.book
    }

    /// Price an already-resolved input under the snapshot's settings.
    pub fn price(&self, input: &TreatmentInput<'_>) -> PricingResult<PriceBreakdown> {
        price(input, &self.book.settings)
    }

    /// Resolve a stored treatment's material and grid into a pricing input.
    pub fn input_for<'a>(
        &'a self,
        record: &'a TreatmentRecord,
    ) -> PricingResult<TreatmentInput<'a>> {
        let material = self.book.materials.get(&record.material_id).ok_or_else(|| {
            PricingError::configuration(
                format!("treatment '{}'", record.label),
                format!("material {} not found", record.material_id),
            )
        })?;

        let grid = material.grid.as_ref().and_then(|key| self.book.grids.active(key));
        if grid.is_none() && material.unit_price.is_none() {
            let reason = match &material.grid {
                Some(key) => format!("no active pricing grid for {} and no unit price", key),
                None => "material has neither a pricing grid nor a unit price".to_string(),
            };
            return Err(PricingError::configuration(
                format!("material '{}'", material.name),
                reason,
            ));
        }

        Ok(TreatmentInput {
            width_cm: record.width_cm,
            drop_cm: record.drop_cm,
            quantity: record.quantity,
            category_key: record.category_key.as_deref().unwrap_or(material.category_key.as_str()),
            line_class: record.line_class,
            grid,
            unit_price: material.unit_price,
            fabric: material.fabric.as_ref(),
        })
    }

    /// Price a stored treatment under the snapshot's settings and grids.
    pub fn price_record(&self, record: &TreatmentRecord) -> PricingResult<PriceBreakdown> {
        let input = self.input_for(record)?;
        self.price(&input)
    }
}
