//! # Treatments and Materials
//!
//! Plain records exchanged with the store and the settings screens.
//!
//! - [`Material`] - a product the account sells: either grid-priced
//!   (by [`GridKey`]) or flat-priced (unit price × quantity).
//! - [`TreatmentRecord`] - one measured window/treatment as persisted, with
//!   the last computed [`PriceBreakdown`] written onto it.
//! - [`TreatmentInput`] - a treatment with its material already resolved,
//!   ready for [`crate::pricing::PriceResolutionService::price`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{PricingError, PricingResult};
use crate::fabric::FabricSpec;
use crate::grid::{GridKey, GridTable};
use crate::markup::LineItemClass;
use crate::pricing::PriceBreakdown;

/// A product/material that treatments are priced from.
///
/// ## JSON Example
///
/// ```json
/// {
///   "id": "0b5e2c1e-4a59-4b7e-8d4f-17a6f2b0a9c3",
///   "name": "Blockout roller - Group A",
///   "category_key": "blind_making",
///   "grid": { "supplier_id": "acme", "product_type": "roller_blind", "price_group": "A" },
///   "unit_price": null,
///   "fabric": null
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: Uuid,

    pub name: String,

    /// Markup category (e.g. "curtain_making", "hardware")
    pub category_key: String,

    /// Pricing grid identity, for grid-priced products
    #[serde(default)]
    pub grid: Option<GridKey>,

    /// Flat price per unit, for products without a grid
    #[serde(default)]
    pub unit_price: Option<f64>,

    /// Fabric metadata, used when the grid excludes fabric
    #[serde(default)]
    pub fabric: Option<FabricSpec>,
}

impl Material {
    /// A material priced from a grid
    pub fn grid_priced(
        name: impl Into<String>,
        category_key: impl Into<String>,
        grid: GridKey,
    ) -> Self {
        Material {
            id: Uuid::new_v4(),
            name: name.into(),
            category_key: category_key.into(),
            grid: Some(grid),
            unit_price: None,
            fabric: None,
        }
    }

    /// A material priced per unit
    pub fn flat_priced(
        name: impl Into<String>,
        category_key: impl Into<String>,
        unit_price: f64,
    ) -> Self {
        Material {
            id: Uuid::new_v4(),
            name: name.into(),
            category_key: category_key.into(),
            grid: None,
            unit_price: Some(unit_price),
            fabric: None,
        }
    }

    pub fn with_fabric(mut self, fabric: FabricSpec) -> Self {
        self.fabric = Some(fabric);
        self
    }
}

/// A persisted window/treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRecord {
    pub id: Uuid,

    /// Job/working set this treatment belongs to
    #[serde(default)]
    pub job_id: Option<Uuid>,

    /// User label (e.g. "Lounge - left window")
    pub label: String,

    /// Finished width in centimetres
    pub width_cm: f64,

    /// Finished drop in centimetres
    pub drop_cm: f64,

    #[serde(default = "default_quantity")]
    pub quantity: f64,

    pub material_id: Uuid,

    /// Overrides the material's category for markup purposes
    #[serde(default)]
    pub category_key: Option<String>,

    /// Overrides the class inferred from the category
    #[serde(default)]
    pub line_class: Option<LineItemClass>,

    /// Last computed price, overwritten in place
    #[serde(default)]
    pub breakdown: Option<PriceBreakdown>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_quantity() -> f64 {
    1.0
}

impl TreatmentRecord {
    pub fn new(label: impl Into<String>, width_cm: f64, drop_cm: f64, material_id: Uuid) -> Self {
        TreatmentRecord {
            id: Uuid::new_v4(),
            job_id: None,
            label: label.into(),
            width_cm,
            drop_cm,
            quantity: default_quantity(),
            material_id,
            category_key: None,
            line_class: None,
            breakdown: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sell price from the stored breakdown, if it has been priced
    pub fn stored_sell_price(&self) -> Option<f64> {
        self.breakdown.as_ref().map(|b| b.sell_price)
    }
}

/// A treatment ready to be priced: measurements plus whatever the material
/// resolved to.
#[derive(Debug, Clone, Copy)]
pub struct TreatmentInput<'a> {
    pub width_cm: f64,
    pub drop_cm: f64,
    pub quantity: f64,
    pub category_key: &'a str,
    pub line_class: Option<LineItemClass>,
    /// The active grid for the material, if it is grid-priced
    pub grid: Option<&'a GridTable>,
    /// Flat unit price, used when there is no grid
    pub unit_price: Option<f64>,
    pub fabric: Option<&'a FabricSpec>,
}

impl<'a> TreatmentInput<'a> {
    /// Input for a flat-priced line
    pub fn flat(category_key: &'a str, unit_price: f64, quantity: f64) -> Self {
        TreatmentInput {
            width_cm: 0.0,
            drop_cm: 0.0,
            quantity,
            category_key,
            line_class: None,
            grid: None,
            unit_price: Some(unit_price),
            fabric: None,
        }
    }

    /// Input for a grid-priced window
    pub fn gridded(
        category_key: &'a str,
        grid: &'a GridTable,
        width_cm: f64,
        drop_cm: f64,
    ) -> Self {
        TreatmentInput {
            width_cm,
            drop_cm,
            quantity: 1.0,
            category_key,
            line_class: None,
            grid: Some(grid),
            unit_price: None,
            fabric: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_fabric(mut self, fabric: &'a FabricSpec) -> Self {
        self.fabric = Some(fabric);
        self
    }

    pub fn with_class(mut self, class: LineItemClass) -> Self {
        self.line_class = Some(class);
        self
    }

    /// Validate measurements and quantity.
    ///
    /// Grid pricing needs a positive width and drop. Flat-priced
    /// lines (hardware, installation) may leave them at 0, but never negative.
    pub fn validate(&self) -> PricingResult<()> {
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(PricingError::validation(
                "quantity",
                self.quantity.to_string(),
                "Quantity cannot be negative",
            ));
        }
        let measured = self.grid.is_some();
        for (field, value) in [("width_cm", self.width_cm), ("drop_cm", self.drop_cm)] {
            let invalid = !value.is_finite() || value < 0.0 || (measured && value == 0.0);
            if invalid {
                return Err(PricingError::validation(
                    field,
                    value.to_string(),
                    "Measurement must be positive",
                ));
            }
        }
        Ok(())
    }
}
