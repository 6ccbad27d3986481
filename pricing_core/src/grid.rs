//! # Pricing Grids
//!
//! A pricing grid is a supplier's width × drop price table for one product
//! and price group. Lookups use "next size up" banding: a 190 cm blind is
//! quoted at the 200 cm column, never interpolated down. Anything larger
//! than the biggest listed size is quoted at that size.
//!
//! ## Structure
//!
//! ```text
//! GridTable
//! ├── key: GridKey (supplier_id, product_type, price_group)
//! ├── width_columns: [100, 150, 200]
//! └── drop_rows:
//!     ├── { drop: 150, prices: [40, 55, 70] }
//!     └── { drop: 200, prices: [50, 70, 90] }
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::grid::{GridKey, GridTable};
//!
//! let grid = GridTable::from_matrix(
//!     GridKey::new("acme", "roller_blind", "A"),
//!     vec![100.0, 150.0, 200.0],
//!     vec![vec![200.0, 50.0, 70.0, 90.0]],
//! )
//! .unwrap();
//!
//! assert_eq!(grid.lookup(120.0, 200.0).unwrap(), 70.0);
//! assert_eq!(grid.lookup(500.0, 200.0).unwrap(), 90.0);
//! ```

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::{PricingError, PricingResult};

/// Identity of a grid: at most one active grid exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridKey {
    pub supplier_id: String,
    pub product_type: String,
    pub price_group: String,
}

impl GridKey {
    pub fn new(
        supplier_id: impl Into<String>,
        product_type: impl Into<String>,
        price_group: impl Into<String>,
    ) -> Self {
        GridKey {
            supplier_id: supplier_id.into(),
            product_type: product_type.into(),
            price_group: price_group.into(),
        }
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.supplier_id, self.product_type, self.price_group)
    }
}

/// One drop band with a price per width column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropRow {
    /// Drop breakpoint in centimetres
    pub drop: f64,
    /// Cost per width column, same order as `GridTable::width_columns`
    pub prices: Vec<f64>,
}

/// The band a lookup landed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub column_index: usize,
    pub row_index: usize,
    /// Width column quoted (cm)
    pub width_band: f64,
    /// Drop row quoted (cm)
    pub drop_band: f64,
    pub price: f64,
}

/// Immutable width × drop price table.
///
/// ## JSON Example
///
/// ```json
/// {
///   "id": "6f1c0a52-93c4-4d43-9a53-2f4d7b0c9e11",
///   "key": { "supplier_id": "acme", "product_type": "roller_blind", "price_group": "A" },
///   "width_columns": [100.0, 150.0, 200.0],
///   "drop_rows": [{ "drop": 200.0, "prices": [50.0, 70.0, 90.0] }],
///   "includes_fabric_price": true,
///   "markup_percentage": null,
///   "active": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTable {
    pub id: Uuid,

    pub key: GridKey,

    /// Width breakpoints in centimetres, ascending and unique
    pub width_columns: Vec<f64>,

    /// Drop rows, ascending by `drop`
    pub drop_rows: Vec<DropRow>,

    /// If false, fabric is costed separately and added by the caller
    #[serde(default = "default_true")]
    pub includes_fabric_price: bool,

    /// Grid-level markup override. `Some(0.0)` is a deliberate zero markup.
    #[serde(default)]
    pub markup_percentage: Option<f64>,

    /// Soft-delete flag; inactive grids are kept while treatments reference them
    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl GridTable {
    /// Build a grid from its width columns and drop rows, checking invariants.
    pub fn new(
        key: GridKey,
        width_columns: Vec<f64>,
        drop_rows: Vec<DropRow>,
    ) -> PricingResult<Self> {
        let grid = GridTable {
            id: Uuid::new_v4(),
            key,
            width_columns,
            drop_rows,
            includes_fabric_price: true,
            markup_percentage: None,
            active: true,
            created: Utc::now(),
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Build a grid from the parsed import shape: a header of widths, then
    /// rows of `[drop, price_for_width_0, price_for_width_1, ...]`.
    pub fn from_matrix(
        key: GridKey,
        header_widths: Vec<f64>,
        rows: Vec<Vec<f64>>,
    ) -> PricingResult<Self> {
        let subject = format!("grid {}", key);
        let mut drop_rows = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            let Some((&drop, prices)) = row.split_first() else {
                return Err(PricingError::configuration(
                    subject,
                    format!("row {} is empty", i + 1),
                ));
            };
            drop_rows.push(DropRow {
                drop,
                prices: prices.to_vec(),
            });
        }
        GridTable::new(key, header_widths, drop_rows)
    }

    /// Set whether the grid price already includes fabric.
    pub fn with_fabric_included(mut self, included: bool) -> Self {
        self.includes_fabric_price = included;
        self
    }

    /// Set the grid-level markup override.
    pub fn with_markup(mut self, markup_percentage: Option<f64>) -> Self {
        self.markup_percentage = markup_percentage;
        self
    }

    /// Check the structural invariants. Grids arriving through serde are
    /// not validated on the way in, so pricing calls this before use.
    pub fn validate(&self) -> PricingResult<()> {
        let subject = format!("grid {}", self.key);

        if self.width_columns.is_empty() {
            return Err(PricingError::configuration(subject, "grid has no width columns"));
        }
        if self.drop_rows.is_empty() {
            return Err(PricingError::configuration(subject, "grid has no drop rows"));
        }
        if !strictly_ascending(self.width_columns.iter().copied()) {
            return Err(PricingError::configuration(
                subject,
                "width columns must be positive, ascending and unique",
            ));
        }
        if !strictly_ascending(self.drop_rows.iter().map(|r| r.drop)) {
            return Err(PricingError::configuration(
                subject,
                "drop rows must be positive, ascending and unique",
            ));
        }

        let columns = self.width_columns.len();
        for row in &self.drop_rows {
            if row.prices.len() != columns {
                return Err(PricingError::configuration(
                    subject,
                    format!(
                        "drop row {} has {} prices, expected {}",
                        row.drop,
                        row.prices.len(),
                        columns
                    ),
                ));
            }
            if let Some(bad) = row.prices.iter().find(|p| !p.is_finite() || **p < 0.0) {
                return Err(PricingError::configuration(
                    subject,
                    format!("drop row {} has invalid price {}", row.drop, bad),
                ));
            }
        }

        if let Some(markup) = self.markup_percentage {
            if !markup.is_finite() || markup < -100.0 {
                return Err(PricingError::configuration(
                    subject,
                    format!("grid markup {} is below -100%", markup),
                ));
            }
        }

        Ok(())
    }

    /// Largest listed width (cm)
    pub fn max_width(&self) -> f64 {
        self.width_columns.last().copied().unwrap_or(0.0)
    }

    /// Largest listed drop (cm)
    pub fn max_drop(&self) -> f64 {
        self.drop_rows.last().map(|r| r.drop).unwrap_or(0.0)
    }

    /// Look up the base cost for a width and drop in centimetres.
    ///
    /// Out-of-range sizes clamp to the last column/row; only non-positive
    /// or non-finite measurements are rejected.
    pub fn lookup(&self, width: f64, drop: f64) -> PricingResult<f64> {
        self.lookup_cell(width, drop).map(|cell| cell.price)
    }

    /// Same as [`GridTable::lookup`], but reports which band was quoted.
    pub fn lookup_cell(&self, width: f64, drop: f64) -> PricingResult<GridCell> {
        validate_measurement("width", width)?;
        validate_measurement("drop", drop)?;

        let column_index = band_index(self.width_columns.iter().copied(), width);
        let row_index = band_index(self.drop_rows.iter().map(|r| r.drop), drop);

        let row = self.drop_rows.get(row_index).ok_or_else(|| {
            PricingError::configuration(format!("grid {}", self.key), "grid has no drop rows")
        })?;
        let width_band = self.width_columns.get(column_index).copied();
        let price = row.prices.get(column_index).copied();
        let (Some(width_band), Some(price)) = (width_band, price) else {
            return Err(PricingError::configuration(
                format!("grid {}", self.key),
                format!("drop row {} is missing column {}", row.drop, column_index),
            ));
        };

        Ok(GridCell {
            column_index,
            row_index,
            width_band,
            drop_band: row.drop,
            price,
        })
    }
}

fn validate_measurement(field: &str, value: f64) -> PricingResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PricingError::validation(
            field,
            value.to_string(),
            format!("{} must be a positive number", field),
        ));
    }
    Ok(())
}

/// Index of the smallest breakpoint >= value, or the last index when the
/// value is beyond every breakpoint.
fn band_index(mut breakpoints: impl ExactSizeIterator<Item = f64>, value: f64) -> usize {
    let last = breakpoints.len().saturating_sub(1);
    breakpoints.position(|b| b >= value).unwrap_or(last)
}

fn strictly_ascending(values: impl Iterator<Item = f64>) -> bool {
    let mut prev: Option<f64> = None;
    for v in values {
        if !v.is_finite() || v <= 0.0 {
            return false;
        }
        if let Some(p) = prev {
            if v <= p {
                return false;
            }
        }
        prev = Some(v);
    }
    true
}

/// All grids known to an account, keyed by id.
///
/// Grids are never removed; replacing a grid deactivates the old one so
/// treatments priced from it can still be traced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridCatalog {
    grids: HashMap<Uuid, GridTable>,
}

impl GridCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a grid. If it is active, any other active grid with the same
    /// key is deactivated. Returns the ids that were superseded.
    pub fn insert(&mut self, grid: GridTable) -> PricingResult<Vec<Uuid>> {
        grid.validate()?;

        let mut superseded = Vec::new();
        if grid.active {
            for existing in self.grids.values_mut() {
                if existing.active && existing.key == grid.key && existing.id != grid.id {
                    existing.active = false;
                    superseded.push(existing.id);
                }
            }
        }
        if !superseded.is_empty() {
            info!(grid = %grid.key, replaced = superseded.len(), "Superseded active pricing grid");
        }

        self.grids.insert(grid.id, grid);
        Ok(superseded)
    }

    /// Soft-delete a grid. Returns false if the id is unknown.
    pub fn deactivate(&mut self, id: &Uuid) -> bool {
        match self.grids.get_mut(id) {
            Some(grid) => {
                grid.active = false;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&GridTable> {
        self.grids.get(id)
    }

    /// The active grid for an identity, if any.
    ///
    /// A validated catalog holds at most one; should several slip through,
    /// the newest wins so lookups never depend on map order.
    pub fn active(&self, key: &GridKey) -> Option<&GridTable> {
        self.grids
            .values()
            .filter(|g| g.active && &g.key == key)
            .max_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)))
    }

    /// Check every grid, and that no identity has more than one active grid.
    /// Catalogs read from disk skip [`GridCatalog::insert`], so load paths
    /// call this.
    pub fn validate(&self) -> PricingResult<()> {
        let mut active_keys: HashMap<&GridKey, usize> = HashMap::new();
        for grid in self.sorted() {
            grid.validate()?;
            if grid.active {
                *active_keys.entry(&grid.key).or_insert(0) += 1;
            }
        }

        let mut duplicated: Vec<_> = active_keys.into_iter().filter(|(_, n)| *n > 1).collect();
        duplicated.sort();
        if let Some((key, count)) = duplicated.first() {
            return Err(PricingError::configuration(
                format!("grid {}", key),
                format!("{} active grids share this identity, expected at most one", count),
            ));
        }
        Ok(())
    }

    /// All grids sorted by key then creation time, for display.
    pub fn sorted(&self) -> Vec<&GridTable> {
        let mut grids: Vec<_> = self.grids.values().collect();
        grids.sort_by(|a, b| a.key.cmp(&b.key).then(a.created.cmp(&b.created)));
        grids
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}
