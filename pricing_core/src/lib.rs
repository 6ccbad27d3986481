//! # pricing_core - Window Treatment Pricing Engine
//!
//! `pricing_core` computes sell prices for curtains, blinds and shutters from
//! supplier pricing grids and an account's markup settings, and keeps stored
//! prices in step when those settings change. All inputs and outputs are
//! JSON-serializable plain records; the engine does no I/O of its own except
//! through the [`store::TreatmentStore`] port and the workbook helpers in
//! [`file_io`].
//!
//! ## Design Philosophy
//!
//! - **Stateless**: pricing is a pure function of measurements, grid and settings
//! - **Explainable**: every price records which grid band and markup rule produced it
//! - **Fail loud**: missing prices are errors, never a silent zero
//! - **Batch-safe**: resync isolates per-item failures and bounds store load
//!
//! ## Quick Start
//!
//! ```rust
//! use pricing_core::grid::{GridKey, GridTable};
//! use pricing_core::markup::MarkupSettings;
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
//! let settings = MarkupSettings::default();
//! let breakdown = price(&TreatmentInput::gridded("blind_making", &grid, 190.0, 180.0), &settings).unwrap();
//! assert_eq!(breakdown.base_cost, 90.0);
//! ```
//!
//! ## Modules
//!
//! - [`grid`] - Pricing grids and banded lookup
//! - [`markup`] - Markup settings and the fallback chain
//! - [`margin`] - Markup/margin conversions
//! - [`fabric`] - Fabric widths and metres for fabric-exclusive grids
//! - [`pricing`] - Price resolution service and breakdowns
//! - [`resync`] - Batch recompute of stored prices
//! - [`store`] - Treatment store port and in-memory adapter
//! - [`price_book`] - Price book snapshot and workbook root
//! - [`file_io`] - Workbook files with atomic saves and locking
//! - [`units`] - Length units
//! - [`errors`] - Structured error types

pub mod errors;
pub mod fabric;
pub mod file_io;
pub mod grid;
pub mod margin;
pub mod markup;
pub mod price_book;
pub mod pricing;
pub mod resync;
pub mod store;
pub mod treatment;
pub mod units;

// Re-export commonly used types at crate root for convenience
pub use errors::{PricingError, PricingResult};
pub use file_io::{load_workbook, save_workbook, FileLock};
pub use grid::{GridCatalog, GridKey, GridTable};
pub use markup::{MarkupSettings, MarkupSource};
pub use price_book::{PriceBook, Workbook};
pub use pricing::{PriceBreakdown, PriceResolutionService};
pub use resync::{ResyncCoordinator, ResyncMode, ResyncReport};
pub use store::{MemoryTreatmentStore, ResyncScope, TreatmentStore};
