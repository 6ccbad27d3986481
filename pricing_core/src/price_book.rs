//! # Price Book and Workbook
//!
//! The [`PriceBook`] is the read-only snapshot a pricing run works from:
//! markup settings, grids and materials. The [`Workbook`] is the root that
//! gets saved to disk: the price book plus the account's stored treatments.
//!
//! ## Structure
//!
//! ```text
//! Workbook
//! ├── meta: WorkbookMetadata (version, account, timestamps)
//! ├── price_book: PriceBook
//! │   ├── settings: MarkupSettings
//! │   ├── grids: GridCatalog
//! │   └── materials: HashMap<Uuid, Material>
//! └── treatments: BTreeMap<Uuid, TreatmentRecord>
//! ```
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::price_book::Workbook;
//!
//! let workbook = Workbook::new("Harbour Drapes");
//! let json = serde_json::to_string_pretty(&workbook).unwrap();
//! assert!(json.contains("Harbour Drapes"));
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::PricingResult;
use crate::grid::GridCatalog;
use crate::markup::MarkupSettings;
use crate::treatment::{Material, TreatmentRecord};

/// Current schema version for workbook files
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Settings, grids and materials for one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceBook {
    pub settings: MarkupSettings,

    #[serde(default)]
    pub grids: GridCatalog,

    #[serde(default)]
    pub materials: HashMap<Uuid, Material>,
}

impl PriceBook {
    pub fn new(settings: MarkupSettings) -> Self {
        PriceBook {
            settings,
            grids: GridCatalog::new(),
            materials: HashMap::new(),
        }
    }

    /// Add a material, returning its id.
    pub fn add_material(&mut self, material: Material) -> Uuid {
        let id = material.id;
        self.materials.insert(id, material);
        id
    }

    /// Find a material by exact name (case-insensitive).
    pub fn material_by_name(&self, name: &str) -> Option<&Material> {
        self.materials
            .values()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Check settings and every grid. Run after loading from disk.
    pub fn validate(&self) -> PricingResult<()> {
        self.settings.validate()?;
        self.grids.validate()?;
        for material in self.materials.values() {
            if let Some(fabric) = &material.fabric {
                fabric.validate()?;
            }
        }
        Ok(())
    }
}

/// Root container saved to workbook files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbook {
    pub meta: WorkbookMetadata,

    pub price_book: PriceBook,

    /// Stored treatments, keyed by id
    #[serde(default)]
    pub treatments: BTreeMap<Uuid, TreatmentRecord>,
}

impl Workbook {
    /// Create an empty workbook with default settings.
    pub fn new(account: impl Into<String>) -> Self {
        let now = Utc::now();
        Workbook {
            meta: WorkbookMetadata {
                version: SCHEMA_VERSION.to_string(),
                account: account.into(),
                created: now,
                modified: now,
            },
            price_book: PriceBook::default(),
            treatments: BTreeMap::new(),
        }
    }

    /// Add a treatment, returning its id.
    pub fn add_treatment(&mut self, treatment: TreatmentRecord) -> Uuid {
        let id = treatment.id;
        self.treatments.insert(id, treatment);
        self.touch();
        id
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.meta.modified = Utc::now();
    }

    pub fn treatment_count(&self) -> usize {
        self.treatments.len()
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Workbook::new("")
    }
}

/// Workbook metadata stored in the file header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookMetadata {
    /// Schema version (for migration compatibility)
    pub version: String,

    /// Account / business name
    pub account: String,

    pub created: DateTime<Utc>,

    pub modified: DateTime<Utc>,
}
