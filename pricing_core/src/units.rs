//! # Unit Types
//!
//! Length wrappers for window measurements. Grids, fabric specs and the
//! pricing engine all work in centimetres; these types exist so callers
//! measuring in millimetres or inches convert once at the boundary.
//!
//! ## Example
//!
//! ```rust
//! use pricing_core::units::{Centimetres, Inches, LengthUnit};
//!
//! let width: Centimetres = Inches(48.0).into();
//! assert!((width.0 - 121.92).abs() < 1e-9);
//!
//! assert_eq!(LengthUnit::Millimetres.to_cm(1500.0), 150.0);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length in millimetres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millimetres(pub f64);

/// Length in centimetres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Centimetres(pub f64);

/// Length in metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metres(pub f64);

/// Length in inches
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inches(pub f64);

impl From<Millimetres> for Centimetres {
    fn from(mm: Millimetres) -> Self {
        Centimetres(mm.0 / 10.0)
    }
}

impl From<Metres> for Centimetres {
    fn from(m: Metres) -> Self {
        Centimetres(m.0 * 100.0)
    }
}

impl From<Inches> for Centimetres {
    fn from(inches: Inches) -> Self {
        Centimetres(inches.0 * 2.54)
    }
}

impl From<Centimetres> for Metres {
    fn from(cm: Centimetres) -> Self {
        Metres(cm.0 / 100.0)
    }
}

/// Unit a measurement was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "mm")]
    Millimetres,
    #[default]
    #[serde(rename = "cm")]
    Centimetres,
    #[serde(rename = "m")]
    Metres,
    #[serde(rename = "in")]
    Inches,
}

impl LengthUnit {
    /// Convert a raw value in this unit to centimetres.
    pub fn to_cm(self, value: f64) -> f64 {
        match self {
            LengthUnit::Millimetres => Centimetres::from(Millimetres(value)).0,
            LengthUnit::Centimetres => value,
            LengthUnit::Metres => Centimetres::from(Metres(value)).0,
            LengthUnit::Inches => Centimetres::from(Inches(value)).0,
        }
    }

    /// Short suffix used in display and on the command line
    pub fn suffix(self) -> &'static str {
        match self {
            LengthUnit::Millimetres => "mm",
            LengthUnit::Centimetres => "cm",
            LengthUnit::Metres => "m",
            LengthUnit::Inches => "in",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for LengthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mm" => Ok(LengthUnit::Millimetres),
            "cm" => Ok(LengthUnit::Centimetres),
            "m" => Ok(LengthUnit::Metres),
            "in" | "inch" | "inches" => Ok(LengthUnit::Inches),
            other => Err(format!("Unknown length unit: {}. Use mm, cm, m or in", other)),
        }
    }
}
