use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use pricing_core::units::LengthUnit;

#[derive(Parser)]
#[command(author, version, about = "Pleat - window treatment pricing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a sample workbook with one blind grid, one curtain grid and a few treatments
    Init {
        /// Destination workbook path
        path: PathBuf,
        /// Account / business name stored in the workbook
        #[arg(long, default_value = "Demo Interiors")]
        account: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Price one treatment without storing it
    Quote {
        #[arg(long)]
        workbook: PathBuf,
        /// Material name (case-insensitive)
        #[arg(long)]
        material: String,
        #[arg(long, default_value_t = 0.0)]
        width: f64,
        #[arg(long, default_value_t = 0.0)]
        drop: f64,
        #[arg(long, default_value_t = 1.0)]
        quantity: f64,
        /// Unit for width and drop: mm, cm, m or in
        #[arg(long, default_value = "cm")]
        unit: LengthUnit,
        /// Print the breakdown as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute stored treatment prices and save the workbook
    Resync {
        #[arg(long)]
        workbook: PathBuf,
        /// Write every record, not only those whose price moved
        #[arg(long)]
        force: bool,
        /// Limit to one job
        #[arg(long, conflicts_with = "treatment")]
        job: Option<Uuid>,
        /// Limit to specific treatments (repeatable)
        #[arg(long)]
        treatment: Vec<Uuid>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the grids in a workbook
    Grids {
        #[arg(long)]
        workbook: PathBuf,
        /// Include superseded grids
        #[arg(long)]
        all: bool,
    },
}
