//! # Pleat CLI
//!
//! Command-line front end for `pricing_core`: quote a treatment against a
//! workbook, resync its stored prices, list its grids, or write a sample
//! workbook to start from.

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pricing_core::fabric::FabricSpec;
use pricing_core::file_io::load_workbook_with_lock_check;
use pricing_core::grid::{GridKey, GridTable};
use pricing_core::margin::round_money;
use pricing_core::markup::MarkupSettings;
use pricing_core::pricing::{PriceBreakdown, PriceResolutionService, PricingMethod};
use pricing_core::price_book::Workbook;
use pricing_core::resync::{ResyncCoordinator, ResyncMode, ResyncReport};
use pricing_core::store::{MemoryTreatmentStore, ResyncScope};
use pricing_core::treatment::{Material, TreatmentRecord};
use pricing_core::units::LengthUnit;
use pricing_core::{load_workbook, save_workbook, FileLock, PricingError};

use crate::cli::{Cli, Commands};
use crate::config::{Config, LogFormat};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e:#}");
            std::process::exit(2);
        }
    };

    init_tracing(&cfg);

    if let Err(e) = run(cli, cfg).await {
        error!("{e:#}");
        if let Some(pricing_error) = e.downcast_ref::<PricingError>() {
            if let Ok(json) = serde_json::to_string_pretty(pricing_error) {
                eprintln!("{json}");
            }
        }
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(std::io::stderr);
    match cfg.log_format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli, cfg: Config) -> Result<()> {
    match cli.command {
        Commands::Init { path, account, force } => init(&path, account, force),
        Commands::Quote {
            workbook,
            material,
            width,
            drop,
            quantity,
            unit,
            json,
        } => quote(&workbook, &material, width, drop, quantity, unit, json),
        Commands::Resync {
            workbook,
            force,
            job,
            treatment,
            json,
        } => {
            let scope = match (job, treatment.is_empty()) {
                (Some(job_id), _) => ResyncScope::Job(job_id),
                (None, false) => ResyncScope::Treatments(treatment),
                (None, true) => ResyncScope::All,
            };
            let mode = if force { ResyncMode::Force } else { ResyncMode::ChangedOnly };
            resync(&workbook, scope, mode, json, &cfg).await
        }
        Commands::Grids { workbook, all } => grids(&workbook, all),
    }
}

fn init(path: &Path, account: String, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let workbook = sample_workbook(account)?;
    save_workbook(&workbook, path)?;
    info!(path = %path.display(), treatments = workbook.treatment_count(), "Wrote sample workbook");
    println!("Wrote {} with {} treatments", path.display(), workbook.treatment_count());
    Ok(())
}

fn sample_workbook(account: String) -> Result<Workbook> {
    let mut workbook = Workbook::new(account);

    let mut settings = MarkupSettings::default();
    settings.default_markup_percentage = 50.0;
    settings.minimum_markup_percentage = 15.0;
    settings.category_markups.insert("blind_making".to_string(), 40.0);
    settings.labor_markup_percentage = 35.0;
    workbook.price_book.settings = settings;

    let roller = GridTable::from_matrix(
        GridKey::new("acme", "roller_blind", "A"),
        vec![60.0, 90.0, 120.0, 150.0, 180.0, 210.0, 240.0],
        vec![
            vec![150.0, 42.0, 51.0, 60.0, 69.0, 78.0, 87.0, 96.0],
            vec![200.0, 48.0, 58.0, 68.0, 78.0, 88.0, 98.0, 108.0],
            vec![250.0, 54.0, 65.0, 76.0, 87.0, 98.0, 109.0, 120.0],
        ],
    )?;
    let roller_key = roller.key.clone();

    let curtain = GridTable::from_matrix(
        GridKey::new("studio", "curtain", "pinch_pleat"),
        vec![100.0, 150.0, 200.0, 250.0, 300.0],
        vec![
            vec![180.0, 85.0, 110.0, 135.0, 160.0, 185.0],
            vec![240.0, 95.0, 125.0, 155.0, 185.0, 215.0],
            vec![300.0, 105.0, 140.0, 175.0, 210.0, 245.0],
        ],
    )?
    .with_fabric_included(false);
    let curtain_key = curtain.key.clone();

    let book = &mut workbook.price_book;
    book.grids.insert(roller)?;
    book.grids.insert(curtain)?;

    let curtain_fabric = FabricSpec::new(137.0, 32.0)
        .with_fullness(2.0)
        .with_hem_allowance(30.0)
        .with_pattern_repeat(64.0);
    let roller = Material::grid_priced("Roller A", "blind_making", roller_key);
    let curtain = Material::grid_priced("Pinch Pleat", "curtain_making", curtain_key)
        .with_fabric(curtain_fabric);
    let roller_id = book.add_material(roller);
    let curtain_id = book.add_material(curtain);
    let track_id = book.add_material(Material::flat_priced("Ceiling Track", "hardware", 38.5));
    let install_id = book.add_material(Material::flat_priced("Installation", "installation", 65.0));

    let job = Uuid::new_v4();
    let treatments = [
        TreatmentRecord::new("Lounge left", 120.0, 200.0, roller_id),
        TreatmentRecord::new("Lounge right", 95.0, 200.0, roller_id),
        TreatmentRecord::new("Bedroom", 240.0, 230.0, curtain_id),
        TreatmentRecord::new("Bedroom track", 0.0, 0.0, track_id).with_quantity(2.4),
        TreatmentRecord::new("Fitting", 0.0, 0.0, install_id),
    ];
    for treatment in treatments {
        workbook.add_treatment(treatment.with_job(job));
    }

    Ok(workbook)
}

fn quote(
    path: &Path,
    material_name: &str,
    width: f64,
    drop: f64,
    quantity: f64,
    unit: LengthUnit,
    json: bool,
) -> Result<()> {
    let workbook = open_for_reading(path)?;
    let material_id = workbook
        .price_book
        .material_by_name(material_name)
        .map(|m| m.id)
        .with_context(|| format!("no material named {material_name:?} in {}", path.display()))?;

    let record = TreatmentRecord::new("quote", unit.to_cm(width), unit.to_cm(drop), material_id)
        .with_quantity(quantity);
    let service = PriceResolutionService::new(Arc::new(workbook.price_book));
    let breakdown = service.price_record(&record)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&breakdown)?);
    } else {
        print_breakdown(material_name, &record, &breakdown);
    }
    Ok(())
}

/// Load a workbook without locking it, noting if someone else is editing it.
fn open_for_reading(path: &Path) -> Result<Workbook> {
    let (workbook, holder) = load_workbook_with_lock_check(path)
        .with_context(|| format!("loading {}", path.display()))?;
    if let Some(holder) = holder {
        warn!(
            path = %path.display(),
            locked_by = %holder.user_id,
            since = %holder.locked_at,
            "Workbook is open for editing elsewhere; figures may be stale"
        );
    }
    Ok(workbook)
}

fn print_breakdown(material_name: &str, record: &TreatmentRecord, b: &PriceBreakdown) {
    println!("═══════════════════════════════════════");
    println!("  QUOTE: {}", material_name);
    println!("═══════════════════════════════════════");
    println!();
    println!("Input:");
    println!("  Width:    {:.1} cm", record.width_cm);
    println!("  Drop:     {:.1} cm", record.drop_cm);
    println!("  Quantity: {}", b.quantity);
    println!();
    match (b.method, b.grid_cell) {
        (PricingMethod::Grid, Some(cell)) => {
            println!("Grid band:");
            println!(
                "  {:.0} x {:.0} cm  →  {:.2}",
                cell.width_band,
                cell.drop_band,
                round_money(cell.price)
            );
        }
        _ => println!("Flat unit price"),
    }
    if let (Some(widths), Some(metres)) = (b.fabric_widths, b.fabric_required_units) {
        println!("Fabric:");
        println!("  {} widths, {:.2} m  →  {:.2}", widths, metres, round_money(b.fabric_cost));
    }
    println!();
    println!("Price:");
    println!("  Base cost: {:.2}", round_money(b.base_cost));
    println!(
        "  Markup:    {:.1}% ({})",
        b.resolved_markup_percent, b.resolved_markup_source
    );
    println!("  Sell:      {:.2}", round_money(b.sell_price));
    println!("  Margin:    {:.1}%", b.margin_percent_equivalent);
    println!("  Profit:    {:.2}", round_money(b.profit()));
}

async fn resync(
    path: &Path,
    scope: ResyncScope,
    mode: ResyncMode,
    json: bool,
    cfg: &Config,
) -> Result<()> {
    let lock = FileLock::acquire(path, cfg.user.clone())?;
    let mut workbook = load_workbook(lock.workbook_path())?;

    let store = Arc::new(MemoryTreatmentStore::new(workbook.treatments.values().cloned()));
    let coordinator = ResyncCoordinator::new(store.clone())
        .with_concurrency(cfg.resync_concurrency)
        .with_tolerance(cfg.price_tolerance);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight treatments");
            on_interrupt.cancel();
        }
    });

    let book = Arc::new(workbook.price_book.clone());
    let report = coordinator.resync(&scope, book, mode, &cancel).await?;

    if report.written > 0 {
        workbook.treatments = store.snapshot().await;
        workbook.touch();
        save_workbook(&workbook, lock.workbook_path())?;
    }
    drop(lock);

    print_report(&report, json)
}

fn print_report(report: &ResyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{} ({})", report.summary(), report.mode);
    for failure in &report.failures {
        println!(
            "  ✗ {}  [{}] {}",
            failure.treatment_id,
            failure.error.error_code(),
            failure.error
        );
    }
    Ok(())
}

fn grids(path: &Path, all: bool) -> Result<()> {
    let workbook = open_for_reading(path)?;
    let catalog = &workbook.price_book.grids;
    if catalog.is_empty() {
        println!("No grids in {}", path.display());
        return Ok(());
    }

    for grid in catalog.sorted().into_iter().filter(|g| all || g.active) {
        let markup = grid
            .markup_percentage
            .map(|m| format!("{m}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<32} {}x{}  max {:.0}x{:.0} cm  fabric {}  markup {}{}",
            grid.id,
            grid.key.to_string(),
            grid.width_columns.len(),
            grid.drop_rows.len(),
            grid.max_width(),
            grid.max_drop(),
            if grid.includes_fabric_price { "incl" } else { "excl" },
            markup,
            if grid.active { "" } else { "  (superseded)" },
        );
    }
    Ok(())
}
