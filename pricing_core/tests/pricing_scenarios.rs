//! End-to-end pricing scenarios: grid lookup through markup to stored totals.

use std::sync::Arc;

use pricing_core::grid::{GridKey, GridTable};
use pricing_core::markup::{resolve, MarkupContext, MarkupSettings, MarkupSource};
use pricing_core::pricing::{price, PricingMethod};
use pricing_core::price_book::PriceBook;
use pricing_core::resync::{ResyncCoordinator, ResyncMode};
use pricing_core::store::{MemoryTreatmentStore, ResyncScope};
use pricing_core::treatment::{Material, TreatmentInput, TreatmentRecord};
use tokio_util::sync::CancellationToken;

fn scenario_grid() -> GridTable {
    GridTable::from_matrix(
        GridKey::new("acme", "roller_blind", "A"),
        vec![100.0, 150.0, 200.0],
        vec![vec![200.0, 50.0, 70.0, 90.0]],
    )
    .unwrap()
}

fn scenario_settings() -> MarkupSettings {
    let mut settings = MarkupSettings::default();
    settings.default_markup_percentage = 100.0;
    settings.minimum_markup_percentage = 20.0;
    settings
}

#[test]
fn window_bands_up_and_takes_default_markup() {
    let grid = scenario_grid();
    assert!(grid.includes_fabric_price);
    assert!(grid.markup_percentage.is_none());

    let settings = scenario_settings();
    let input = TreatmentInput::gridded("misc", &grid, 120.0, 200.0);
    let breakdown = price(&input, &settings).unwrap();

    assert_eq!(breakdown.method, PricingMethod::Grid);
    assert_eq!(breakdown.grid_cell.unwrap().width_band, 150.0);
    assert_eq!(breakdown.base_cost, 70.0);
    assert_eq!(breakdown.resolved_markup_percent, 100.0);
    assert_eq!(breakdown.resolved_markup_source, MarkupSource::Default);
    assert_eq!(breakdown.sell_price, 140.0);
    assert!((breakdown.margin_percent_equivalent - 50.0).abs() < 1e-9);
}

#[test]
fn floor_beats_low_grid_markup() {
    let grid = scenario_grid().with_markup(Some(5.0));
    let mut settings = scenario_settings();
    settings.minimum_markup_percentage = 10.0;

    let input = TreatmentInput::gridded("misc", &grid, 120.0, 200.0);
    let breakdown = price(&input, &settings).unwrap();
    assert_eq!(breakdown.resolved_markup_percent, 10.0);
    assert_eq!(breakdown.resolved_markup_source, MarkupSource::MinimumFloor);
    assert!((breakdown.sell_price - 77.0).abs() < 1e-9);
}

#[test]
fn grid_markup_outranks_category_then_category_outranks_default() {
    let mut settings = MarkupSettings::default();
    settings.default_markup_percentage = 50.0;
    settings.category_markups.insert("blind_making".to_string(), 30.0);

    let ctx = MarkupContext::new(&settings)
        .with_grid_markup(Some(15.0))
        .with_category("blind_making");
    let resolved = resolve(&ctx);
    assert_eq!((resolved.percent, resolved.source), (15.0, MarkupSource::Grid));

    let resolved = resolve(&ctx.with_grid_markup(None));
    assert_eq!((resolved.percent, resolved.source), (30.0, MarkupSource::Category));
}

#[tokio::test]
async fn forced_resync_is_idempotent() {
    let mut book = PriceBook::new(scenario_settings());
    let grid = scenario_grid();
    let key = grid.key.clone();
    book.grids.insert(grid).unwrap();
    let blind = book.add_material(Material::grid_priced("Roller A", "blind_making", key));
    let track = book.add_material(Material::flat_priced("Track", "hardware", 45.0));

    let job = uuid::Uuid::new_v4();
    let store = Arc::new(MemoryTreatmentStore::new(vec![
        TreatmentRecord::new("Lounge", 120.0, 200.0, blind).with_job(job),
        TreatmentRecord::new("Study", 95.0, 140.0, blind).with_job(job),
        TreatmentRecord::new("Track", 0.0, 0.0, track).with_job(job).with_quantity(2.0),
    ]));
    let coordinator = ResyncCoordinator::new(store.clone()).with_concurrency(2);
    let book = Arc::new(book);
    let cancel = CancellationToken::new();

    let first = coordinator
        .resync(&ResyncScope::Job(job), book.clone(), ResyncMode::Force, &cancel)
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.updated, 3);

    let second = coordinator
        .resync(&ResyncScope::Job(job), book, ResyncMode::Force, &cancel)
        .await
        .unwrap();
    assert_eq!(second.total, 3);
    assert_eq!(second.updated, 0);
    assert_eq!(second.skipped, 0);

    let stored = store.snapshot().await;
    assert!(stored.values().all(|r| r.breakdown.is_some()));
}

#[tokio::test]
async fn replacing_a_grid_reprices_on_next_resync() {
    let mut book = PriceBook::new(scenario_settings());
    let grid = scenario_grid();
    let key = grid.key.clone();
    book.grids.insert(grid).unwrap();
    let blind = book.add_material(Material::grid_priced("Roller A", "blind_making", key.clone()));

    let record = TreatmentRecord::new("Lounge", 120.0, 200.0, blind);
    let id = record.id;
    let store = Arc::new(MemoryTreatmentStore::new(vec![record]));
    let coordinator = ResyncCoordinator::new(store.clone());
    let cancel = CancellationToken::new();

    coordinator
        .resync(&ResyncScope::All, Arc::new(book.clone()), ResyncMode::ChangedOnly, &cancel)
        .await
        .unwrap();

    // Supplier issues a new price list for the same identity
    let new_grid = GridTable::from_matrix(
        key,
        vec![100.0, 150.0, 200.0],
        vec![vec![200.0, 55.0, 80.0, 99.0]],
    )
    .unwrap();
    let superseded = book.grids.insert(new_grid).unwrap();
    assert_eq!(superseded.len(), 1);

    let report = coordinator
        .resync(&ResyncScope::All, Arc::new(book), ResyncMode::ChangedOnly, &cancel)
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(store.get(&id).await.unwrap().stored_sell_price(), Some(160.0));
}
