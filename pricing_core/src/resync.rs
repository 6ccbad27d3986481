//! # Resync
//!
//! Recomputes stored treatment prices after settings or grids change.
//!
//! - **changed-only** - write back only records whose sell price moved by
//!   more than the tolerance (used after "Save Settings")
//! - **force** - write back every record that prices successfully (used by
//!   "Recalculate All")
//!
//! Items run through a small worker pool so the store never sees more than
//! `concurrency` requests in flight. An item that fails validation,
//! configuration or a store call is logged, counted as skipped and the run
//! carries on. The cancellation token is checked before each item starts;
//! items already in flight finish their write.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pricing_core::price_book::PriceBook;
//! use pricing_core::resync::{ResyncCoordinator, ResyncMode};
//! use pricing_core::store::{MemoryTreatmentStore, ResyncScope};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(book: PriceBook, store: Arc<MemoryTreatmentStore>) -> pricing_core::PricingResult<()> {
//! let coordinator = ResyncCoordinator::new(store).with_concurrency(5);
//! let report = coordinator
//!     .resync(&ResyncScope::All, Arc::new(book), ResyncMode::ChangedOnly, &CancellationToken::new())
//!     .await?;
//! println!("{} of {} treatments updated", report.updated, report.total);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{PricingError, PricingResult};
use crate::price_book::PriceBook;
use crate::pricing::{PriceBreakdown, PriceResolutionService};
use crate::store::{ResyncScope, TreatmentStore};
use crate::treatment::TreatmentRecord;

/// Items in flight when no concurrency is configured
pub const DEFAULT_RESYNC_CONCURRENCY: usize = 5;

/// Upper bound on items in flight
pub const MAX_RESYNC_CONCURRENCY: usize = 10;

/// Sell prices closer than this are treated as unchanged (half a cent)
pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.005;

/// Which records a resync writes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResyncMode {
    #[default]
    ChangedOnly,
    Force,
}

impl fmt::Display for ResyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncMode::ChangedOnly => write!(f, "changed-only"),
            ResyncMode::Force => write!(f, "force"),
        }
    }
}

impl FromStr for ResyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "changed-only" | "changed_only" | "changed" => Ok(ResyncMode::ChangedOnly),
            "force" => Ok(ResyncMode::Force),
            _ => Err(format!("Invalid resync mode: {}. Use changed-only or force", s)),
        }
    }
}

/// A treatment the run skipped, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub treatment_id: Uuid,
    pub error: PricingError,
}

/// Aggregate result of a resync run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResyncReport {
    pub mode: ResyncMode,
    /// Treatments in scope
    pub total: usize,
    /// Treatments whose sell price changed
    pub updated: usize,
    /// Breakdown writes sent to the store
    pub written: usize,
    /// Treatments that priced to the stored value
    pub unchanged: usize,
    /// Treatments that failed to price or persist
    pub skipped: usize,
    /// Treatments never started because the run was cancelled
    pub not_started: usize,
    pub cancelled: bool,
    pub failures: Vec<ItemFailure>,
}

impl ResyncReport {
    /// Short line suitable for a toast or log message
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} of {} treatments updated ({} unchanged, {} skipped)",
            self.updated, self.total, self.unchanged, self.skipped
        );
        if self.cancelled {
            line.push_str(&format!(", cancelled with {} not started", self.not_started));
        }
        line
    }
}

enum ItemOutcome {
    Priced { changed: bool, written: bool },
    Failed(PricingError),
    NotStarted,
}

/// Batch driver that reprices stored treatments through a bounded worker pool.
pub struct ResyncCoordinator<S: TreatmentStore + ?Sized> {
    store: Arc<S>,
    concurrency: usize,
    tolerance: f64,
}

impl<S: TreatmentStore + ?Sized> ResyncCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        ResyncCoordinator {
            store,
            concurrency: DEFAULT_RESYNC_CONCURRENCY,
            tolerance: DEFAULT_PRICE_TOLERANCE,
        }
    }

    /// Items in flight, clamped to `1..=MAX_RESYNC_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_RESYNC_CONCURRENCY);
        self
    }

    /// Sell price tolerance for changed-only mode. Negative or non-finite
    /// values fall back to the default.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = if tolerance.is_finite() && tolerance >= 0.0 {
            tolerance
        } else {
            DEFAULT_PRICE_TOLERANCE
        };
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Reprice every treatment in scope under the given price book.
    ///
    /// Validation, configuration and store failures are isolated per item
    /// and land in [`ResyncReport::failures`]. Any other failure (a store
    /// returning a file or serialization error) stops new items from
    /// starting, lets in-flight items finish, and is returned as the error.
    pub async fn resync(
        &self,
        scope: &ResyncScope,
        book: Arc<PriceBook>,
        mode: ResyncMode,
        cancel: &CancellationToken,
    ) -> PricingResult<ResyncReport> {
        let ids = self.store.list_ids(scope).await?;
        let service = PriceResolutionService::new(book);

        info!(
            mode = %mode,
            total = ids.len(),
            concurrency = self.concurrency,
            "Starting price resync"
        );

        // Stops the run on a fatal item without cancelling the caller's token
        let run = cancel.child_token();
        let service = &service;
        let run_ref = &run;
        let outcomes = stream::iter(ids.iter().copied())
            .map(|id| async move { (id, self.resync_item(service, id, mode, run_ref).await) })
            .buffer_unordered(self.concurrency);
        futures::pin_mut!(outcomes);

        let mut report = ResyncReport {
            mode,
            total: ids.len(),
            ..ResyncReport::default()
        };
        let mut fatal: Option<PricingError> = None;
        while let Some((treatment_id, outcome)) = outcomes.next().await {
            match outcome {
                ItemOutcome::Priced { changed, written } => {
                    if changed {
                        report.updated += 1;
                    } else {
                        report.unchanged += 1;
                    }
                    if written {
                        report.written += 1;
                    }
                }
                ItemOutcome::Failed(error) if error.is_item_isolated() => {
                    warn!(
                        treatment_id = %treatment_id,
                        code = error.error_code(),
                        error = %error,
                        "Skipping treatment during resync"
                    );
                    report.skipped += 1;
                    report.failures.push(ItemFailure { treatment_id, error });
                }
                ItemOutcome::Failed(error) => {
                    error!(
                        treatment_id = %treatment_id,
                        code = error.error_code(),
                        error = %error,
                        "Stopping price resync"
                    );
                    run.cancel();
                    if fatal.is_none() {
                        fatal = Some(error);
                    }
                }
                ItemOutcome::NotStarted => report.not_started += 1,
            }
        }
        if let Some(error) = fatal {
            return Err(error);
        }

        report.cancelled = report.not_started > 0;
        report.failures.sort_by_key(|f| f.treatment_id);

        info!(
            mode = %mode,
            total = report.total,
            updated = report.updated,
            written = report.written,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Price resync finished"
        );

        Ok(report)
    }

    /// Reprice one stored treatment and write it back regardless of change.
    /// Fails fast, unlike [`ResyncCoordinator::resync`].
    pub async fn reprice_one(
        &self,
        book: Arc<PriceBook>,
        id: Uuid,
    ) -> PricingResult<PriceBreakdown> {
        let service = PriceResolutionService::new(book);
        let record = self.fetch_existing(id).await?;
        let breakdown = service.price_record(&record)?;
        self.store.write_breakdown(id, &breakdown).await?;
        Ok(breakdown)
    }

    async fn resync_item(
        &self,
        service: &PriceResolutionService,
        id: Uuid,
        mode: ResyncMode,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::NotStarted;
        }
        match self.reprice(service, id, mode).await {
            Ok((changed, written)) => ItemOutcome::Priced { changed, written },
            Err(error) => ItemOutcome::Failed(error),
        }
    }

    async fn reprice(
        &self,
        service: &PriceResolutionService,
        id: Uuid,
        mode: ResyncMode,
    ) -> PricingResult<(bool, bool)> {
        let record = self.fetch_existing(id).await?;
        let breakdown = service.price_record(&record)?;

        let changed = match record.stored_sell_price() {
            Some(previous) => (previous - breakdown.sell_price).abs() > self.tolerance,
            None => true,
        };
        let write = changed || mode == ResyncMode::Force;
        if write {
            self.store.write_breakdown(id, &breakdown).await?;
        }

        debug!(
            treatment_id = %id,
            changed,
            written = write,
            sell_price = breakdown.sell_price,
            "Resynced treatment"
        );
        Ok((changed, write))
    }

    async fn fetch_existing(&self, id: Uuid) -> PricingResult<TreatmentRecord> {
        self.store.fetch(id).await?.ok_or_else(|| {
            PricingError::store("fetch treatment", format!("treatment {} no longer exists", id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridKey, GridTable};
    use crate::markup::MarkupSettings;
    use crate::store::MemoryTreatmentStore;
    use crate::treatment::Material;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        book: PriceBook,
        blind_id: Uuid,
        rail_id: Uuid,
    }

    fn fixture() -> Fixture {
        let mut settings = MarkupSettings::default();
        settings.default_markup_percentage = 100.0;
        settings.minimum_markup_percentage = 20.0;
        let mut book = PriceBook::new(settings);

        let grid = GridTable::from_matrix(
            GridKey::new("acme", "roller_blind", "A"),
            vec![100.0, 150.0, 200.0],
            vec![vec![200.0, 50.0, 70.0, 90.0]],
        )
        .unwrap();
        let key = grid.key.clone();
        book.grids.insert(grid).unwrap();
        let blind_id = book.add_material(Material::grid_priced("Roller A", "blind_making", key));
        let rail_id = book.add_material(Material::flat_priced("Track", "hardware", 30.0));

        Fixture { book, blind_id, rail_id }
    }

    #[tokio::test]
    async fn test_changed_only_writes_unpriced_and_changed() {
        let f = fixture();
        let store = Arc::new(MemoryTreatmentStore::new(vec![
            TreatmentRecord::new("Lounge", 120.0, 200.0, f.blind_id),
            TreatmentRecord::new("Track", 0.0, 0.0, f.rail_id).with_quantity(2.0),
        ]));
        let coordinator = ResyncCoordinator::new(store.clone());
        let book = Arc::new(f.book.clone());
        let cancel = CancellationToken::new();

        let first = coordinator
            .resync(&ResyncScope::All, book.clone(), ResyncMode::ChangedOnly, &cancel)
            .await
            .unwrap();
        assert_eq!(first.total, 2);
        assert_eq!(first.updated, 2);
        assert_eq!(first.written, 2);

        let second = coordinator
            .resync(&ResyncScope::All, book, ResyncMode::ChangedOnly, &cancel)
            .await
            .unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_settings_change_is_picked_up() {
        let f = fixture();
        let lounge = TreatmentRecord::new("Lounge", 120.0, 200.0, f.blind_id);
        let lounge_id = lounge.id;
        let store = Arc::new(MemoryTreatmentStore::new(vec![lounge]));
        let coordinator = ResyncCoordinator::new(store.clone());
        let cancel = CancellationToken::new();

        coordinator
            .resync(&ResyncScope::All, Arc::new(f.book.clone()), ResyncMode::ChangedOnly, &cancel)
            .await
            .unwrap();

        let mut book = f.book.clone();
        book.settings.category_markups.insert("blind_making".to_string(), 50.0);
        let report = coordinator
            .resync(&ResyncScope::All, Arc::new(book), ResyncMode::ChangedOnly, &cancel)
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        let stored = store.get(&lounge_id).await.unwrap();
        assert_eq!(stored.stored_sell_price(), Some(105.0));
    }

    #[tokio::test]
    async fn test_force_twice_reports_no_updates() {
        let f = fixture();
        let store = Arc::new(MemoryTreatmentStore::new(vec![
            TreatmentRecord::new("Lounge", 120.0, 200.0, f.blind_id),
            TreatmentRecord::new("Bed", 180.0, 150.0, f.blind_id),
        ]));
        let coordinator = ResyncCoordinator::new(store.clone());
        let book = Arc::new(f.book);
        let cancel = CancellationToken::new();

        coordinator
            .resync(&ResyncScope::All, book.clone(), ResyncMode::Force, &cancel)
            .await
            .unwrap();
        let second = coordinator
            .resync(&ResyncScope::All, book, ResyncMode::Force, &cancel)
            .await
            .unwrap();

        assert_eq!(second.updated, 0);
        assert_eq!(second.written, 2);
        assert_eq!(store.write_count(), 4);
    }

    #[tokio::test]
    async fn test_malformed_item_is_skipped() {
        let f = fixture();
        let good = TreatmentRecord::new("Lounge", 120.0, 200.0, f.blind_id);
        let bad_width = TreatmentRecord::new("Typo", -5.0, 200.0, f.blind_id);
        let orphan = TreatmentRecord::new("Orphan", 100.0, 100.0, Uuid::new_v4());
        let store = Arc::new(MemoryTreatmentStore::new(vec![good, bad_width, orphan]));
        let coordinator = ResyncCoordinator::new(store);

        let report = coordinator
            .resync(
                &ResyncScope::All,
                Arc::new(f.book),
                ResyncMode::Force,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let f = fixture();
        let store = Arc::new(MemoryTreatmentStore::new(vec![
            TreatmentRecord::new("Lounge", 120.0, 200.0, f.blind_id),
            TreatmentRecord::new("Bed", 180.0, 150.0, f.blind_id),
        ]));
        let coordinator = ResyncCoordinator::new(store.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator
            .resync(&ResyncScope::All, Arc::new(f.book), ResyncMode::Force, &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.not_started, 2);
        assert_eq!(store.write_count(), 0);
        assert!(report.summary().contains("cancelled"));
    }

    /// Store that fails writes for one id and tracks peak concurrency.
    struct FlakyStore {
        inner: MemoryTreatmentStore,
        poisoned: Uuid,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TreatmentStore for FlakyStore {
        async fn list_ids(&self, scope: &ResyncScope) -> PricingResult<Vec<Uuid>> {
            self.inner.list_ids(scope).await
        }

        async fn fetch(&self, id: Uuid) -> PricingResult<Option<TreatmentRecord>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let record = self.inner.fetch(id).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            record
        }

        async fn write_breakdown(&self, id: Uuid, breakdown: &PriceBreakdown) -> PricingResult<()> {
            if id == self.poisoned {
                return Err(PricingError::store("write breakdown", "connection reset"));
            }
            self.inner.write_breakdown(id, breakdown).await
        }
    }

    #[tokio::test]
    async fn test_store_errors_are_isolated_and_concurrency_bounded() {
        let f = fixture();
        let records: Vec<_> = (0..25)
            .map(|i| TreatmentRecord::new(format!("W{}", i), 100.0 + i as f64, 150.0, f.blind_id))
            .collect();
        let poisoned = records[7].id;
        let store = Arc::new(FlakyStore {
            inner: MemoryTreatmentStore::new(records),
            poisoned,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let coordinator = ResyncCoordinator::new(store.clone()).with_concurrency(3);

        let report = coordinator
            .resync(
                &ResyncScope::All,
                Arc::new(f.book),
                ResyncMode::ChangedOnly,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(report.total, 25);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures[0].treatment_id, poisoned);
        assert_eq!(report.failures[0].error.error_code(), "STORE_ERROR");
        assert_eq!(report.updated, 24);
        assert!(store.peak.load(Ordering::SeqCst) <= 3);
    }

    /// Store that cancels the run's token on its nth fetch.
    struct InterruptingStore {
        inner: MemoryTreatmentStore,
        cancel: CancellationToken,
        cancel_on_fetch: usize,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TreatmentStore for InterruptingStore {
        async fn list_ids(&self, scope: &ResyncScope) -> PricingResult<Vec<Uuid>> {
            self.inner.list_ids(scope).await
        }

        async fn fetch(&self, id: Uuid) -> PricingResult<Option<TreatmentRecord>> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_on_fetch {
                self.cancel.cancel();
            }
            self.inner.fetch(id).await
        }

        async fn write_breakdown(&self, id: Uuid, breakdown: &PriceBreakdown) -> PricingResult<()> {
            self.inner.write_breakdown(id, breakdown).await
        }
    }

    #[tokio::test]
    async fn test_cancelled_mid_run_keeps_completed_writes() {
        let f = fixture();
        let records: Vec<_> = (0..20)
            .map(|i| TreatmentRecord::new(format!("W{}", i), 100.0 + i as f64, 150.0, f.blind_id))
            .collect();
        let cancel = CancellationToken::new();
        let store = Arc::new(InterruptingStore {
            inner: MemoryTreatmentStore::new(records),
            cancel: cancel.clone(),
            cancel_on_fetch: 3,
            fetches: AtomicUsize::new(0),
        });
        let coordinator = ResyncCoordinator::new(store.clone()).with_concurrency(2);

        let report = coordinator
            .resync(&ResyncScope::All, Arc::new(f.book), ResyncMode::Force, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.written >= 3);
        assert!(report.written < report.total);
        assert!(report.not_started > 0);
        assert_eq!(report.written + report.not_started, report.total);
        assert_eq!(store.inner.write_count(), report.written);
    }

    /// Store whose reads fail with an error that is not tied to one item.
    struct CorruptStore {
        inner: MemoryTreatmentStore,
    }

    #[async_trait]
    impl TreatmentStore for CorruptStore {
        async fn list_ids(&self, scope: &ResyncScope) -> PricingResult<Vec<Uuid>> {
            self.inner.list_ids(scope).await
        }

        async fn fetch(&self, _id: Uuid) -> PricingResult<Option<TreatmentRecord>> {
            Err(PricingError::SerializationError {
                reason: "record file truncated".to_string(),
            })
        }

        async fn write_breakdown(&self, id: Uuid, breakdown: &PriceBreakdown) -> PricingResult<()> {
            self.inner.write_breakdown(id, breakdown).await
        }
    }

    #[tokio::test]
    async fn test_non_isolated_error_stops_the_run() {
        let f = fixture();
        let records: Vec<_> = (0..6)
            .map(|i| TreatmentRecord::new(format!("W{}", i), 120.0, 150.0, f.blind_id))
            .collect();
        let store = Arc::new(CorruptStore {
            inner: MemoryTreatmentStore::new(records),
        });
        let coordinator = ResyncCoordinator::new(store.clone()).with_concurrency(1);
        let cancel = CancellationToken::new();

        let err = coordinator
            .resync(&ResyncScope::All, Arc::new(f.book), ResyncMode::Force, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
        assert!(!err.is_item_isolated());
        assert_eq!(store.inner.write_count(), 0);
        // The caller's token is left alone
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_reprice_one_fails_fast() {
        let f = fixture();
        let orphan = TreatmentRecord::new("Orphan", 100.0, 100.0, Uuid::new_v4());
        let orphan_id = orphan.id;
        let store = Arc::new(MemoryTreatmentStore::new(vec![orphan]));
        let coordinator = ResyncCoordinator::new(store);
        let err = coordinator.reprice_one(Arc::new(f.book), orphan_id).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_builder_clamps() {
        let store = Arc::new(MemoryTreatmentStore::default());
        let c = ResyncCoordinator::new(store).with_concurrency(64).with_tolerance(-1.0);
        assert_eq!(c.concurrency(), MAX_RESYNC_CONCURRENCY);
        assert_eq!(c.tolerance(), DEFAULT_PRICE_TOLERANCE);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("force".parse::<ResyncMode>().unwrap(), ResyncMode::Force);
        assert_eq!("changed-only".parse::<ResyncMode>().unwrap(), ResyncMode::ChangedOnly);
        assert_eq!(serde_json::to_string(&ResyncMode::ChangedOnly).unwrap(), "\"changed-only\"");
    }
}
