//! # Treatment Store
//!
//! The record store that holds treatments is outside this crate; the
//! engine only needs three operations from it, captured by
//! [`TreatmentStore`]. Each write is expected to be individually atomic.
//!
//! [`MemoryTreatmentStore`] backs the CLI (loaded from a workbook file)
//! and the tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{PricingError, PricingResult};
use crate::pricing::PriceBreakdown;
use crate::treatment::TreatmentRecord;

/// Which treatments a resync covers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResyncScope {
    /// Every treatment in the account
    #[default]
    All,
    /// Treatments belonging to one job
    Job(Uuid),
    /// An explicit list of treatments
    Treatments(Vec<Uuid>),
}

impl ResyncScope {
    pub fn contains(&self, record: &TreatmentRecord) -> bool {
        match self {
            ResyncScope::All => true,
            ResyncScope::Job(job_id) => record.job_id == Some(*job_id),
            ResyncScope::Treatments(ids) => ids.contains(&record.id),
        }
    }
}

/// Read/write contract the resync coordinator needs from the store.
#[async_trait]
pub trait TreatmentStore: Send + Sync {
    /// Ids of every treatment in scope
    async fn list_ids(&self, scope: &ResyncScope) -> PricingResult<Vec<Uuid>>;

    /// Current state of one treatment, `None` if it has been deleted
    async fn fetch(&self, id: Uuid) -> PricingResult<Option<TreatmentRecord>>;

    /// Overwrite the treatment's stored breakdown
    async fn write_breakdown(&self, id: Uuid, breakdown: &PriceBreakdown) -> PricingResult<()>;
}

/// In-memory store keyed by treatment id.
#[derive(Debug, Default)]
pub struct MemoryTreatmentStore {
    records: RwLock<BTreeMap<Uuid, TreatmentRecord>>,
    writes: AtomicUsize,
}

impl MemoryTreatmentStore {
    pub fn new(records: impl IntoIterator<Item = TreatmentRecord>) -> Self {
        MemoryTreatmentStore {
            records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Copy of every stored record
    pub async fn snapshot(&self) -> BTreeMap<Uuid, TreatmentRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &Uuid) -> Option<TreatmentRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn insert(&self, record: TreatmentRecord) {
        self.records.write().await.insert(record.id, record);
    }

    /// Number of breakdown writes accepted so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TreatmentStore for MemoryTreatmentStore {
    async fn list_ids(&self, scope: &ResyncScope) -> PricingResult<Vec<Uuid>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| scope.contains(r))
            .map(|r| r.id)
            .collect())
    }

    async fn fetch(&self, id: Uuid) -> PricingResult<Option<TreatmentRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn write_breakdown(&self, id: Uuid, breakdown: &PriceBreakdown) -> PricingResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| {
                PricingError::store("write breakdown", format!("treatment {} not found", id))
            })?;
        record.breakdown = Some(breakdown.clone());
        record.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_filtering() {
        let job = Uuid::new_v4();
        let material = Uuid::new_v4();
        let a = TreatmentRecord::new("A", 100.0, 100.0, material).with_job(job);
        let b = TreatmentRecord::new("B", 100.0, 100.0, material);
        let b_id = b.id;
        let store = MemoryTreatmentStore::new(vec![a, b]);

        assert_eq!(store.list_ids(&ResyncScope::All).await.unwrap().len(), 2);
        assert_eq!(store.list_ids(&ResyncScope::Job(job)).await.unwrap().len(), 1);
        assert_eq!(
            store.list_ids(&ResyncScope::Treatments(vec![b_id])).await.unwrap(),
            vec![b_id]
        );
    }

    #[tokio::test]
    async fn test_write_unknown_treatment_is_store_error() {
        let store = MemoryTreatmentStore::default();
        let breakdown = PriceBreakdown {
            method: crate::pricing::PricingMethod::Flat,
            grid_id: None,
            grid_cell: None,
            quantity: 1.0,
            fabric_required_units: None,
            fabric_widths: None,
            fabric_cost: 0.0,
            base_cost: 10.0,
            resolved_markup_percent: 0.0,
            resolved_markup_source: crate::markup::MarkupSource::Default,
            sell_price: 10.0,
            margin_percent_equivalent: 0.0,
        };
        let err = store.write_breakdown(Uuid::new_v4(), &breakdown).await.unwrap_err();
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_scope_serialization() {
        let json = serde_json::to_string(&ResyncScope::All).unwrap();
        assert_eq!(json, r#"{"kind":"all"}"#);
    }
}
