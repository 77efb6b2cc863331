//! Read-shared projections of campaign records. Display only: nothing here
//! authorizes a request.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crowdfunding_contract::CampaignId;
use serde::Serialize;

use crate::record::CampaignRecord;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub record: CampaignRecord,
    /// Ledger time of the read that produced `record`.
    pub observed_at: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectionCache {
    inner: Arc<RwLock<HashMap<CampaignId, Projection>>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: CampaignId) -> Option<Projection> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Store `record` unless the cache already holds a newer view of it.
    /// Returns whether the entry changed.
    pub fn refresh(&self, record: CampaignRecord, observed_at: u64) -> bool {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = map.get(&record.id) {
            let older = observed_at < current.observed_at;
            // terminal status never reverts, whatever order reads come back in
            let regresses = current.record.status.is_finalized() && !record.status.is_finalized();
            let shrinks = current.record.status == record.status
                && record.total_funded < current.record.total_funded;
            if older || regresses || shrinks {
                return false;
            }
        }
        map.insert(
            record.id,
            Projection {
                record,
                observed_at,
            },
        );
        true
    }

    pub fn invalidate(&self, id: CampaignId) -> Option<Projection> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// All projections, ordered by campaign id.
    pub fn list(&self) -> Vec<Projection> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by_key(|p| p.record.id);
        all
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
