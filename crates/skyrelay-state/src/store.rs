use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use skyrelay_types::{normalize_icao24, BatchVersion, StateSample};

use crate::record::AircraftRecord;

struct StoreInner {
    records: HashMap<String, AircraftRecord>,
    batch_version: BatchVersion,
}

/// Registry of every aircraft seen in the most recent poll.
///
/// The whole map and the batch counter sit behind one lock, so a batch's
/// updates and evictions become visible to snapshot readers together.
/// Only the poll cycle writes.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl StateStore {
    pub fn new() -> Self {
        StateStore {
            inner: Arc::new(RwLock::new(StoreInner {
                records: HashMap::new(),
                batch_version: 0,
            })),
        }
    }

    /// Apply one poll's worth of samples.
    ///
    /// Aircraft missing from `samples` are dropped immediately. The batch
    /// version advances even when `samples` is empty.
    pub async fn apply_batch(&self, samples: &[StateSample]) {
        let mut g = self.inner.write().await;
        g.batch_version += 1;
        let version = g.batch_version;
        let now = Utc::now();

        let mut seen: HashSet<String> = HashSet::with_capacity(samples.len());
        for sample in samples {
            let Some(key) = normalize_icao24(&sample.icao24) else {
                continue;
            };
            g.records
                .entry(key.clone())
                .or_insert_with(|| AircraftRecord::new(key.clone()))
                .apply_sample(sample, version, now);
            seen.insert(key);
        }

        let before = g.records.len();
        g.records.retain(|key, _| seen.contains(key));

        tracing::debug!(
            version,
            tracked = g.records.len(),
            evicted = before - g.records.len(),
            "batch applied"
        );
    }

    /// Deep copy of every record as of the last completed batch.
    pub async fn snapshot(&self) -> Vec<AircraftRecord> {
        let g = self.inner.read().await;
        g.records.values().cloned().collect()
    }

    /// Version of the last applied batch. Every field change visible now
    /// carries a version `<=` this value.
    pub async fn current_version(&self) -> BatchVersion {
        self.inner.read().await.batch_version
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
