//! In-memory stand-in for a remote bulk indexing service.
//!
//! Requests sleep for a configured latency, then roll for failure. Writes go
//! to a staging map; a refresh copies the staging map to the searchable view,
//! mirroring near-real-time search engines.

use crate::config::IndexConfig;
use bulkflow::{Error, Result, Transport};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::collections::HashMap;

pub type DocumentId = u64;

/// One work's contribution to a composite request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOp {
    Upsert { id: DocumentId, body: String },
    Delete { id: DocumentId },
}

impl IndexOp {
    pub const fn id(&self) -> DocumentId {
        match self {
            Self::Upsert { id, .. } | Self::Delete { id } => *id,
        }
    }
}

/// Acknowledgement returned for a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Created,
    Updated,
    Deleted,
    NotFound,
    Refreshed { visible: usize },
}

/// Request counters, read once the simulation is over.
#[derive(Debug, Default)]
pub struct IndexStats {
    pub bulk_requests: AtomicU64,
    pub bulk_items: AtomicU64,
    pub single_requests: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub rejected_items: AtomicU64,
}

#[derive(Debug, Default)]
struct Shards {
    staging: HashMap<DocumentId, String>,
    visible: HashMap<DocumentId, String>,
}

#[derive(Debug)]
pub struct MemoryIndex {
    config: IndexConfig,
    shards: Mutex<Shards>,
    rng: Mutex<SmallRng>,
    stats: IndexStats,
}

impl MemoryIndex {
    pub fn new(config: IndexConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            config,
            shards: Mutex::new(Shards::default()),
            rng: Mutex::new(rng),
            stats: IndexStats::default(),
        }
    }

    pub const fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Number of documents visible to searches.
    pub fn visible_len(&self) -> usize {
        self.shards.lock().visible.len()
    }

    /// Makes every write so far visible to searches.
    pub async fn refresh(&self) -> Result<Ack> {
        self.stats.single_requests.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.config.single_latency).await;

        if self.roll(self.config.request_failure_rate) {
            self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
            return Err(Error::request("refresh rejected: shard unavailable"));
        }

        let mut shards = self.shards.lock();
        shards.visible = shards.staging.clone();
        Ok(Ack::Refreshed {
            visible: shards.visible.len(),
        })
    }

    fn roll(&self, probability: f64) -> bool {
        probability > 0.0 && self.rng.lock().random_bool(probability)
    }

    fn apply(shards: &mut Shards, op: IndexOp) -> Ack {
        match op {
            IndexOp::Upsert { id, body } => match shards.staging.insert(id, body) {
                Some(_) => Ack::Updated,
                None => Ack::Created,
            },
            IndexOp::Delete { id } => match shards.staging.remove(&id) {
                Some(_) => Ack::Deleted,
                None => Ack::NotFound,
            },
        }
    }
}

impl Transport for MemoryIndex {
    type BulkItem = IndexOp;
    type BulkItemResponse = Ack;

    async fn execute_bulk(&self, items: Vec<IndexOp>) -> Result<Vec<Result<Ack>>> {
        self.stats.bulk_requests.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bulk_items
            .fetch_add(items.len() as u64, Ordering::Relaxed);
        tokio::time::sleep(self.config.bulk_latency).await;

        if self.roll(self.config.request_failure_rate) {
            self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
            return Err(Error::request(format!(
                "bulk of {} items rejected: too many requests",
                items.len()
            )));
        }

        let rejected: Vec<bool> = items
            .iter()
            .map(|_| self.roll(self.config.item_failure_rate))
            .collect();

        let mut shards = self.shards.lock();
        let outcomes = items
            .into_iter()
            .zip(rejected)
            .map(|(op, rejected)| {
                if rejected {
                    self.stats.rejected_items.fetch_add(1, Ordering::Relaxed);
                    Err(Error::item(format!("version conflict on document {}", op.id())))
                } else {
                    Ok(Self::apply(&mut shards, op))
                }
            })
            .collect();
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn index(request_failure_rate: f64, item_failure_rate: f64) -> MemoryIndex {
        MemoryIndex::new(IndexConfig {
            bulk_latency: Duration::ZERO,
            single_latency: Duration::ZERO,
            request_failure_rate,
            item_failure_rate,
            seed: 1,
        })
    }

    fn upsert(id: DocumentId) -> IndexOp {
        IndexOp::Upsert {
            id,
            body: format!("doc-{id}"),
        }
    }

    #[tokio::test]
    async fn applies_operations_in_order() {
        let index = index(0.0, 0.0);

        let outcomes = index
            .execute_bulk(vec![
                upsert(1),
                upsert(1),
                IndexOp::Delete { id: 1 },
                IndexOp::Delete { id: 2 },
            ])
            .await
            .unwrap();

        assert_eq!(
            outcomes,
            vec![
                Ok(Ack::Created),
                Ok(Ack::Updated),
                Ok(Ack::Deleted),
                Ok(Ack::NotFound)
            ]
        );
        assert_eq!(index.stats().bulk_requests.load(Ordering::Relaxed), 1);
        assert_eq!(index.stats().bulk_items.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn writes_become_visible_on_refresh() {
        let index = index(0.0, 0.0);
        index.execute_bulk(vec![upsert(1), upsert(2)]).await.unwrap();
        assert_eq!(index.visible_len(), 0);

        assert_eq!(index.refresh().await, Ok(Ack::Refreshed { visible: 2 }));
        assert_eq!(index.visible_len(), 2);
    }

    #[tokio::test]
    async fn rejected_request_applies_nothing() {
        let index = index(1.0, 0.0);

        let err = index.execute_bulk(vec![upsert(1)]).await.unwrap_err();
        assert!(err.is_request_level());
        assert!(matches!(index.refresh().await, Err(Error::Request { .. })));
        assert_eq!(index.stats().rejected_requests.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn rejected_items_are_reported_per_item() {
        let index = index(0.0, 1.0);

        let outcomes = index.execute_bulk(vec![upsert(1), upsert(2)]).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o, Err(Error::Item { .. }))));
        assert_eq!(index.stats().rejected_items.load(Ordering::Relaxed), 2);
    }
}
