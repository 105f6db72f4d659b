use crate::{
    config::WorkloadConfig,
    index::{Ack, MemoryIndex},
    works::random_work,
};
use bulkflow::{BatchingOrchestrator, Error, Result, Workset};
use portable_atomic::{AtomicU64, Ordering};
use rand::{SeedableRng, rngs::SmallRng};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome counters shared by every producer.
#[derive(Debug, Default)]
pub struct Tally {
    pub worksets: AtomicU64,
    pub succeeded: AtomicU64,
    pub request_failures: AtomicU64,
    pub item_failures: AtomicU64,
    pub abandoned: AtomicU64,
}

impl Tally {
    pub fn record(&self, outcome: &Result<Ack>) {
        let counter = match outcome {
            Ok(_) => &self.succeeded,
            Err(err) if err.is_request_level() => &self.request_failures,
            Err(Error::Item { .. }) => &self.item_failures,
            Err(_) => &self.abandoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.request_failures.load(Ordering::Relaxed)
            + self.item_failures.load(Ordering::Relaxed)
            + self.abandoned.load(Ordering::Relaxed)
    }
}

/// Submits random worksets until the quota is reached, the token is
/// cancelled, or the orchestrator refuses new worksets.
pub async fn produce(
    producer: usize,
    orchestrator: Arc<BatchingOrchestrator<MemoryIndex>>,
    workload: Arc<WorkloadConfig>,
    tally: Arc<Tally>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(workload.seed.wrapping_add(producer as u64 + 1));

    for _ in 0..workload.worksets_per_producer {
        if cancel.is_cancelled() {
            tracing::debug!(producer, "Producer cancelled");
            break;
        }

        let mut workset = Workset::with_capacity(workload.works_per_workset);
        let futures: Vec<_> = (0..workload.works_per_workset)
            .map(|_| workset.add(random_work(&mut rng, &workload)))
            .collect();

        match orchestrator.submit(workset).await {
            Ok(settled) => settled.await,
            Err(Error::ServiceShutdown) => {
                tracing::debug!(producer, "Orchestrator refused workset");
                break;
            }
            Err(err) => return Err(err),
        }

        for future in futures {
            tally.record(&future.await);
        }
        tally.worksets.fetch_add(1, Ordering::Relaxed);
    }

    Ok(())
}
