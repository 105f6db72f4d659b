use crate::{
    config::WorkloadConfig,
    index::{Ack, DocumentId, IndexOp, MemoryIndex},
};
use bulkflow::{BulkableWork, Error, ExecutionContext, NonBulkableWork, Result, Work};
use futures::{FutureExt, future::BoxFuture};
use rand::Rng;

/// Adds or replaces a document.
#[derive(Debug)]
pub struct IndexDocument {
    pub id: DocumentId,
    pub body: String,
}

impl BulkableWork<MemoryIndex> for IndexDocument {
    type Output = Ack;

    fn bulk_item(&self) -> IndexOp {
        IndexOp::Upsert {
            id: self.id,
            body: self.body.clone(),
        }
    }

    fn handle_bulk_item(self: Box<Self>, response: Ack) -> Result<Ack> {
        match response {
            Ack::Created | Ack::Updated => Ok(response),
            other => Err(Error::item(format!(
                "unexpected acknowledgement {other:?} for upsert of document {}",
                self.id
            ))),
        }
    }
}

/// Removes a document. Removing a missing document is not a failure.
#[derive(Debug)]
pub struct DeleteDocument {
    pub id: DocumentId,
}

impl BulkableWork<MemoryIndex> for DeleteDocument {
    type Output = Ack;

    fn bulk_item(&self) -> IndexOp {
        IndexOp::Delete { id: self.id }
    }

    fn handle_bulk_item(self: Box<Self>, response: Ack) -> Result<Ack> {
        match response {
            Ack::Deleted | Ack::NotFound => Ok(response),
            other => Err(Error::item(format!(
                "unexpected acknowledgement {other:?} for delete of document {}",
                self.id
            ))),
        }
    }
}

/// Makes previous writes visible. Must be sent on its own.
#[derive(Debug)]
pub struct Refresh;

impl NonBulkableWork<MemoryIndex> for Refresh {
    type Output = Ack;

    fn execute(
        self: Box<Self>,
        context: ExecutionContext<MemoryIndex>,
    ) -> BoxFuture<'static, Result<Ack>> {
        async move { context.transport().refresh().await }.boxed()
    }
}

/// Draws one work according to the workload mix.
pub fn random_work<R: Rng>(rng: &mut R, workload: &WorkloadConfig) -> Work<MemoryIndex, Ack> {
    let roll: f64 = rng.random();
    if roll < workload.refresh_ratio {
        return Work::non_bulkable(Refresh);
    }

    let id = rng.random_range(0..workload.documents);
    if roll < workload.refresh_ratio + workload.delete_ratio {
        Work::bulkable(DeleteDocument { id })
    } else {
        let revision: u32 = rng.random();
        Work::bulkable(IndexDocument {
            id,
            body: format!("{{\"id\":{id},\"revision\":{revision}}}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    fn workload(delete_ratio: f64, refresh_ratio: f64) -> WorkloadConfig {
        WorkloadConfig {
            producers: 1,
            worksets_per_producer: 1,
            works_per_workset: 1,
            documents: 10,
            delete_ratio,
            refresh_ratio,
            seed: 3,
        }
    }

    #[test]
    fn respects_the_workload_mix() {
        let mut rng = SmallRng::seed_from_u64(3);

        let only_refresh = workload(0.0, 1.0);
        assert!((0..32).all(|_| !random_work(&mut rng, &only_refresh).is_bulkable()));

        let only_writes = workload(0.5, 0.0);
        assert!((0..32).all(|_| random_work(&mut rng, &only_writes).is_bulkable()));
    }

    #[test]
    fn delete_accepts_missing_documents() {
        let work = Box::new(DeleteDocument { id: 4 });
        assert_eq!(work.handle_bulk_item(Ack::NotFound), Ok(Ack::NotFound));
    }

    #[test]
    fn upsert_rejects_delete_acknowledgement() {
        let work = Box::new(IndexDocument {
            id: 4,
            body: String::new(),
        });
        assert!(matches!(
            work.handle_bulk_item(Ack::Deleted),
            Err(Error::Item { .. })
        ));
    }
}
