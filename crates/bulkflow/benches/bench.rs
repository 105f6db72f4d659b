use bulkflow::{
    BatchingOrchestrator, BulkableWork, ExecutionContext, NonBulkableWork, OrchestratorConfig,
    ProcessorConfig, Result, SerialWorkProcessor, Transport, Work, Workset,
};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::{FutureExt, future::BoxFuture};
use std::{sync::Arc, time::Instant};
use tokio::runtime::Builder;

const WORKS_PER_BATCH: usize = 4_096;
const WORKS_PER_WORKSET: usize = 16;

/// Transport that acknowledges every item without leaving the process.
struct NoopTransport;

impl Transport for NoopTransport {
    type BulkItem = u64;
    type BulkItemResponse = u64;

    async fn execute_bulk(&self, items: Vec<u64>) -> Result<Vec<Result<u64>>> {
        Ok(items.into_iter().map(Ok).collect())
    }
}

struct Index(u64);

impl BulkableWork<NoopTransport> for Index {
    type Output = u64;

    fn bulk_item(&self) -> u64 {
        self.0
    }

    fn handle_bulk_item(self: Box<Self>, response: u64) -> Result<u64> {
        Ok(response)
    }
}

struct Refresh(u64);

impl NonBulkableWork<NoopTransport> for Refresh {
    type Output = u64;

    fn execute(
        self: Box<Self>,
        _context: ExecutionContext<NoopTransport>,
    ) -> BoxFuture<'static, Result<u64>> {
        futures::future::ready(Ok(self.0)).boxed()
    }
}

/// Every `every`-th work is non-bulkable; `0` means bulkable only.
fn work(id: u64, every: u64) -> Work<NoopTransport, u64> {
    if every != 0 && id % every == every - 1 {
        Work::non_bulkable(Refresh(id))
    } else {
        Work::bulkable(Index(id))
    }
}

/// Benchmarks one processor driven from a single task.
fn bench_processor(c: &mut Criterion, group_name: &str, every: u64) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(WORKS_PER_BATCH as u64));

    group.bench_function(format!("elems/{}", WORKS_PER_BATCH), |b| {
        let rt = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .build()
            .unwrap();

        b.to_async(&rt).iter_custom(|iters| async move {
            let context = ExecutionContext::new(Arc::new(NoopTransport));
            let start = Instant::now();

            for _ in 0..iters {
                let mut processor =
                    SerialWorkProcessor::new(context.clone(), ProcessorConfig::default());
                let mut futures = Vec::with_capacity(WORKS_PER_BATCH);
                for chunk in 0..WORKS_PER_BATCH / WORKS_PER_WORKSET {
                    let mut workset = processor.begin_workset();
                    for i in 0..WORKS_PER_WORKSET {
                        let id = (chunk * WORKS_PER_WORKSET + i) as u64;
                        futures.push(workset.submit(work(id, every)));
                    }
                    let _ = workset.end();
                }
                processor.end_batch().await;
                for future in futures {
                    black_box(future.await.unwrap());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks concurrent submitters sharing one orchestrator.
fn bench_orchestrator(c: &mut Criterion, group_name: &str, submitters: usize) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(WORKS_PER_BATCH as u64));

    group.bench_function(
        format!("elems/{}/submitters/{}", WORKS_PER_BATCH, submitters),
        |b| {
            let rt = Builder::new_multi_thread().enable_all().build().unwrap();

            b.to_async(&rt).iter_custom(move |iters| async move {
                let context = ExecutionContext::new(Arc::new(NoopTransport));
                let orchestrator = Arc::new(BatchingOrchestrator::new(
                    context,
                    OrchestratorConfig::default(),
                ));
                let worksets = WORKS_PER_BATCH / WORKS_PER_WORKSET / submitters;
                let start = Instant::now();

                for _ in 0..iters {
                    let tasks: Vec<_> = (0..submitters)
                        .map(|_| {
                            let orchestrator = Arc::clone(&orchestrator);
                            tokio::spawn(async move {
                                for _ in 0..worksets {
                                    let mut workset = Workset::with_capacity(WORKS_PER_WORKSET);
                                    let futures: Vec<_> = (0..WORKS_PER_WORKSET as u64)
                                        .map(|id| workset.add(work(id, 0)))
                                        .collect();
                                    orchestrator.submit(workset).await.unwrap().await;
                                    for future in futures {
                                        black_box(future.await.unwrap());
                                    }
                                }
                            })
                        })
                        .collect();
                    for task in tasks {
                        task.await.unwrap();
                    }
                }

                let elapsed = start.elapsed();
                orchestrator.shutdown().await.unwrap();
                elapsed
            });
        },
    );

    group.finish();
}

fn benchmark_processor_bulk_only(c: &mut Criterion) {
    bench_processor(c, "processor/bulk_only", 0);
}

fn benchmark_processor_interleaved(c: &mut Criterion) {
    bench_processor(c, "processor/interleaved", 8);
}

fn benchmark_orchestrator_contended(c: &mut Criterion) {
    for submitters in [1, 4, 16] {
        bench_orchestrator(c, "orchestrator/contended", submitters);
    }
}

criterion_group!(
    benches,
    benchmark_processor_bulk_only,
    benchmark_processor_interleaved,
    benchmark_orchestrator_contended,
);
criterion_main!(benches);
