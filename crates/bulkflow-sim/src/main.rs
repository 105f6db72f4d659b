#![doc = include_str!("../README.md")]

mod config;
mod index;
mod producer;
mod telemetry;
mod works;

use bulkflow::{BatchingOrchestrator, ExecutionContext};
use clap::Parser;
use config::{CliArgs, SimConfig};
use index::MemoryIndex;
use portable_atomic::Ordering;
use producer::{Tally, produce};
use std::{sync::Arc, time::Instant};
use telemetry::init_telemetry;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = SimConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let index = Arc::new(MemoryIndex::new(config.index.clone()));
    let orchestrator = Arc::new(BatchingOrchestrator::new(
        ExecutionContext::new(Arc::clone(&index)),
        config.orchestrator,
    ));
    let workload = Arc::new(config.workload.clone());
    let tally = Arc::new(Tally::default());
    let cancel = CancellationToken::new();
    let started = Instant::now();

    let producers: Vec<_> = (0..workload.producers)
        .map(|producer| {
            tokio::spawn(produce(
                producer,
                Arc::clone(&orchestrator),
                Arc::clone(&workload),
                Arc::clone(&tally),
                cancel.clone(),
            ))
        })
        .collect();
    let run = futures::future::join_all(producers);
    tokio::pin!(run);

    let joined = tokio::select! {
        joined = &mut run => joined,
        () = shutdown_signal() => {
            tracing::info!("Shutdown signal received, draining producers...");
            cancel.cancel();
            run.await
        }
    };

    if let Err(err) = orchestrator.shutdown().await {
        tracing::error!("Error during orchestrator shutdown: {err}");
    }

    for outcome in joined {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("Producer stopped early: {err}"),
            Err(err) => tracing::error!("Producer task failed: {err}"),
        }
    }

    log_summary(&index, &tally, started);
    Ok(())
}

fn log_startup_info(config: &SimConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting simulation with full config: {:#?}", config);
    } else {
        tracing::info!(
            producers = config.workload.producers,
            worksets_per_producer = config.workload.worksets_per_producer,
            works_per_workset = config.workload.works_per_workset,
            seed = config.workload.seed,
            "Starting simulation"
        );
    }
}

fn log_summary(index: &MemoryIndex, tally: &Tally, started: Instant) {
    let stats = index.stats();
    let bulk_requests = stats.bulk_requests.load(Ordering::Relaxed);
    let bulk_items = stats.bulk_items.load(Ordering::Relaxed);
    let avg_bulk_size = if bulk_requests == 0 {
        0.0
    } else {
        bulk_items as f64 / bulk_requests as f64
    };

    tracing::info!(
        elapsed = ?started.elapsed(),
        worksets = tally.worksets.load(Ordering::Relaxed),
        succeeded = tally.succeeded.load(Ordering::Relaxed),
        failed = tally.failed(),
        "Works settled"
    );
    tracing::info!(
        request_failures = tally.request_failures.load(Ordering::Relaxed),
        item_failures = tally.item_failures.load(Ordering::Relaxed),
        abandoned = tally.abandoned.load(Ordering::Relaxed),
        "Failure breakdown"
    );
    tracing::info!(
        composite = bulk_requests,
        standalone = stats.single_requests.load(Ordering::Relaxed),
        rejected = stats.rejected_requests.load(Ordering::Relaxed),
        avg_bulk_size,
        visible_documents = index.visible_len(),
        "Requests sent"
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
