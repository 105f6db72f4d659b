use anyhow::bail;
use bulkflow::{OrchestratorConfig, ProcessorConfig};
use clap::Parser;
use core::{num::NonZeroUsize, time::Duration};

/// Runtime configuration for the `bulkflow-sim` binary.
///
/// These settings shape the synthetic workload (how many producers, how many
/// worksets, which mix of works) and the behavior of the simulated index
/// (latency and failure injection). All values are parsed from CLI arguments
/// or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bulkflow-sim",
    version,
    about = "Drives bulkflow against a simulated bulk indexing service"
)]
pub struct CliArgs {
    /// Number of concurrent producers submitting worksets.
    ///
    /// Environment variable: `PRODUCERS`
    #[arg(long, env = "PRODUCERS", default_value_t = 4)]
    pub producers: usize,

    /// Number of worksets each producer submits before stopping.
    ///
    /// Environment variable: `WORKSETS_PER_PRODUCER`
    #[arg(long, env = "WORKSETS_PER_PRODUCER", default_value_t = 250)]
    pub worksets_per_producer: usize,

    /// Number of works in each workset.
    ///
    /// Environment variable: `WORKS_PER_WORKSET`
    #[arg(long, env = "WORKS_PER_WORKSET", default_value_t = 8)]
    pub works_per_workset: usize,

    /// Number of distinct document ids works are drawn from.
    ///
    /// A small id space makes producers contend on the same documents.
    ///
    /// Environment variable: `DOCUMENTS`
    #[arg(long, env = "DOCUMENTS", default_value_t = 1_000)]
    pub documents: u64,

    /// Probability that a work is a delete rather than an index.
    ///
    /// Environment variable: `DELETE_RATIO`
    #[arg(long, env = "DELETE_RATIO", default_value_t = 0.2)]
    pub delete_ratio: f64,

    /// Probability that a work is a standalone refresh.
    ///
    /// Environment variable: `REFRESH_RATIO`
    #[arg(long, env = "REFRESH_RATIO", default_value_t = 0.05)]
    pub refresh_ratio: f64,

    /// Latency of one composite request, in milliseconds.
    ///
    /// Environment variable: `BULK_LATENCY_MS`
    #[arg(long, env = "BULK_LATENCY_MS", default_value_t = 5)]
    pub bulk_latency_ms: u64,

    /// Latency of one standalone request, in milliseconds.
    ///
    /// Environment variable: `SINGLE_LATENCY_MS`
    #[arg(long, env = "SINGLE_LATENCY_MS", default_value_t = 2)]
    pub single_latency_ms: u64,

    /// Probability that a whole request is rejected.
    ///
    /// Environment variable: `REQUEST_FAILURE_RATE`
    #[arg(long, env = "REQUEST_FAILURE_RATE", default_value_t = 0.01)]
    pub request_failure_rate: f64,

    /// Probability that one item of a composite request is rejected.
    ///
    /// Environment variable: `ITEM_FAILURE_RATE`
    #[arg(long, env = "ITEM_FAILURE_RATE", default_value_t = 0.02)]
    pub item_failure_rate: f64,

    /// Maximum number of works carried by one composite request.
    ///
    /// Environment variable: `MAX_BULK_SIZE`
    #[arg(long, env = "MAX_BULK_SIZE", default_value_t = bulkflow::DEFAULT_MAX_BULK_SIZE)]
    pub max_bulk_size: usize,

    /// Capacity of the orchestrator queue.
    ///
    /// Environment variable: `QUEUE_SIZE`
    #[arg(long, env = "QUEUE_SIZE", default_value_t = bulkflow::DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,

    /// Maximum number of worksets drained into one batch.
    ///
    /// Environment variable: `MAX_WORKSETS_PER_BATCH`
    #[arg(long, env = "MAX_WORKSETS_PER_BATCH", default_value_t = bulkflow::DEFAULT_MAX_WORKSETS_PER_BATCH)]
    pub max_worksets_per_batch: usize,

    /// How long shutdown waits for the orchestrator, in milliseconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_MS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_MS", default_value_t = 3_000)]
    pub shutdown_timeout_ms: u64,

    /// Seed for the workload and failure injection. Random when omitted.
    ///
    /// Environment variable: `SEED`
    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,
}

/// Knobs of the simulated index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub bulk_latency: Duration,
    pub single_latency: Duration,
    pub request_failure_rate: f64,
    pub item_failure_rate: f64,
    pub seed: u64,
}

/// Shape of the synthetic workload.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub producers: usize,
    pub worksets_per_producer: usize,
    pub works_per_workset: usize,
    pub documents: u64,
    pub delete_ratio: f64,
    pub refresh_ratio: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub workload: WorkloadConfig,
    pub index: IndexConfig,
    pub orchestrator: OrchestratorConfig,
}

impl TryFrom<CliArgs> for SimConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.producers == 0 {
            bail!("PRODUCERS must be greater than 0");
        }

        if args.works_per_workset == 0 {
            bail!("WORKS_PER_WORKSET must be greater than 0");
        }

        if args.documents == 0 {
            bail!("DOCUMENTS must be greater than 0");
        }

        for (name, value) in [
            ("DELETE_RATIO", args.delete_ratio),
            ("REFRESH_RATIO", args.refresh_ratio),
            ("REQUEST_FAILURE_RATE", args.request_failure_rate),
            ("ITEM_FAILURE_RATE", args.item_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }

        if args.delete_ratio + args.refresh_ratio > 1.0 {
            bail!(
                "DELETE_RATIO ({}) + REFRESH_RATIO ({}) must not exceed 1",
                args.delete_ratio,
                args.refresh_ratio
            );
        }

        let Some(max_bulk_size) = NonZeroUsize::new(args.max_bulk_size) else {
            bail!("MAX_BULK_SIZE must be greater than 0");
        };
        let Some(queue_size) = NonZeroUsize::new(args.queue_size) else {
            bail!("QUEUE_SIZE must be greater than 0");
        };
        let Some(max_worksets_per_batch) = NonZeroUsize::new(args.max_worksets_per_batch) else {
            bail!("MAX_WORKSETS_PER_BATCH must be greater than 0");
        };

        let seed = args.seed.unwrap_or_else(rand::random);

        Ok(Self {
            workload: WorkloadConfig {
                producers: args.producers,
                worksets_per_producer: args.worksets_per_producer,
                works_per_workset: args.works_per_workset,
                documents: args.documents,
                delete_ratio: args.delete_ratio,
                refresh_ratio: args.refresh_ratio,
                seed,
            },
            index: IndexConfig {
                bulk_latency: Duration::from_millis(args.bulk_latency_ms),
                single_latency: Duration::from_millis(args.single_latency_ms),
                request_failure_rate: args.request_failure_rate,
                item_failure_rate: args.item_failure_rate,
                seed,
            },
            orchestrator: OrchestratorConfig::new()
                .with_queue_size(queue_size)
                .with_max_worksets_per_batch(max_worksets_per_batch)
                .with_shutdown_timeout(Duration::from_millis(args.shutdown_timeout_ms))
                .with_processor(ProcessorConfig::new().with_max_bulk_size(max_bulk_size)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["bulkflow-sim", "--seed", "7"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SimConfig::try_from(args(&[])).unwrap();
        assert_eq!(config.workload.seed, 7);
        assert_eq!(config.index.seed, 7);
        assert_eq!(
            config.orchestrator.processor.max_bulk_size.get(),
            bulkflow::DEFAULT_MAX_BULK_SIZE
        );
    }

    #[test]
    fn rejects_zero_producers() {
        let err = SimConfig::try_from(args(&["--producers", "0"])).unwrap_err();
        assert!(err.to_string().contains("PRODUCERS"));
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let err = SimConfig::try_from(args(&["--item-failure-rate", "1.5"])).unwrap_err();
        assert!(err.to_string().contains("ITEM_FAILURE_RATE"));
    }

    #[test]
    fn rejects_overlapping_ratios() {
        let err = SimConfig::try_from(args(&["--delete-ratio", "0.7", "--refresh-ratio", "0.5"]))
            .unwrap_err();
        assert!(err.to_string().contains("must not exceed 1"));
    }

    #[test]
    fn rejects_empty_bulks() {
        let err = SimConfig::try_from(args(&["--max-bulk-size", "0"])).unwrap_err();
        assert!(err.to_string().contains("MAX_BULK_SIZE"));
    }
}
