use core::num::NonZeroUsize;
use core::time::Duration;

/// Largest number of works merged into one composite request by default.
pub const DEFAULT_MAX_BULK_SIZE: usize = 100;

/// Default capacity of the orchestrator's workset queue.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Default number of worksets drained from the queue into one batch.
pub const DEFAULT_MAX_WORKSETS_PER_BATCH: usize = 100;

/// Default time granted to the orchestrator worker to acknowledge shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Tuning for a [`SerialWorkProcessor`](crate::SerialWorkProcessor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProcessorConfig {
    /// Once this many bulkable works are accumulated, the accumulation is
    /// added to the current sequence and released for execution without
    /// waiting for a non-bulkable work or the end of the batch.
    pub max_bulk_size: NonZeroUsize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_bulk_size: NonZeroUsize::new(DEFAULT_MAX_BULK_SIZE)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl ProcessorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of works per composite request.
    pub const fn with_max_bulk_size(mut self, max_bulk_size: NonZeroUsize) -> Self {
        self.max_bulk_size = max_bulk_size;
        self
    }
}

/// Tuning for a [`BatchingOrchestrator`](crate::BatchingOrchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrchestratorConfig {
    /// Capacity of the bounded queue between submitters and the worker.
    /// Submitters wait when the queue is full.
    pub queue_size: NonZeroUsize,

    /// Maximum number of queued worksets processed in one batch.
    pub max_worksets_per_batch: NonZeroUsize,

    /// How long `shutdown` waits for the worker to finish its current batch.
    pub shutdown_timeout: Duration,

    /// Configuration of the underlying processor.
    pub processor: ProcessorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_size: NonZeroUsize::new(DEFAULT_QUEUE_SIZE).unwrap_or(NonZeroUsize::MIN),
            max_worksets_per_batch: NonZeroUsize::new(DEFAULT_MAX_WORKSETS_PER_BATCH)
                .unwrap_or(NonZeroUsize::MIN),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            processor: ProcessorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue capacity.
    pub const fn with_queue_size(mut self, queue_size: NonZeroUsize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Set the maximum number of worksets per batch.
    pub const fn with_max_worksets_per_batch(mut self, max: NonZeroUsize) -> Self {
        self.max_worksets_per_batch = max;
        self
    }

    /// Set the shutdown acknowledgement timeout.
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the processor configuration.
    pub const fn with_processor(mut self, processor: ProcessorConfig) -> Self {
        self.processor = processor;
        self
    }
}
