//! Console logging for the simulator.
//!
//! Events from `bulkflow` (bulk release, composite execution, batch end) and
//! from the simulator itself go through one `tracing_subscriber::fmt` layer.
//! Verbosity follows `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=bulkflow=debug,bulkflow_sim=info cargo run -p bulkflow-sim
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(false)
                .compact(),
        )
        .try_init()?;
    Ok(())
}
