use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is not set, so that demos show the bucket's
/// call trace out of the box.
const DEFAULT_DIRECTIVE: &str = "fcfs_bucket=trace";

/// Initialize logging for a given demo.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .init();
}
