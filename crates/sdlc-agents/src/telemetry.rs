//! Logging setup for the pipeline binary.

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
