use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `filter` uses EnvFilter syntax (`info`, `sakila_reports=debug,tower_http=info`).
/// An unparsable filter falls back to `info`. Logs go to stderr; stdout
/// belongs to report output.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
