use tracing_subscriber::EnvFilter;

/// Installs a `RUST_LOG`-filtered fmt subscriber. Safe to call more than once;
/// an already-installed global subscriber is left in place.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
