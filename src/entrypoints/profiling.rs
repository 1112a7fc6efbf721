use tracing_subscriber::EnvFilter;

/// Filter used when RUST_LOG is not set
fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug,hyper_util=info,reqwest::connect=info"
    } else {
        "info"
    }
}

/// Initialize logging.
///
/// With the `profiling` feature, `profiling::scope!` markers become tracing
/// spans and their timings are logged when they close.
pub fn setup_logging_and_profiling() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);

    #[cfg(feature = "profiling")]
    let builder = builder.with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE);

    builder.init();

    #[cfg(feature = "profiling")]
    tracing::info!("Profiling enabled: scope timings are logged at span close");
}
