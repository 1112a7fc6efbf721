use super::metadata::log_version_info;
use super::profiling::setup_logging_and_profiling;
use crate::{app::settings::Settings, entrypoints::cli::parse_args};

/// Native entry point
pub async fn native_main() {
    setup_logging_and_profiling();
    log_version_info();

    let settings = match parse_args::<Settings>() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    if let Err(e) = crate::app::run(settings).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
