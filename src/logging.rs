use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding a tracing filter directive, e.g. `confluence_report=debug`.
pub const LOG_ENV: &str = "CONFLUENCE_REPORT_LOG";

/// Install the stderr subscriber. `--verbose` lowers the default level to `debug`.
pub fn init(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(console::Term::stderr().features().colors_supported())
        .with_filter(filter);

    // A second call (tests driving `main` paths) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(layer).try_init();
}
