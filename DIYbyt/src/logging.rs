//! Tracing subscriber setup

use bytconfig::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber
///
/// `RUST_LOG` takes precedence over `host.logger.min_level`. The console
/// layer is only added when `host.logger.enable_console` is set.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));

    let console = config
        .get_log_enable_console()
        .then(|| tracing_subscriber::fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .init();
}
