//! Tracing subscriber initialisation

use rampart_domain::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Install the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. An invalid level falls
/// back to the default directive. Returns `false` when a global subscriber
/// was already installed, in which case the existing one stays in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let (filter, rejected_level) = build_filter(config);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer().json().with_target(true).with_current_span(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let installed =
        tracing_subscriber::registry().with(layer.with_filter(filter)).try_init().is_ok();

    if installed {
        tracing::debug!(
            level = %config.level,
            json = config.json,
            "Tracing subscriber initialized"
        );
    } else {
        tracing::debug!("Global tracing subscriber already initialized, keeping the existing one");
    }
    if let Some(level) = rejected_level {
        tracing::warn!(level = %level, "Invalid log level directive, using default");
    }
    installed
}

/// Filter from `RUST_LOG`, else `config.level`; also returns a rejected level
fn build_filter(config: &LoggingConfig) -> (EnvFilter, Option<String>) {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return (filter, None);
    }
    match EnvFilter::try_new(&config.level) {
        Ok(filter) => (filter, None),
        Err(_) => {
            let fallback = EnvFilter::new(rampart_domain::constants::DEFAULT_LOG_LEVEL);
            (fallback, Some(config.level.clone()))
        }
    }
}
