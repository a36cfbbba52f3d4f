//! Logging setup.
//!
//! Library code logs through `tracing` with per-component targets:
//! `pool`, `index`, `reconcile`, `query`, `scheduler`, `embedding` and
//! `chunker`. The binary installs a compact stderr subscriber here.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.targets]
//! reconcile = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence over the configuration:
//! ```bash
//! RUST_LOG=reconcile=debug,pool=trace docindex reconcile ./docs
//! ```

use std::sync::Once;

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::models::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Filter directives for a logging configuration, e.g. `warn,reconcile=debug`.
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.default.clone();
    for (target, level) in &config.targets {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        assert_eq!(filter_directives(&config), "warn");

        config.targets.insert("reconcile".into(), "debug".into());
        config.targets.insert("pool".into(), "trace".into());
        assert_eq!(
            filter_directives(&config),
            "warn,pool=trace,reconcile=debug"
        );
    }
}
