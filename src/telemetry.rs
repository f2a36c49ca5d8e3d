//! Tracing subscriber setup.
//!
//! The replayer is a library subsystem; its container usually owns the log
//! sinks. This installs a plain stderr subscriber for embedding daemons and
//! tests, with the filter overridable through the `LOG` environment
//! variable.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

pub fn init(config: &LoggingConfig) {
    if !config.stdout {
        return;
    }

    let filter = EnvFilter::builder()
        .with_default_directive(level_from_verbosity(config.verbosity).into())
        .with_env_var("LOG")
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    // a second init (e.g. from another test) keeps the first subscriber
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("telemetry already initialized");
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::ERROR,
        1 => tracing::metadata::LevelFilter::INFO,
        _ => tracing::metadata::LevelFilter::DEBUG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0), tracing::metadata::LevelFilter::ERROR);
        assert_eq!(level_from_verbosity(1), tracing::metadata::LevelFilter::INFO);
        assert_eq!(level_from_verbosity(9), tracing::metadata::LevelFilter::DEBUG);
    }
}
