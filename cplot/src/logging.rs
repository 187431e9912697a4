//! tracing subscriber setup.
//!
//! The filter starts from `RUST_LOG` plus `debug` (with `-v`) or `info`.
//! Once the configuration is loaded its `log_level` replaces the default
//! directive unless `-v` was given. Logs go to stderr so stdout carries
//! only command output.

use cplot_common::config::LogLevel;
use tracing::{Level, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Handle for adjusting the installed filter.
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    verbose: bool,
}

fn level_of(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Install the global subscriber.
///
/// # Arguments
///
/// * `verbose` - Debug level regardless of configuration
/// * `json` - Structured JSON lines instead of the human format
pub fn setup_tracing(verbose: bool, json: bool) -> LogControl {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let (filter, handle) = reload::Layer::new(filter_for(level));
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if json {
        registry.with(fmt.json()).init();
    } else {
        registry.with(fmt).init();
    }
    LogControl { handle, verbose }
}

impl LogControl {
    /// Apply the configured level; `-v` keeps precedence.
    pub fn apply_level(&self, level: LogLevel) {
        if self.verbose {
            return;
        }
        if let Err(e) = self.handle.reload(filter_for(level_of(level))) {
            warn!("Could not apply log level '{}': {e}", level.as_directive());
        }
    }
}
