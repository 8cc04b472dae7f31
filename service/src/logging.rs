use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Modules to filter out from logging when not in Trace mode.
/// The WebSocket stack in particular logs every frame at debug level.
const FILTERED_MODULES: &[&str] = &[
    "tokio_tungstenite",
    "tungstenite",
    "tower",
    "tower_http",
    "hyper",
    "axum",
];

pub struct Logger {}

impl Logger {
    /// Installs the global terminal logger.
    ///
    /// Dependency logs are only shown at Trace level. Production output goes
    /// to stderr without colors so log collectors get plain lines.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let log_config = Self::build_log_config(Self::should_filter_dependencies(
            config.log_level_filter,
        ));
        let (mode, color) = Self::terminal_for(config.is_production());

        TermLogger::init(config.log_level_filter, log_config, mode, color)
    }

    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn terminal_for(production: bool) -> (TerminalMode, ColorChoice) {
        if production {
            (TerminalMode::Stderr, ColorChoice::Never)
        } else {
            (TerminalMode::Mixed, ColorChoice::Auto)
        }
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}
