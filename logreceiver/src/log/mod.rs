use slog::{o, Drain, FilterLevel, Logger};

use crate::env::ENV_VARS;

/// Create the root logger. Log levels can be adjusted per module with the
/// `LOGRECEIVER_LOG` environment variable, which uses the same syntax as
/// `RUST_LOG`
pub fn logger(show_debug: bool) -> Logger {
    logger_with_levels(show_debug, ENV_VARS.log_levels.as_deref())
}

pub fn logger_with_levels(show_debug: bool, levels: Option<&str>) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::LogBuilder::new(drain)
        .filter(
            None,
            if show_debug {
                FilterLevel::Debug
            } else {
                FilterLevel::Info
            },
        )
        .parse(levels.unwrap_or(""))
        .build();
    let drain = slog_async::Async::new(drain)
        .chan_size(20000)
        .build()
        .fuse();
    Logger::root(drain, o!())
}

/// A logger that drops everything; used in tests
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
