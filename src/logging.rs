use std::io::Write;

use chrono::Local;
use log::{Level, LevelFilter};

fn level_filter(level: Level) -> LevelFilter {
    match level {
        Level::Error => LevelFilter::Error,
        Level::Warn => LevelFilter::Warn,
        Level::Info => LevelFilter::Info,
        Level::Debug => LevelFilter::Debug,
        Level::Trace => LevelFilter::Trace,
    }
}

/// Install the stderr logger. `RUST_LOG` overrides `level`.
///
/// Calling it twice is harmless; the second call reports the error and
/// keeps the first logger.
pub fn init(level: Level) -> Result<(), log::SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(level_filter(level))
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
}
