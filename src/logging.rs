//! Logger setup shared by the binaries.
//!
//! Logs go to stderr; stdout may carry an archive or a makefile.

use log::LevelFilter;

/// Map repeated `-v` flags to a level. `RUST_LOG` still overrides it.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init(verbosity: u8) {
    env_logger::Builder::new()
        .filter_level(level_for(verbosity))
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}
