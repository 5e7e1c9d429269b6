//! Structured logging. Thin facade over slog so the rest of the engine can
//! `use crate::logging;` and not care about the backend.

pub use slog::{debug, error, info, o, trace, warn, Discard, Logger};

use sloggers::{Config as SloggersConfig, LoggerConfig};

/// Build the process-wide root logger from an embedded terminal config.
pub fn init() -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(
        r#"
type = "terminal"
level = "info"
destination = "stderr"
"#,
    )
    .expect("embedded logger config must parse");

    config.build_logger().expect("logger construction failed")
}

/// A logger that swallows everything; components accept `Option<&Logger>`
/// and fall back to this in tests.
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

/// Resolve an optional parent logger into a child or a discard logger.
pub fn child<'a, L: Into<Option<&'a Logger>>>(parent: L) -> Logger {
    match parent.into() {
        Some(log) => log.new(o!()),
        None => discard(),
    }
}
