//! env_logger setup: compact lines, crate prefix stripped from targets.

use std::io::Write;

use env_logger::{Builder, Env};

/// Render a record target without the crate prefix.
pub fn short_target(target: &str) -> &str {
    target
        .strip_prefix("thumby::")
        .or_else(|| target.strip_prefix("thumby_core::"))
        .unwrap_or(target)
}

/// Install the global logger. `RUST_LOG` wins over `default_level`.
/// Calling it twice is harmless; the second call is ignored.
pub fn init(default_level: &str) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format(|buf, record| {
        let ts = buf.timestamp_seconds();
        let level_style = buf.default_level_style(record.level());
        writeln!(
            buf,
            "{ts}  {level_style}{level:5}{level_style:#}  {target}  {message}",
            level = record.level(),
            target = short_target(record.target()),
            message = record.args()
        )
    });
    if builder.try_init().is_err() {
        log::debug!(target: "thumby::logging", "logger already initialised");
    }
}
