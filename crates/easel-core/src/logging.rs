//! Tracing subscriber setup driven by [`LoggingConfig`].

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{EaselError, Result};

/// Build the log filter. `RUST_LOG` wins; otherwise the configured level (or
/// `info`/`debug` depending on `verbose`) plus per-crate `filters`.
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = config
        .level
        .clone()
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string());
    let mut filter =
        EnvFilter::try_new(&level).map_err(|e| EaselError::Config(format!("log level: {e}")))?;
    for directive in &config.filters {
        let parsed = directive
            .parse()
            .map_err(|e| EaselError::Config(format!("log filter '{directive}': {e}")))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Install the global tracing subscriber.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(build_filter(config, verbose)?);

    let installed = match (config.format.as_str(), config.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).try_init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).try_init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).try_init(),
        _ => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| EaselError::Config(format!("failed to install logger: {e}")))
}
