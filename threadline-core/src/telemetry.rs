//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::GeneralConfig;
use crate::error::{Result, ThreadlineError};

/// Install a global `tracing` subscriber configured from `config`.
///
/// `RUST_LOG` overrides `config.log_level` when set. Output is
/// human-readable unless `config.json_logs` is on.
///
/// # Errors
///
/// Returns [`ThreadlineError::Config`] if the level is not a valid filter
/// directive or a global subscriber is already installed.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| ThreadlineError::Config(format!("invalid log level: {e}")))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ThreadlineError::Config(format!("tracing already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_error() {
        let config = GeneralConfig::default();
        // Only the second call is guaranteed to fail.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
