//! `tracing` subscriber setup for binaries and tools.

use tracing_subscriber::EnvFilter;

use crate::EngineError;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence; `default_filter` applies when it is unset or
/// unparsable. Fails if the filter is invalid or a subscriber is already set.
pub fn init_tracing(default_filter: &str) -> Result<(), EngineError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| EngineError::Logging {
            details: format!("bad filter {default_filter:?}: {e}"),
        })?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| EngineError::Logging { details: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails_instead_of_panicking() {
        let _ = init_tracing("warn");
        assert!(matches!(init_tracing("warn"), Err(EngineError::Logging { .. })));
    }
}
