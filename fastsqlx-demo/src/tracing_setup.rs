//! Tracing setup for the demo server
//!
//! Usage:
//!   fastsqlx-demo --debug serve                  # session and pagination logs
//!   RUST_LOG=sqlx=debug fastsqlx-demo serve      # statement logs from sqlx

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Quiet by default: our crates and request traces at info, sqlx at warn.
const DEFAULT_FILTER: &str = "fastsqlx=info,fastsqlx_demo=info,tower_http=info,sqlx=warn";

/// Session commit/rollback and pagination details are logged at debug.
const DEBUG_FILTER: &str = "fastsqlx=debug,fastsqlx_demo=debug,tower_http=debug,sqlx=info";

#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub debug: bool,
}

impl TracingConfig {
    /// `RUST_LOG` wins over the built-in directives.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }

    fn directives(&self) -> &'static str {
        if self.debug {
            DEBUG_FILTER
        } else {
            DEFAULT_FILTER
        }
    }
}

/// Install a compact console subscriber; targets are shown with `--debug`.
pub fn init(config: &TracingConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.debug)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
