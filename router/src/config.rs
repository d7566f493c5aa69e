// Configuration management
// Settings come from the environment (double-underscore separator) on top of
// programmatic defaults, e.g. `ROUTER_BPS=25 BIND_ADDR=127.0.0.1:9090`.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listen address for the partner HTTP API.
    pub bind_addr: String,
    /// Router commission applied to every quote, in basis points.
    pub router_bps: i32,
    /// Base circuit-breaker deviation threshold (0.05 = 5%).
    pub breaker_threshold: f64,
    /// Startup caution window in seconds; 0 disables it.
    pub breaker_caution_secs: u64,
    /// Process-wide KV byte budget.
    pub kv_max_bytes: i64,
    /// JSON snapshot of pools and offers to serve quotes from.
    pub snapshot_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:8080")?
            .set_default("router_bps", 20)?
            .set_default("breaker_threshold", 0.05)?
            .set_default("breaker_caution_secs", 60)?
            .set_default("kv_max_bytes", 512i64 * 1024 * 1024)?
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn breaker_threshold_decimal(&self) -> Result<Decimal> {
        Decimal::from_f64(self.breaker_threshold)
            .filter(|t| *t > Decimal::ZERO)
            .with_context(|| {
                format!(
                    "breaker threshold must be a positive finite number, got {}",
                    self.breaker_threshold
                )
            })
    }
}
