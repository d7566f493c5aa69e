// Ledger snapshot input
// Pools and offers are produced by an external indexer and handed to the
// pathfinder as an immutable snapshot; this module loads and sanity-checks
// the JSON form. Reserves and qualities are decimal strings.

use crate::types::{AmmPool, Offer};
use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    pub ledger_index: u32,
    #[serde(default)]
    pub pools: Vec<AmmPool>,
    #[serde(default)]
    pub offers: Vec<Offer>,
}

impl Snapshot {
    pub fn validate(&self) -> Result<()> {
        for (i, pool) in self.pools.iter().enumerate() {
            ensure!(
                pool.asset1.canonical() != pool.asset2.canonical(),
                "pool {i}: both sides are {}",
                pool.asset1.canonical()
            );
            ensure!(
                pool.asset1_reserve > Decimal::ZERO && pool.asset2_reserve > Decimal::ZERO,
                "pool {i}: reserves must be strictly positive"
            );
            ensure!(
                pool.trading_fee_bps <= 10_000,
                "pool {i}: trading fee {} bps exceeds 10000",
                pool.trading_fee_bps
            );
        }

        for (i, offer) in self.offers.iter().enumerate() {
            ensure!(
                offer.quality > Decimal::ZERO,
                "offer {i}: quality must be strictly positive"
            );
        }

        Ok(())
    }
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let raw = std::fs::read(path)
        .with_context(|| format!("read snapshot file {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_slice(&raw)
        .with_context(|| format!("parse snapshot file {}", path.display()))?;
    snapshot
        .validate()
        .with_context(|| format!("validate snapshot file {}", path.display()))?;
    Ok(snapshot)
}
