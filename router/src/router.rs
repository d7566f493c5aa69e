// Service facade over the quote engine
// Wraps quote generation with audit logging, outcome metrics, quote caching,
// and the current ledger cursor. The relational audit store lives outside
// this process; the audit record is emitted as a structured log event.

use crate::errors::RouterError;
use crate::kv::MemoryStore;
use crate::metrics;
use crate::quote::QuoteEngine;
use crate::types::{PairInfo, QuoteRequest, QuoteResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Seconds of wall time one ledger close is assumed to take; quote TTLs are
/// expressed in ledgers and converted with this factor.
pub const SECONDS_PER_LEDGER: u64 = 4;

/// Cursor staleness, in ledgers, beyond which health degrades.
pub const DEGRADED_LAG_LEDGERS: i64 = 10;

/// Cursor staleness, in ledgers, beyond which the service reports down.
pub const DOWN_LAG_LEDGERS: i64 = 50;

pub struct Router {
    engine: QuoteEngine,
    current_ledger: RwLock<u32>,
    cursor_updated_at: RwLock<Instant>,
    stopped: AtomicBool,
}

impl Router {
    pub fn new(engine: QuoteEngine) -> Self {
        Self {
            engine,
            current_ledger: RwLock::new(0),
            cursor_updated_at: RwLock::new(Instant::now()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &QuoteEngine {
        &self.engine
    }

    pub fn kv(&self) -> &Arc<MemoryStore> {
        self.engine.kv()
    }

    /// Generate a quote, record the audit event and metrics, and cache the
    /// successful route under its hash for later attribution.
    pub fn quote(
        &self,
        req: &QuoteRequest,
        ledger_index: u32,
    ) -> Result<QuoteResponse, RouterError> {
        let start = Instant::now();
        let result = self.engine.generate_quote(req, ledger_index);
        let duration_ms = start.elapsed().as_millis() as f64;

        let pair = format!("{}-{}", req.input.canonical(), req.output.canonical());
        let outcome = if result.is_ok() { "success" } else { "rejected" };
        metrics::QUOTES_TOTAL.with_label_values(&[outcome]).inc();
        metrics::QUOTE_LATENCY
            .with_label_values(&[outcome])
            .observe(duration_ms);

        match &result {
            Ok(quote) => {
                info!(
                    event = "quote_request",
                    pair = %pair,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    ledger_index = ledger_index,
                    "quote generated"
                );
                self.cache_quote(quote);
            }
            Err(err) => {
                warn!(
                    event = "quote_request",
                    pair = %pair,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    error_code = err.code(),
                    "quote rejected"
                );
            }
        }

        result
    }

    // A cache failure never fails the quote; the response is already signed.
    fn cache_quote(&self, quote: &QuoteResponse) {
        let route_json = match serde_json::to_vec(&quote.route) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "serialize route for quote cache");
                return;
            }
        };
        let ttl = Duration::from_secs(u64::from(quote.ttl_ledgers) * SECONDS_PER_LEDGER);
        if let Err(err) = self.kv().set_quote(&quote.quote_hash, &route_json, ttl) {
            warn!(error = %err, "cache quote route");
        }
    }

    /// Fetch a previously generated route by quote hash.
    pub fn cached_route(&self, hash: &[u8; 32]) -> Option<Vec<u8>> {
        let cached = self.kv().get_quote(hash);
        if cached.is_some() {
            metrics::CACHE_HITS.inc();
        } else {
            metrics::CACHE_MISSES.inc();
        }
        cached
    }

    pub fn current_ledger_index(&self) -> u32 {
        *self.current_ledger.read().expect("ledger cursor lock")
    }

    /// Advance the ledger cursor, mirroring it into the KV system namespace
    /// so adjacent subsystems observe the same cursor.
    pub fn set_current_ledger_index(&self, idx: u32) {
        *self.current_ledger.write().expect("ledger cursor lock") = idx;
        *self.cursor_updated_at.write().expect("ledger cursor lock") = Instant::now();
        if let Err(err) = self.kv().set_ledger_index(idx) {
            warn!(error = %err, ledger_index = idx, "persist ledger cursor");
        }
    }

    /// How far behind the indexer is, in ledgers, estimated from the wall
    /// time since the cursor last advanced.
    pub fn indexer_lag_ledgers(&self) -> i64 {
        let updated_at = *self.cursor_updated_at.read().expect("ledger cursor lock");
        (updated_at.elapsed().as_secs() / SECONDS_PER_LEDGER) as i64
    }

    /// Service health derived from cursor freshness: `ok`, `degraded` past
    /// ten ledgers of staleness, `down` past fifty.
    pub fn health_status(&self) -> (&'static str, i64) {
        let lag = self.indexer_lag_ledgers();
        let status = if lag > DOWN_LAG_LEDGERS {
            "down"
        } else if lag > DEGRADED_LAG_LEDGERS {
            "degraded"
        } else {
            "ok"
        };
        (status, lag)
    }

    #[cfg(test)]
    pub(crate) fn rewind_cursor_updated_at(&self, by: Duration) {
        if let Some(then) = Instant::now().checked_sub(by) {
            *self.cursor_updated_at.write().expect("ledger cursor lock") = then;
        }
    }

    /// Tradable pairs derived from the snapshot: each pool contributes both
    /// directions with its input-side reserve as liquidity, each offer one
    /// direction. Sorted for stable output.
    pub fn available_pairs(&self) -> Vec<PairInfo> {
        let pathfinder = self.engine.pathfinder();
        let mut pairs: HashMap<(String, String), PairInfo> = HashMap::new();

        let mut add = |input: String, output: String, liquidity| {
            let entry = pairs
                .entry((input.clone(), output.clone()))
                .or_insert_with(|| PairInfo {
                    input,
                    output,
                    liquidity: rust_decimal::Decimal::ZERO,
                    venues: 0,
                });
            entry.liquidity += liquidity;
            entry.venues += 1;
        };

        for pool in pathfinder.pools() {
            let a1 = pool.asset1.canonical();
            let a2 = pool.asset2.canonical();
            add(a1.clone(), a2.clone(), pool.asset1_reserve);
            add(a2, a1, pool.asset2_reserve);
        }
        for offer in pathfinder.offers() {
            add(
                offer.taker_pays.canonical(),
                offer.taker_gets.canonical(),
                rust_decimal::Decimal::ZERO,
            );
        }

        let mut list: Vec<PairInfo> = pairs.into_values().collect();
        list.sort_by(|a, b| (&a.input, &a.output).cmp(&(&b.input, &b.output)));
        list
    }

    /// Idempotent shutdown; stops the KV background sweep.
    pub fn close(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.kv().close();
    }
}
