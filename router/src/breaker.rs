// Per-pair price-anomaly circuit breaker
// Tracks recent prices per trading pair and rejects quotes whose price
// deviates from the rolling mean beyond a threshold. Five consecutive
// deviations open the pair; an open pair auto-recovers through a half-open
// probe after thirty seconds. A startup caution window halves the threshold.
//
// All state lives behind a single mutex per breaker instance. Persistence is
// decoupled from the hot path: every price append pushes a snapshot into a
// bounded channel via try_send, and a full or closed channel drops the
// snapshot. In-memory state is authoritative.

use crate::errors::RouterError;
use crate::metrics;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Prices retained per pair for the rolling mean.
pub const MAX_RECENT_PRICES: usize = 100;

/// Consecutive out-of-threshold checks before a pair opens.
pub const FAILURE_LIMIT: u32 = 5;

/// How long an open pair rejects before the next check probes half-open.
pub const RECOVERY_WINDOW: Duration = Duration::from_secs(30);

/// Default startup caution window during which the threshold is halved.
pub const DEFAULT_CAUTION_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn gauge_value(self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Read-only copy of a pair's state, emitted on every price append for
/// external persistence.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub pair: String,
    pub state: BreakerState,
    pub failures: u32,
    pub recent_prices: Vec<Decimal>,
    pub last_trade_ts: Option<DateTime<Utc>>,
}

struct PairState {
    recent_prices: VecDeque<Decimal>,
    last_trade_ts: Option<DateTime<Utc>>,
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
}

impl PairState {
    fn new() -> Self {
        Self {
            recent_prices: VecDeque::with_capacity(MAX_RECENT_PRICES),
            last_trade_ts: None,
            state: BreakerState::Closed,
            failures: 0,
            opened_at: None,
        }
    }

    fn snapshot(&self, pair: &str) -> BreakerSnapshot {
        BreakerSnapshot {
            pair: pair.to_string(),
            state: self.state,
            failures: self.failures,
            recent_prices: self.recent_prices.iter().copied().collect(),
            last_trade_ts: self.last_trade_ts,
        }
    }
}

struct Inner {
    states: HashMap<String, PairState>,
    caution_until: Option<Instant>,
    persist: Option<mpsc::Sender<BreakerSnapshot>>,
    dropped_snapshots: u64,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: Decimal,
}

impl CircuitBreaker {
    /// Create a breaker with the given base deviation threshold (0.05 = 5%)
    /// and the default startup caution window.
    pub fn new(threshold: Decimal) -> Self {
        let cb = Self {
            inner: Mutex::new(Inner {
                states: HashMap::new(),
                caution_until: None,
                persist: None,
                dropped_snapshots: 0,
            }),
            threshold,
        };
        cb.enable_caution(DEFAULT_CAUTION_WINDOW);
        cb
    }

    /// Halve the effective threshold for `window` from now.
    pub fn enable_caution(&self, window: Duration) {
        let mut inner = self.lock();
        inner.caution_until = Some(Instant::now() + window);
    }

    pub fn disable_caution(&self) {
        let mut inner = self.lock();
        inner.caution_until = None;
    }

    /// Install the persistence channel. Snapshots are pushed with `try_send`
    /// on every price append; overflow drops the snapshot and counts it.
    pub fn set_persist_channel(&self, tx: mpsc::Sender<BreakerSnapshot>) {
        let mut inner = self.lock();
        inner.persist = Some(tx);
    }

    /// Evaluate `price` for `pair` against the rolling mean and run the state
    /// machine. An out-of-threshold price is rejected even while the pair is
    /// still closed; only in-threshold prices are appended to the history.
    pub fn check_price(&self, pair: &str, price: Decimal) -> Result<(), RouterError> {
        let mut inner = self.lock();
        let caution = inner
            .caution_until
            .is_some_and(|until| Instant::now() < until);
        let persist = inner.persist.clone();

        let state = inner
            .states
            .entry(pair.to_string())
            .or_insert_with(PairState::new);

        if state.state == BreakerState::Open {
            let elapsed = state
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed > RECOVERY_WINDOW {
                state.state = BreakerState::HalfOpen;
                state.failures = 0;
                metrics::CIRCUIT_BREAKER_STATE
                    .with_label_values(&[pair])
                    .set(state.state.gauge_value());
            } else {
                return Err(RouterError::CircuitBreakerOpen);
            }
        }

        let mut threshold = self.threshold;
        if caution {
            threshold /= Decimal::TWO;
        }

        if state.recent_prices.is_empty() {
            let snapshot = record_price(state, pair, price);
            drop(inner);
            self.persist_snapshot(persist, snapshot);
            return Ok(());
        }

        let mean = mean_price(&state.recent_prices);
        let deviation = ((price - mean) / mean).abs();

        if deviation > threshold {
            state.failures += 1;
            if state.failures >= FAILURE_LIMIT {
                state.state = BreakerState::Open;
                state.opened_at = Some(Instant::now());
                metrics::CIRCUIT_BREAKER_STATE
                    .with_label_values(&[pair])
                    .set(state.state.gauge_value());
                debug!(pair = %pair, failures = state.failures, "circuit opened");
            }
            return Err(RouterError::CircuitBreakerOpen);
        }

        if state.state == BreakerState::HalfOpen {
            state.state = BreakerState::Closed;
            state.failures = 0;
            metrics::CIRCUIT_BREAKER_STATE
                .with_label_values(&[pair])
                .set(state.state.gauge_value());
        }

        let snapshot = record_price(state, pair, price);
        drop(inner);
        self.persist_snapshot(persist, snapshot);
        Ok(())
    }

    /// Append an executed trade price without running the state machine.
    pub fn record_trade(&self, pair: &str, price: Decimal) {
        let mut inner = self.lock();
        let persist = inner.persist.clone();

        let state = inner
            .states
            .entry(pair.to_string())
            .or_insert_with(PairState::new);
        state.last_trade_ts = Some(Utc::now());
        let snapshot = record_price(state, pair, price);
        drop(inner);
        self.persist_snapshot(persist, snapshot);
    }

    /// Current state of a pair; pairs never observed report closed.
    pub fn state(&self, pair: &str) -> BreakerState {
        let inner = self.lock();
        inner
            .states
            .get(pair)
            .map(|s| s.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Snapshots dropped because the persistence channel was full or closed.
    pub fn dropped_snapshots(&self) -> u64 {
        self.lock().dropped_snapshots
    }

    fn persist_snapshot(
        &self,
        persist: Option<mpsc::Sender<BreakerSnapshot>>,
        snapshot: BreakerSnapshot,
    ) {
        let Some(tx) = persist else {
            return;
        };
        if tx.try_send(snapshot).is_err() {
            let mut inner = self.lock();
            inner.dropped_snapshots += 1;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("breaker lock poisoned")
    }

    #[cfg(test)]
    pub(crate) fn rewind_opened_at(&self, pair: &str, by: Duration) {
        let mut inner = self.lock();
        if let Some(state) = inner.states.get_mut(pair) {
            state.opened_at = Instant::now().checked_sub(by);
        }
    }
}

fn record_price(state: &mut PairState, pair: &str, price: Decimal) -> BreakerSnapshot {
    state.recent_prices.push_back(price);
    while state.recent_prices.len() > MAX_RECENT_PRICES {
        state.recent_prices.pop_front();
    }
    state.snapshot(pair)
}

fn mean_price(prices: &VecDeque<Decimal>) -> Decimal {
    let sum: Decimal = prices.iter().copied().sum();
    sum / Decimal::from(prices.len())
}
