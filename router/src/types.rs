// Core data model shared across the quote engine
// Assets, pools, offers, routes, fees, and the quote request/response pair.
// All monetary values are arbitrary-precision decimals; floats never touch
// anything that feeds the quote hash.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency code of the native asset. The native asset carries no issuer.
pub const NATIVE_CURRENCY: &str = "XRP";

/// A currency/issuer pair. The native asset is the fixed currency token with
/// an empty issuer; every other asset must name its issuing account.
///
/// Two assets are equal iff their canonical strings are equal, which the
/// derived `PartialEq` honors because the canonical form is a pure function
/// of the two fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub currency: String,
    #[serde(default)]
    pub issuer: String,
}

impl Asset {
    pub fn native() -> Self {
        Self {
            currency: NATIVE_CURRENCY.to_string(),
            issuer: String::new(),
        }
    }

    pub fn issued(currency: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            issuer: issuer.into(),
        }
    }

    /// Parse the canonical form back into an asset. Everything after the
    /// first `.` is the issuer.
    pub fn parse(s: &str) -> Self {
        match s.split_once('.') {
            Some((currency, issuer)) => Self {
                currency: currency.to_string(),
                issuer: issuer.to_string(),
            },
            None => Self {
                currency: s.to_string(),
                issuer: String::new(),
            },
        }
    }

    pub fn is_native(&self) -> bool {
        self.currency == NATIVE_CURRENCY && self.issuer.is_empty()
    }

    /// Canonical string form: `currency` when the issuer is empty, otherwise
    /// `currency.issuer`.
    pub fn canonical(&self) -> String {
        if self.issuer.is_empty() {
            self.currency.clone()
        } else {
            format!("{}.{}", self.currency, self.issuer)
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issuer.is_empty() {
            write!(f, "{}", self.currency)
        } else {
            write!(f, "{}.{}", self.currency, self.issuer)
        }
    }
}

/// A partner quote request: convert `amount` of `input` into `output`.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input: Asset,
    pub output: Asset,
    pub amount: Decimal,
}

/// One step of an execution route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopKind {
    Amm,
    Orderbook,
}

impl fmt::Display for HopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopKind::Amm => write!(f, "amm"),
            HopKind::Orderbook => write!(f, "orderbook"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub kind: HopKind,
    pub in_asset: Asset,
    pub out_asset: Asset,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
}

/// Ordered hop sequence from the request's input asset to its output asset,
/// with the aggregate price impact filled in by the quote engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub hops: Vec<Hop>,
    pub price_impact: Decimal,
}

/// Fee breakdown attached to a quote. `trading_fees` is the sum across AMM
/// hops of `(amount_in - amount_out) / amount_in`; `est_out_fee` is reserved
/// for downstream settlement fees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fees {
    pub router_bps: i32,
    pub trading_fees: Decimal,
    pub est_out_fee: Decimal,
}

/// A signed, tamper-evident quote bound to a specific ledger snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResponse {
    pub route: Route,
    pub out: Decimal,
    pub price: Decimal,
    pub fees: Fees,
    pub ledger_index: u32,
    pub quote_hash: [u8; 32],
    pub ttl_ledgers: u16,
}

/// Constant-product AMM pool snapshot. Bidirectional: a route may traverse
/// `asset1 -> asset2` or the reverse.
#[derive(Debug, Clone, Deserialize)]
pub struct AmmPool {
    pub asset1: Asset,
    pub asset2: Asset,
    pub asset1_reserve: Decimal,
    pub asset2_reserve: Decimal,
    pub trading_fee_bps: u32,
}

/// Posted order-book offer. One-directional: `taker_pays -> taker_gets` at
/// the fixed `quality` output-per-input rate.
#[derive(Debug, Clone, Deserialize)]
pub struct Offer {
    pub taker_pays: Asset,
    pub taker_gets: Asset,
    pub quality: Decimal,
}

/// A tradable pair derived from the snapshot, as listed by the pairs endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PairInfo {
    pub input: String,
    pub output: String,
    pub liquidity: Decimal,
    pub venues: usize,
}
