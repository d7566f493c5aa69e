// Quote engine
// Orchestrates validation, pathfinding, fee composition, price-impact
// calculation, circuit-breaker interrogation, and quote-hash generation.
// Stateless across requests; aborts on the first failure with no observable
// state changed, and performs no I/O in the critical path.

use crate::breaker::CircuitBreaker;
use crate::errors::RouterError;
use crate::hash::compute_quote_hash;
use crate::kv::MemoryStore;
use crate::pathfinder::Pathfinder;
use crate::types::{Fees, HopKind, QuoteRequest, QuoteResponse, Route};
use crate::validator::Validator;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Ledger validity window stamped into every quote.
pub const TTL_LEDGERS: u16 = 100;

pub struct QuoteEngine {
    validator: Validator,
    pathfinder: Arc<Pathfinder>,
    breaker: Arc<CircuitBreaker>,
    kv: Arc<MemoryStore>,
    router_bps: i32,
}

impl QuoteEngine {
    pub fn new(
        validator: Validator,
        pathfinder: Arc<Pathfinder>,
        breaker: Arc<CircuitBreaker>,
        kv: Arc<MemoryStore>,
        router_bps: i32,
    ) -> Self {
        Self {
            validator,
            pathfinder,
            breaker,
            kv,
            router_bps,
        }
    }

    pub fn pathfinder(&self) -> &Arc<Pathfinder> {
        &self.pathfinder
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The shared KV store. The engine never touches it while generating a
    /// quote; caching is the caller's concern.
    pub fn kv(&self) -> &Arc<MemoryStore> {
        &self.kv
    }

    pub fn generate_quote(
        &self,
        req: &QuoteRequest,
        ledger_index: u32,
    ) -> Result<QuoteResponse, RouterError> {
        self.validator.validate(req)?;

        let mut route = self
            .pathfinder
            .find_best_route(&req.input, &req.output, req.amount)?;

        let mut fees = compose_fees(&route);
        fees.router_bps = self.router_bps;

        // The route is non-empty by construction.
        let final_out = route.hops[route.hops.len() - 1].amount_out;
        let price = final_out / req.amount;
        route.price_impact = price_impact(&route, req.amount);

        let pair = format!("{}-{}", req.input.canonical(), req.output.canonical());
        self.breaker.check_price(&pair, price)?;

        let ttl = TTL_LEDGERS;
        let quote_hash = compute_quote_hash(req, &fees, ledger_index, ttl);

        Ok(QuoteResponse {
            route,
            out: final_out,
            price,
            fees,
            ledger_index,
            quote_hash,
            ttl_ledgers: ttl,
        })
    }
}

/// Per-hop fraction `(amount_in - amount_out) / amount_in`, summed across
/// AMM hops. Order-book hops trade at their posted quality and contribute
/// nothing. The fraction is unit-relative to each hop's input side.
fn compose_fees(route: &Route) -> Fees {
    let mut trading_fees = Decimal::ZERO;
    for hop in &route.hops {
        if hop.kind == HopKind::Amm {
            trading_fees += (hop.amount_in - hop.amount_out) / hop.amount_in;
        }
    }

    Fees {
        router_bps: 0,
        trading_fees,
        est_out_fee: Decimal::ZERO,
    }
}

/// `|1 - final_out / amount_in|`. Only meaningful for same-scale assets; for
/// pairs quoted far from parity it measures distance from a 1:1 conversion.
fn price_impact(route: &Route, amount_in: Decimal) -> Decimal {
    let Some(last) = route.hops.last() else {
        return Decimal::ZERO;
    };
    if amount_in.is_zero() {
        return Decimal::ZERO;
    }
    (Decimal::ONE - last.amount_out / amount_in).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AmmPool, Asset};
    use rust_decimal_macros::dec;

    const ISSUER: &str = "rvYAfWj5gh67oV6fW32ZzP3Aw4Eubs59B";

    fn engine_with_pool() -> QuoteEngine {
        let pools = vec![AmmPool {
            asset1: Asset::native(),
            asset2: Asset::issued("USD", ISSUER),
            asset1_reserve: dec!(10000),
            asset2_reserve: dec!(15000),
            trading_fee_bps: 30,
        }];
        let breaker = CircuitBreaker::new(dec!(0.05));
        breaker.disable_caution();
        QuoteEngine::new(
            Validator::new(),
            Arc::new(Pathfinder::new(pools, vec![])),
            Arc::new(breaker),
            Arc::new(MemoryStore::new()),
            20,
        )
    }

    fn request(amount: Decimal) -> QuoteRequest {
        QuoteRequest {
            input: Asset::native(),
            output: Asset::issued("USD", ISSUER),
            amount,
        }
    }

    #[test]
    fn generates_direct_quote() {
        let engine = engine_with_pool();
        let quote = engine.generate_quote(&request(dec!(100)), 12345).unwrap();

        assert_eq!(quote.route.hops.len(), 1);
        assert_eq!(quote.fees.router_bps, 20);
        assert_eq!(quote.fees.est_out_fee, Decimal::ZERO);
        assert_eq!(quote.ledger_index, 12345);
        assert_eq!(quote.ttl_ledgers, TTL_LEDGERS);
        assert_eq!(quote.out, quote.route.hops[0].amount_out);
        assert_eq!(quote.price, quote.out / dec!(100));

        let hop = &quote.route.hops[0];
        let expected_fee = (hop.amount_in - hop.amount_out) / hop.amount_in;
        assert_eq!(quote.fees.trading_fees, expected_fee);
    }

    #[test]
    fn rejects_invalid_request_before_routing() {
        let engine = engine_with_pool();
        let err = engine.generate_quote(&request(Decimal::ZERO), 1).unwrap_err();
        assert_eq!(err, RouterError::InvalidAmount);
    }

    #[test]
    fn surfaces_no_route() {
        let engine = engine_with_pool();
        let req = QuoteRequest {
            input: Asset::native(),
            output: Asset::issued("EUR", "rhub8VRN55s94qWKDv6jmDy1pUykJzF3wq"),
            amount: dec!(100),
        };
        assert_eq!(engine.generate_quote(&req, 1), Err(RouterError::NoRoute));
    }

    #[test]
    fn breaker_rejection_surfaces() {
        let engine = engine_with_pool();
        let pair = format!("XRP-USD.{ISSUER}");
        // Prime the pair far away from the route's execution price (~1.48).
        for _ in 0..10 {
            engine.breaker().record_trade(&pair, dec!(10.0));
        }

        let err = engine.generate_quote(&request(dec!(100)), 1).unwrap_err();
        assert_eq!(err, RouterError::CircuitBreakerOpen);
    }

    #[test]
    fn hash_is_stable_for_identical_requests() {
        let engine = engine_with_pool();
        let a = engine.generate_quote(&request(dec!(100)), 12345).unwrap();
        let b = engine.generate_quote(&request(dec!(100)), 12345).unwrap();
        assert_eq!(a.quote_hash, b.quote_hash);

        let c = engine.generate_quote(&request(dec!(101)), 12345).unwrap();
        assert_ne!(a.quote_hash, c.quote_hash);
    }

    #[test]
    fn price_impact_reflects_distance_from_parity() {
        let engine = engine_with_pool();
        let quote = engine.generate_quote(&request(dec!(100)), 1).unwrap();
        assert_eq!(quote.route.price_impact, (Decimal::ONE - quote.price).abs());
    }
}
