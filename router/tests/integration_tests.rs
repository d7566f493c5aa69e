// End-to-end quote flow over a fixture snapshot: request validation,
// pathfinding, fee composition, breaker interrogation, hashing, caching,
// and the partner wire shape.

use chrono::{TimeZone, Utc};
use lucendex_router::api::build_quote_body;
use lucendex_router::breaker::CircuitBreaker;
use lucendex_router::errors::RouterError;
use lucendex_router::kv::MemoryStore;
use lucendex_router::pathfinder::Pathfinder;
use lucendex_router::quote::QuoteEngine;
use lucendex_router::router::Router;
use lucendex_router::types::{AmmPool, Asset, HopKind, Offer, QuoteRequest, Route};
use lucendex_router::validator::Validator;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const USD_ISSUER: &str = "rvYAfWj5gh67oV6fW32ZzP3Aw4Eubs59B";
const BTC_ISSUER: &str = "rhub8VRN55s94qWKDv6jmDy1pUykJzF3wq";

fn fixture_pools() -> Vec<AmmPool> {
    vec![
        AmmPool {
            asset1: Asset::native(),
            asset2: Asset::issued("USD", USD_ISSUER),
            asset1_reserve: dec!(10000),
            asset2_reserve: dec!(15000),
            trading_fee_bps: 30,
        },
        AmmPool {
            asset1: Asset::native(),
            asset2: Asset::issued("BTC", BTC_ISSUER),
            asset1_reserve: dec!(10000),
            asset2_reserve: dec!(100),
            trading_fee_bps: 30,
        },
        AmmPool {
            asset1: Asset::issued("BTC", BTC_ISSUER),
            asset2: Asset::issued("EUR", USD_ISSUER),
            asset1_reserve: dec!(100),
            asset2_reserve: dec!(3000000),
            trading_fee_bps: 30,
        },
    ]
}

fn fixture_offers() -> Vec<Offer> {
    // GBP is reachable only through this offer; no pool covers it.
    vec![Offer {
        taker_pays: Asset::issued("USD", USD_ISSUER),
        taker_gets: Asset::issued("GBP", BTC_ISSUER),
        quality: dec!(0.75),
    }]
}

fn build_router() -> Router {
    let breaker = CircuitBreaker::new(dec!(0.05));
    breaker.disable_caution();
    Router::new(QuoteEngine::new(
        Validator::new(),
        Arc::new(Pathfinder::new(fixture_pools(), fixture_offers())),
        Arc::new(breaker),
        Arc::new(MemoryStore::new()),
        20,
    ))
}

fn quote_request(output: Asset, amount: Decimal) -> QuoteRequest {
    QuoteRequest {
        input: Asset::native(),
        output,
        amount,
    }
}

#[test]
fn direct_amm_quote_flow() {
    let router = build_router();
    router.set_current_ledger_index(84_000_123);

    let req = quote_request(Asset::issued("USD", USD_ISSUER), dec!(100));
    let quote = router.quote(&req, router.current_ledger_index()).unwrap();

    assert_eq!(quote.route.hops.len(), 1);
    assert_eq!(quote.route.hops[0].kind, HopKind::Amm);
    assert!(quote.out > dec!(148.0) && quote.out < dec!(148.2));
    assert_eq!(quote.fees.router_bps, 20);
    assert_eq!(quote.ledger_index, 84_000_123);
    assert_eq!(quote.ttl_ledgers, 100);

    // The route was cached under its hash with the quote's TTL.
    let cached = router.cached_route(&quote.quote_hash).expect("cached route");
    let route: Route = serde_json::from_slice(&cached).unwrap();
    assert_eq!(route.hops.len(), 1);
}

#[test]
fn two_hop_quote_flow() {
    let router = build_router();
    let req = quote_request(Asset::issued("EUR", USD_ISSUER), dec!(100));
    let quote = router.quote(&req, 1).unwrap();

    assert_eq!(quote.route.hops.len(), 2);
    assert_eq!(quote.route.hops[0].in_asset, Asset::native());
    assert_eq!(
        quote.route.hops[0].out_asset,
        quote.route.hops[1].in_asset
    );
    assert_eq!(
        quote.route.hops[1].out_asset,
        Asset::issued("EUR", USD_ISSUER)
    );

    // Fees accumulate across both AMM hops, each relative to its own input.
    let expected: Decimal = quote
        .route
        .hops
        .iter()
        .map(|h| (h.amount_in - h.amount_out) / h.amount_in)
        .sum();
    assert_eq!(quote.fees.trading_fees, expected);
}

#[test]
fn rejection_surface() {
    let router = build_router();

    let no_route = quote_request(Asset::issued("JPY", BTC_ISSUER), dec!(100));
    assert_eq!(router.quote(&no_route, 1), Err(RouterError::NoRoute));

    let bad_amount = quote_request(Asset::issued("USD", USD_ISSUER), dec!(0));
    assert_eq!(router.quote(&bad_amount, 1), Err(RouterError::InvalidAmount));

    let same = QuoteRequest {
        input: Asset::native(),
        output: Asset::native(),
        amount: dec!(1),
    };
    assert_eq!(router.quote(&same, 1), Err(RouterError::SameAssets));
}

#[test]
fn hash_identical_across_engine_instances() {
    let req = quote_request(Asset::issued("USD", USD_ISSUER), dec!(100));

    let first = build_router().quote(&req, 12345).unwrap();
    let second = build_router().quote(&req, 12345).unwrap();
    assert_eq!(first.quote_hash, second.quote_hash);

    let other_ledger = build_router().quote(&req, 12346).unwrap();
    assert_ne!(first.quote_hash, other_ledger.quote_hash);
}

#[test]
fn breaker_trips_on_anomalous_execution_price() {
    let router = build_router();
    let pair = format!("XRP-USD.{USD_ISSUER}");

    // The route prices this pair around 1.48; prime the breaker far away so
    // every quote attempt counts as a deviation, then exhaust the failure
    // budget.
    for _ in 0..10 {
        router.engine().breaker().record_trade(&pair, dec!(10.0));
    }

    let req = quote_request(Asset::issued("USD", USD_ISSUER), dec!(100));
    for _ in 0..5 {
        assert_eq!(
            router.quote(&req, 1),
            Err(RouterError::CircuitBreakerOpen)
        );
    }
    assert_eq!(
        router.engine().breaker().state(&pair).to_string(),
        "open"
    );

    // Other pairs are unaffected.
    let other = quote_request(Asset::issued("BTC", BTC_ISSUER), dec!(10));
    assert!(router.quote(&other, 1).is_ok());
}

#[test]
fn orderbook_hop_uses_posted_quality() {
    let router = build_router();
    let req = QuoteRequest {
        input: Asset::issued("USD", USD_ISSUER),
        output: Asset::issued("GBP", BTC_ISSUER),
        amount: dec!(100),
    };

    let quote = router.quote(&req, 1).unwrap();
    assert_eq!(quote.route.hops.len(), 1);
    assert_eq!(quote.route.hops[0].kind, HopKind::Orderbook);
    // Output is exactly linear in the input at the posted quality.
    assert_eq!(quote.out, dec!(75.00));
    // Order-book hops contribute no trading fee.
    assert_eq!(quote.fees.trading_fees, Decimal::ZERO);
}

#[test]
fn wire_shape_matches_contract() {
    let router = build_router();
    let req = quote_request(Asset::issued("USD", USD_ISSUER), dec!(100));
    let quote = router.quote(&req, 7).unwrap();

    let expires = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
    let body = build_quote_body(&quote, expires);
    let json = serde_json::to_value(&body).unwrap();

    for field in ["quote_hash", "amount_out", "price", "expires_at"] {
        assert!(json[field].is_string(), "{field} must be a string");
    }
    assert_eq!(json["route"]["hops"][0]["type"], "amm");
    assert_eq!(json["route"]["hops"][0]["in"], "XRP");
    assert_eq!(
        json["route"]["hops"][0]["out"],
        format!("USD.{USD_ISSUER}")
    );
    assert_eq!(json["ledger_index"], 7);
    assert_eq!(json["expires_at"], "2026-08-02T12:00:00Z");
}
