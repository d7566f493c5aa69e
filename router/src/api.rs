// Partner HTTP API
// Quote, pairs, health, and metrics endpoints over axum. Request signing,
// authentication, and per-partner rate limiting live in middleware outside
// this crate; handlers consume the request body as-is.

use crate::errors::RouterError;
use crate::metrics;
use crate::router::{Router, SECONDS_PER_LEDGER};
use crate::types::{Asset, QuoteRequest, QuoteResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
}

pub fn create_api_router(router: Arc<Router>) -> AxumRouter {
    AxumRouter::new()
        .route("/partner/v1/quote", post(quote_handler))
        .route("/partner/v1/pairs", get(pairs_handler))
        .route("/partner/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(AppState { router })
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequestBody {
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "out")]
    pub output: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct HopBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "out")]
    pub output: String,
    pub amount_in: String,
    pub amount_out: String,
}

#[derive(Debug, Serialize)]
pub struct RouteBody {
    pub hops: Vec<HopBody>,
    pub price_impact: String,
}

#[derive(Debug, Serialize)]
pub struct FeesBody {
    pub router_bps: i32,
    pub trading_fees: String,
    pub est_out_fee: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteBody {
    pub quote_hash: String,
    pub route: RouteBody,
    pub amount_out: String,
    pub price: String,
    pub fees: FeesBody,
    pub ledger_index: u32,
    pub ttl_ledgers: u16,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct PairBody {
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "out")]
    pub output: String,
    pub liquidity: String,
    pub venues: usize,
}

#[derive(Debug, Serialize)]
pub struct PairsBody {
    pub pairs: Vec<PairBody>,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: String,
    pub indexer_lag: i64,
    pub last_ledger_index: u32,
    pub quote_cache_hits: u64,
    pub quote_cache_misses: u64,
    pub kv_bytes: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: msg.into() }),
    )
}

fn router_error(err: RouterError) -> ApiError {
    let status = match err {
        RouterError::CircuitBreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

async fn quote_handler(
    State(state): State<AppState>,
    Json(body): Json<QuoteRequestBody>,
) -> Result<Json<QuoteBody>, ApiError> {
    if body.input.is_empty() || body.output.is_empty() || body.amount.is_empty() {
        return Err(bad_request("missing required fields"));
    }

    let amount =
        Decimal::from_str(&body.amount).map_err(|_| bad_request("invalid amount format"))?;

    let req = QuoteRequest {
        input: Asset::parse(&body.input),
        output: Asset::parse(&body.output),
        amount,
    };

    let ledger_index = state.router.current_ledger_index();
    let quote = state
        .router
        .quote(&req, ledger_index)
        .map_err(router_error)?;

    let expires_at =
        Utc::now() + chrono::Duration::seconds((u64::from(quote.ttl_ledgers) * SECONDS_PER_LEDGER) as i64);

    Ok(Json(build_quote_body(&quote, expires_at)))
}

async fn pairs_handler(State(state): State<AppState>) -> Json<PairsBody> {
    let pairs = state
        .router
        .available_pairs()
        .into_iter()
        .map(|p| PairBody {
            input: p.input,
            output: p.output,
            liquidity: p.liquidity.to_string(),
            venues: p.venues,
        })
        .collect();
    Json(PairsBody { pairs })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthBody> {
    let stats = state.router.kv().stats();
    metrics::KV_MEMORY_BYTES.set(stats.current_bytes);

    let (status, indexer_lag) = state.router.health_status();

    Json(HealthBody {
        status: status.to_string(),
        indexer_lag,
        last_ledger_index: state.router.current_ledger_index(),
        quote_cache_hits: stats.hits,
        quote_cache_misses: stats.misses,
        kv_bytes: stats.current_bytes,
    })
}

async fn metrics_handler() -> Result<String, ApiError> {
    let encoder = prometheus::TextEncoder::new();
    encoder.encode_to_string(&prometheus::gather()).map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
    })
}

pub fn build_quote_body(quote: &QuoteResponse, expires_at: DateTime<Utc>) -> QuoteBody {
    let hops = quote
        .route
        .hops
        .iter()
        .map(|hop| HopBody {
            kind: hop.kind.to_string(),
            input: hop.in_asset.canonical(),
            output: hop.out_asset.canonical(),
            amount_in: hop.amount_in.to_string(),
            amount_out: hop.amount_out.to_string(),
        })
        .collect();

    QuoteBody {
        quote_hash: hex::encode(quote.quote_hash),
        route: RouteBody {
            hops,
            price_impact: quote.route.price_impact.to_string(),
        },
        amount_out: quote.out.to_string(),
        price: quote.price.to_string(),
        fees: FeesBody {
            router_bps: quote.fees.router_bps,
            trading_fees: quote.fees.trading_fees.to_string(),
            est_out_fee: quote.fees.est_out_fee.to_string(),
        },
        ledger_index: quote.ledger_index,
        ttl_ledgers: quote.ttl_ledgers,
        expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}
