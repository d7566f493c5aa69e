use anyhow::{anyhow, Context, Result};
use lucendex_router::breaker::{BreakerSnapshot, CircuitBreaker};
use lucendex_router::config::AppConfig;
use lucendex_router::kv::{self, MemoryStore};
use lucendex_router::metrics;
use lucendex_router::pathfinder::Pathfinder;
use lucendex_router::quote::QuoteEngine;
use lucendex_router::router::Router;
use lucendex_router::snapshot::{load_snapshot, Snapshot};
use lucendex_router::validator::Validator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal router error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration from environment")?;

    let kv = Arc::new(MemoryStore::with_config(
        config.kv_max_bytes,
        kv::DEFAULT_MAX_KEY_LENGTH,
        kv::DEFAULT_MAX_VALUE_SIZE,
    ));
    kv.start_cleanup();

    let snapshot = match &config.snapshot_path {
        Some(path) => load_snapshot(path).context("load ledger snapshot")?,
        None => {
            warn!("no snapshot path configured; serving with an empty book");
            Snapshot::default()
        }
    };
    info!(
        ledger_index = snapshot.ledger_index,
        pools = snapshot.pools.len(),
        offers = snapshot.offers.len(),
        "ledger snapshot loaded"
    );

    let pathfinder = Arc::new(Pathfinder::new(snapshot.pools, snapshot.offers));

    let threshold = config.breaker_threshold_decimal()?;
    let breaker = Arc::new(CircuitBreaker::new(threshold));
    if config.breaker_caution_secs == 0 {
        breaker.disable_caution();
    } else {
        breaker.enable_caution(Duration::from_secs(config.breaker_caution_secs));
    }

    // Breaker snapshots drain into the KV off the hot path; overflow drops.
    let (persist_tx, persist_rx) = mpsc::channel::<BreakerSnapshot>(1024);
    breaker.set_persist_channel(persist_tx);
    tokio::spawn(persist_breaker_snapshots(persist_rx, kv.clone()));

    let engine = QuoteEngine::new(
        Validator::new(),
        pathfinder,
        breaker,
        kv.clone(),
        config.router_bps,
    );
    let router = Arc::new(Router::new(engine));
    router.set_current_ledger_index(snapshot.ledger_index);

    let api_router = lucendex_router::api::create_api_router(router.clone());
    let api_addr: std::net::SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("parse bind address {}", config.bind_addr))?;

    info!(
        address = %api_addr,
        router_bps = config.router_bps,
        breaker_threshold = config.breaker_threshold,
        "lucendex router online"
    );

    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("bind API server address {api_addr}"))?;
    let _api_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, api_router).await {
            warn!(error = %err, "API server error");
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = kv.stats();
                metrics::KV_MEMORY_BYTES.set(stats.current_bytes);
                info!(
                    ledger_index = router.current_ledger_index(),
                    kv_keys = stats.total_keys,
                    kv_bytes = stats.current_bytes,
                    kv_hits = stats.hits,
                    kv_misses = stats.misses,
                    kv_evictions = stats.evictions,
                    "router heartbeat"
                );
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = %err, "ctrl_c listener error");
                }
                info!("shutdown signal received, exiting");
                router.close();
                break;
            }
        }
    }
    Ok(())
}

/// Dedicated writer for breaker persistence. The in-memory breaker remains
/// authoritative; a write failure is logged and forgotten.
async fn persist_breaker_snapshots(
    mut rx: mpsc::Receiver<BreakerSnapshot>,
    kv: Arc<MemoryStore>,
) {
    while let Some(snapshot) = rx.recv().await {
        let pair = snapshot.pair.clone();
        match serde_json::to_vec(&snapshot) {
            Ok(bytes) => {
                if let Err(err) = kv.set(kv::NS_CIRCUIT_BREAKER, &pair, &bytes, None) {
                    debug!(pair = %pair, error = %err, "persist breaker snapshot");
                }
            }
            Err(err) => {
                debug!(pair = %pair, error = %err, "serialize breaker snapshot");
            }
        }
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
