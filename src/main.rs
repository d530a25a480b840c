use betline::backend::BackendClient;
use betline::bet::{BetLimits, BetOrchestrator, OrchestratorTiming};
use betline::chain::RpcChainClient;
use betline::config::Config;
use betline::market::{MarketWatcher, SnapshotCache, SseConnector, WatchOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = if Path::new("betline.toml").exists() {
        Config::load(Path::new("betline.toml"))?
    } else {
        info!("no betline.toml found, using env-only config");
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("betline v{} starting", env!("CARGO_PKG_VERSION"));

    let market_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => anyhow::bail!("usage: betline <market-id>"),
    };

    // --- Shared market data layer ---
    let backend = Arc::new(BackendClient::new(config.backend.api_url.clone()));
    let cache = SnapshotCache::new(Duration::from_secs(config.sync.cache_ttl_secs));
    let push = Arc::new(SseConnector::new(config.backend.api_url.clone()));

    // --- Bet engine (only when a wallet is configured) ---
    let _orchestrator = if config.has_wallet() {
        match RpcChainClient::connect(
            &config.chain.rpc_url,
            &config.chain.private_key,
            &config.chain.usdt_address,
            &config.chain.market_address,
        ) {
            Ok(chain) => {
                let wallet = chain.wallet_address();
                info!(wallet = %wallet, chain_id = config.chain.chain_id, "bet engine ready");
                Some(Arc::new(
                    BetOrchestrator::new(
                        Arc::new(chain),
                        backend.clone(),
                        BetLimits::from_config(&config.limits),
                        OrchestratorTiming::from_config(&config.chain),
                        config.chain.chain_id,
                        Some(wallet),
                    )
                    .with_market_cache(cache.clone()),
                ))
            }
            Err(e) => {
                error!(error = %e, "failed to set up chain client, bets disabled");
                None
            }
        }
    } else {
        warn!("no wallet configured, running watch-only");
        None
    };

    // --- Watch the requested market ---
    let watcher = MarketWatcher::spawn(
        backend,
        push,
        cache,
        market_id.clone(),
        WatchOptions::from_config(&config.sync),
    );
    let mut view_rx = watcher.subscribe();

    info!(market = %market_id, "watching market");

    loop {
        tokio::select! {
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                if let Some(err) = &view.error {
                    warn!(market = %market_id, code = %err.code, error = %err.message, "market error");
                }
                if let Some(snapshot) = &view.snapshot {
                    info!(
                        market = %market_id,
                        status = %snapshot.status,
                        yes = %betline::market::format_percent(snapshot.yes_percent),
                        no = %betline::market::format_percent(snapshot.no_percent),
                        pool = %betline::market::format_usd(snapshot.total_pool),
                        bets = snapshot.total_bets,
                        fetching = view.is_fetching,
                        "market update"
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down...");
                watcher.stop();
                break;
            }
        }
    }

    Ok(())
}
