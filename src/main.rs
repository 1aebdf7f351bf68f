use anyhow::Context;
use graphcache::api;
use graphcache::cache::MemoryCache;
use graphcache::config::{Config, NetworkConfig};
use graphcache::datasource::{RpcChainQuery, SubgraphClient, SubgraphSource};
use graphcache::domain::{EthAddress, NetworkName};
use graphcache::orchestration::{first_task_exit, Controller};
use graphcache::refresh::{LiquidityRefresher, RefreshConfig};
use graphcache::sync::{load_startup_cache, CombinedSyncer, StartupCacheProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let env: std::collections::HashMap<String, String> = std::env::vars().collect();
    let net_cfg = Arc::new(
        NetworkConfig::load(&config.network_config_path, &env)
            .context("failed to load network config")?,
    );
    let cache = Arc::new(MemoryCache::new());

    let chain_query = Arc::new(build_chain_query(&net_cfg)?);
    let (refresher, mut fatal_rx) = LiquidityRefresher::spawn(
        chain_query,
        RefreshConfig {
            workers: config.refresh_workers,
            max_reqs_per_sec: config.refresh_max_rps,
            ..RefreshConfig::default()
        },
    );
    let (controller, router) = Controller::new(net_cfg.clone(), cache.clone(), refresher);
    let mut tasks = vec![("refresh router".to_string(), router)];

    let networks: Vec<NetworkName> = if config.networks.is_empty() {
        net_cfg.networks().map(|(name, _)| name.clone()).collect()
    } else {
        config.networks.clone()
    };

    for network in networks {
        let ctrl = controller
            .on_network(&network)
            .context("network selected for sync is not configured")?;
        let chain = net_cfg
            .chain_config(&network)
            .context("network selected for sync is not configured")?;
        let source: Arc<dyn SubgraphSource> = Arc::new(
            SubgraphClient::new(&chain.subgraph, None)
                .with_context(|| format!("failed to build subgraph client for {}", network))?,
        );
        let provider = match &config.startup_cache {
            Some(src) => Some(
                StartupCacheProvider::new(src, chain.chain_id())
                    .context("failed to build startup cache provider")?,
            ),
            None => None,
        };

        let mut syncer = CombinedSyncer::new(ctrl, source, config.poll_interval);
        let task = tokio::spawn(async move {
            if let Some(provider) = provider {
                load_startup_cache(&provider, &mut syncer).await;
            }
            syncer.sync_startup().await;
            syncer.poll_updates().await;
        });
        tasks.push((format!("sync {}", network), task));
        info!(network = %network, "Started subgraph sync");
    }

    if !config.full_refresh_interval.is_zero() {
        let task = controller.spawn_periodic_refresh(config.full_refresh_interval);
        tasks.push(("full refresh".to_string(), task));
    }

    let app = api::create_router(api::AppState::new(cache, net_cfg));
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!("Server listening on {}", addr);

    tokio::select! {
        res = axum::serve(listener, app) => {
            res.context("server error")?;
        }
        Some(err) = fatal_rx.recv() => {
            error!(error = %err, "Liquidity refresh failed permanently");
            anyhow::bail!(err);
        }
        exit = first_task_exit(tasks) => {
            error!(error = %exit, "Background task ended");
            anyhow::bail!(exit);
        }
    }
    Ok(())
}

/// RPC targets for every chain with an endpoint configured.
fn build_chain_query(net_cfg: &NetworkConfig) -> anyhow::Result<RpcChainQuery> {
    let mut query = RpcChainQuery::new().context("failed to build RPC client")?;
    for (network, chain) in net_cfg.networks() {
        if chain.rpc.is_empty() {
            warn!(network = %network, "No RPC endpoint, positions will not be refreshed");
            continue;
        }
        let contract = EthAddress::parse(&chain.query_contract)
            .with_context(|| format!("invalid query_contract for {}", network))?;
        query = query.with_chain(chain.chain_id(), chain.rpc.clone(), contract);
    }
    Ok(query)
}
