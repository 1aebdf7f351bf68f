pub mod health;
pub mod params;
pub mod pools;
pub mod positions;
pub mod txs;

use crate::cache::MemoryCache;
use crate::config::NetworkConfig;
use crate::refresh::{unix_now, Clock};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<MemoryCache>,
    pub net_cfg: Arc<NetworkConfig>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(cache: Arc<MemoryCache>, net_cfg: Arc<NetworkConfig>) -> Self {
        Self {
            cache,
            net_cfg,
            clock: unix_now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/user_positions", get(positions::get_user_positions))
        .route("/v1/pool_positions", get(positions::get_pool_positions))
        .route("/v1/user_limit_orders", get(positions::get_user_limit_orders))
        .route("/v1/user_txs", get(txs::get_user_txs))
        .route("/v1/pool_txs", get(txs::get_pool_txs))
        .route("/v1/user_balance_tokens", get(txs::get_user_balance_tokens))
        .route("/v1/pool_liq_curve", get(pools::get_pool_liq_curve))
        .route("/v1/pool_candles", get(pools::get_pool_candles))
        .layer(cors)
        .with_state(state)
}
