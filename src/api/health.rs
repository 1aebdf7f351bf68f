use super::AppState;
use axum::extract::State;
use axum::Json;
use std::collections::BTreeMap;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once every configured chain has seen a subgraph block.
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let blocks: BTreeMap<String, i64> = state
        .net_cfg
        .networks()
        .map(|(network, chain)| {
            (
                network.to_string(),
                state.cache.latest_block(&chain.chain_id()),
            )
        })
        .collect();
    let status = if blocks.values().all(|b| *b > 0) {
        "ready"
    } else {
        "syncing"
    };
    Json(serde_json::json!({"status": status, "latestBlocks": blocks}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::{ChainConfig, NetworkConfig};
    use crate::domain::{ChainId, NetworkName};
    use std::sync::Arc;

    fn state() -> AppState {
        let mut net_cfg = NetworkConfig::default();
        net_cfg.insert(
            NetworkName::new("ethereum"),
            ChainConfig {
                chain_id: 1,
                subgraph: "http://example.invalid".to_string(),
                query_contract: String::new(),
                knockout_tick_width: 4,
                rpc: String::new(),
            },
        );
        AppState::new(Arc::new(MemoryCache::new()), Arc::new(net_cfg))
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_waits_for_first_block() {
        let state = state();
        let Json(body) = ready(State(state.clone())).await;
        assert_eq!(body["status"], "syncing");

        state.cache.set_latest_block(ChainId::from_int(1), 17_000_000);
        let Json(body) = ready(State(state)).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["latestBlocks"]["ethereum"], 17_000_000);
    }
}
