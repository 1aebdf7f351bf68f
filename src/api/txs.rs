use axum::extract::{Query, State};
use axum::Json;
use serde::Serialize;

use super::params::{tx_count, PoolQuery, UserQuery};
use super::AppState;
use crate::domain::EthAddress;
use crate::engine::PoolTxEvent;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTokensResponse {
    pub tokens: Vec<EthAddress>,
}

/// Newest-first user transactions.
pub async fn get_user_txs(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PoolTxEvent>>, AppError> {
    let (chain_id, user) = params.resolve(&state)?;
    let n = tx_count(params.n)?;
    Ok(Json(state.cache.retrieve_user_txs(&chain_id, &user, n)))
}

/// Newest-first pool transactions.
pub async fn get_pool_txs(
    Query(params): Query<PoolQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PoolTxEvent>>, AppError> {
    let pool = params.resolve(&state)?;
    let n = tx_count(params.n)?;
    Ok(Json(state.cache.retrieve_pool_txs(&pool, n)))
}

pub async fn get_user_balance_tokens(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceTokensResponse>, AppError> {
    let (chain_id, user) = params.resolve(&state)?;
    let mut tokens = state.cache.retrieve_user_balances(&chain_id, &user);
    tokens.sort();
    tokens.dedup();
    Ok(Json(BalanceTokensResponse { tokens }))
}
