//! Query parameters shared by the read endpoints.

use super::AppState;
use crate::domain::{ChainId, EthAddress, PoolLocation};
use crate::error::AppError;
use serde::Deserialize;

pub const DEFAULT_TX_COUNT: usize = 100;
pub const MAX_TX_COUNT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub chain_id: String,
    pub user: String,
    pub n: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolQuery {
    pub chain_id: String,
    pub base: String,
    pub quote: String,
    pub pool_idx: u64,
    pub n: Option<usize>,
}

/// Resolve a `chainId` parameter to a configured chain.
pub fn parse_chain_id(state: &AppState, raw: &str) -> Result<ChainId, AppError> {
    let chain_id = ChainId::new(raw.trim());
    if state.net_cfg.network_for_chain_id(&chain_id).is_none() {
        return Err(AppError::BadRequest(format!("Unknown chainId {}", raw)));
    }
    Ok(chain_id)
}

impl UserQuery {
    pub fn resolve(&self, state: &AppState) -> Result<(ChainId, EthAddress), AppError> {
        Ok((
            parse_chain_id(state, &self.chain_id)?,
            EthAddress::parse(&self.user)?,
        ))
    }
}

impl PoolQuery {
    pub fn resolve(&self, state: &AppState) -> Result<PoolLocation, AppError> {
        let chain_id = parse_chain_id(state, &self.chain_id)?;
        let (pool, _) = PoolLocation::canonical(
            chain_id,
            EthAddress::parse(&self.base)?,
            EthAddress::parse(&self.quote)?,
            self.pool_idx,
        );
        Ok(pool)
    }
}

/// Number of rows requested, defaulting and capping.
pub fn tx_count(n: Option<usize>) -> Result<usize, AppError> {
    match n {
        None => Ok(DEFAULT_TX_COUNT),
        Some(0) => Err(AppError::BadRequest("n must be positive".into())),
        Some(n) => Ok(n.min(MAX_TX_COUNT)),
    }
}
