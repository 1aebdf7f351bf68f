//! On-chain position queries.

use crate::domain::{KOClaimLocation, PositionLocation};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainQueryError {
    #[error("rpc transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("rpc decode error: {0}")]
    Decode(String),
}

/// Liquidity of one knockout claim and whether it has been knocked out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnockoutLiq {
    pub liq: u128,
    pub knocked_out: bool,
}

/// The five contract reads the refresh pipeline relies on.
#[async_trait]
pub trait ChainQuery: Send + Sync + fmt::Debug {
    async fn query_ambient_tokens(&self, loc: &PositionLocation) -> Result<u128, ChainQueryError>;

    async fn query_range_tokens(&self, loc: &PositionLocation) -> Result<u128, ChainQueryError>;

    async fn query_conc_rewards(&self, loc: &PositionLocation) -> Result<u128, ChainQueryError>;

    async fn query_knockout_tokens(
        &self,
        loc: &KOClaimLocation,
    ) -> Result<KnockoutLiq, ChainQueryError>;

    /// Current pivot time of the knockout book the position rests on.
    async fn query_knockout_pivot(&self, loc: &PositionLocation) -> Result<i64, ChainQueryError>;
}

/// Answers zero to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChainQuery;

#[async_trait]
impl ChainQuery for NullChainQuery {
    async fn query_ambient_tokens(&self, _loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        Ok(0)
    }

    async fn query_range_tokens(&self, _loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        Ok(0)
    }

    async fn query_conc_rewards(&self, _loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        Ok(0)
    }

    async fn query_knockout_tokens(
        &self,
        _loc: &KOClaimLocation,
    ) -> Result<KnockoutLiq, ChainQueryError> {
        Ok(KnockoutLiq::default())
    }

    async fn query_knockout_pivot(&self, _loc: &PositionLocation) -> Result<i64, ChainQueryError> {
        Ok(0)
    }
}
