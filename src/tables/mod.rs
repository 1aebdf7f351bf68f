//! Source tables: raw subgraph row shapes and their typed conversions.
//!
//! Every table converts a raw row (numbers mostly encoded as strings) into a
//! typed row whose id is prefixed with the network name, so ids stay unique
//! when several chains are indexed by one process.

use crate::domain::{ChainId, EthAddress, NetworkName, PoolLocation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

pub mod agg_events;
pub mod balances;
pub mod fee_changes;
pub mod knockouts;
pub mod liq_changes;
pub mod swaps;

pub use agg_events::{AggEvent, AggEventsTable};
pub use balances::{Balance, BalancesTable};
pub use fee_changes::{FeeChange, FeeChangesTable};
pub use knockouts::{KnockoutCross, KnockoutCrossesTable};
pub use liq_changes::{ChangeType, LiqChange, LiqChangesTable, PositionType};
pub use swaps::{Swap, SwapsTable};

/// Maximum rows the source returns per table per query.
pub const PAGE_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum RowError {
    #[error("row {id}: invalid {field}: {value:?}")]
    InvalidField {
        id: String,
        field: &'static str,
        value: String,
    },
}

/// The network a batch of rows was fetched for.
#[derive(Debug, Clone)]
pub struct RowContext {
    pub network: NetworkName,
    pub chain_id: ChainId,
}

impl RowContext {
    pub fn new(network: NetworkName, chain_id: ChainId) -> Self {
        RowContext { network, chain_id }
    }

    pub fn composite_id(&self, raw_id: &str) -> String {
        format!("{}{}", self.network, raw_id)
    }
}

/// One of the six tables synced from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    Swaps,
    Aggs,
    Bal,
    Liq,
    Fee,
    Ko,
}

impl TableName {
    pub const ALL: [TableName; 6] = [
        TableName::Liq,
        TableName::Ko,
        TableName::Swaps,
        TableName::Aggs,
        TableName::Fee,
        TableName::Bal,
    ];

    /// Field name of this table in source responses and startup-cache paths.
    pub fn source_key(&self) -> &'static str {
        match self {
            TableName::Swaps => "swaps",
            TableName::Aggs => "aggEvents",
            TableName::Bal => "userBalances",
            TableName::Liq => "liquidityChanges",
            TableName::Fee => "feeChanges",
            TableName::Ko => "knockoutCrosses",
        }
    }

    pub fn from_source_key(key: &str) -> Option<Self> {
        TableName::ALL
            .into_iter()
            .find(|table| table.source_key() == key)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source_key())
    }
}

/// A source table: how to read its raw rows and what they convert into.
pub trait Table: Send + Sync + 'static {
    type Raw: DeserializeOwned + Send;
    type Row: Clone + fmt::Debug + Send + Sync + 'static;

    const NAME: TableName;

    fn convert(raw: Self::Raw, ctx: &RowContext) -> Result<Self::Row, RowError>;
    fn row_id(row: &Self::Row) -> &str;
    fn row_block(row: &Self::Row) -> i64;
}

/// Pool reference embedded in most raw rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPool {
    pub base: String,
    pub quote: String,
    #[serde(deserialize_with = "de_num_string")]
    pub pool_idx: String,
}

/// Accepts a JSON string or number (or null) and yields its string form.
pub fn de_num_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

pub(crate) fn parse_int(id: &str, field: &'static str, value: &str) -> Result<i64, RowError> {
    value.trim().parse::<i64>().map_err(|_| RowError::InvalidField {
        id: id.to_string(),
        field,
        value: value.to_string(),
    })
}

pub(crate) fn parse_u64(id: &str, field: &'static str, value: &str) -> Result<u64, RowError> {
    value.trim().parse::<u64>().map_err(|_| RowError::InvalidField {
        id: id.to_string(),
        field,
        value: value.to_string(),
    })
}

/// Empty strings read as zero; the source leaves absent flows blank.
pub(crate) fn parse_float(id: &str, field: &'static str, value: &str) -> Result<f64, RowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed.parse::<f64>().map_err(|_| RowError::InvalidField {
        id: id.to_string(),
        field,
        value: value.to_string(),
    })
}

pub(crate) fn parse_addr(
    id: &str,
    field: &'static str,
    value: &str,
) -> Result<EthAddress, RowError> {
    EthAddress::parse(value).map_err(|_| RowError::InvalidField {
        id: id.to_string(),
        field,
        value: value.to_string(),
    })
}

/// Resolve a raw pool into canonical order, flipping the two flows with it.
pub(crate) fn parse_pool(
    id: &str,
    raw: &RawPool,
    ctx: &RowContext,
    base_flow: f64,
    quote_flow: f64,
) -> Result<(PoolLocation, f64, f64), RowError> {
    let base = parse_addr(id, "pool.base", &raw.base)?;
    let quote = parse_addr(id, "pool.quote", &raw.quote)?;
    let pool_idx = parse_u64(id, "pool.poolIdx", &raw.pool_idx)?;
    let (pool, flipped) = PoolLocation::canonical(ctx.chain_id.clone(), base, quote, pool_idx);
    if flipped {
        Ok((pool, quote_flow, base_flow))
    } else {
        Ok((pool, base_flow, quote_flow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_source_keys_round_trip() {
        for table in TableName::ALL {
            assert_eq!(TableName::from_source_key(table.source_key()), Some(table));
        }
        assert_eq!(TableName::from_source_key("pools"), None);
    }

    #[test]
    fn test_parse_float_blank_is_zero() {
        assert_eq!(parse_float("x", "f", "").unwrap(), 0.0);
        assert_eq!(parse_float("x", "f", "-12.5").unwrap(), -12.5);
        assert!(parse_float("x", "f", "abc").is_err());
    }

    #[test]
    fn test_parse_pool_flips_flows() {
        let ctx = RowContext::new(NetworkName::new("ethereum"), ChainId::from_int(1));
        let raw = RawPool {
            base: format!("0x{:040x}", 9),
            quote: format!("0x{:040x}", 1),
            pool_idx: "420".to_string(),
        };
        let (pool, base_flow, quote_flow) = parse_pool("x", &raw, &ctx, 10.0, -3.0).unwrap();
        assert_eq!(pool.base.as_str(), format!("0x{:040x}", 1));
        assert_eq!(base_flow, -3.0);
        assert_eq!(quote_flow, 10.0);
        assert_eq!(ctx.composite_id("abc"), "ethereumabc");
    }
}
