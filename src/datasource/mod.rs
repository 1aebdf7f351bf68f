//! Remote data sources: the subgraph event stream and on-chain queries.

use crate::tables::TableName;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod chain;
pub mod mock;
pub mod rpc;
pub mod subgraph;

pub use chain::{ChainQuery, ChainQueryError, KnockoutLiq, NullChainQuery};
pub use mock::{MockChainQuery, MockSubgraphSource};
pub use rpc::RpcChainQuery;
pub use subgraph::SubgraphClient;

/// Upper bound passed as the max block when syncing to head.
pub const MAX_BLOCK: i64 = i32::MAX as i64;

/// Per-table block cursors. Each only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphStartBlocks {
    #[serde(default)]
    pub swaps: i64,
    #[serde(default)]
    pub aggs: i64,
    #[serde(default)]
    pub bal: i64,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub liq: i64,
    #[serde(default)]
    pub ko: i64,
}

impl SubgraphStartBlocks {
    pub fn get(&self, table: TableName) -> i64 {
        match table {
            TableName::Swaps => self.swaps,
            TableName::Aggs => self.aggs,
            TableName::Bal => self.bal,
            TableName::Fee => self.fee,
            TableName::Liq => self.liq,
            TableName::Ko => self.ko,
        }
    }

    /// Move the table's cursor to `block` if it is strictly ahead.
    pub fn advance(&mut self, table: TableName, block: i64) -> bool {
        let cursor = match table {
            TableName::Swaps => &mut self.swaps,
            TableName::Aggs => &mut self.aggs,
            TableName::Bal => &mut self.bal,
            TableName::Fee => &mut self.fee,
            TableName::Liq => &mut self.liq,
            TableName::Ko => &mut self.ko,
        };
        if block > *cursor {
            *cursor = block;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetaBlock {
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CombinedMeta {
    #[serde(default)]
    pub block: MetaBlock,
}

/// The `data` object of a combined query response. Table arrays are kept
/// as raw JSON and decoded by each table's sync channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CombinedData {
    #[serde(rename = "_meta", default)]
    pub meta: CombinedMeta,
    #[serde(default)]
    pub swaps: serde_json::Value,
    #[serde(rename = "aggEvents", default)]
    pub aggs: serde_json::Value,
    #[serde(rename = "liquidityChanges", default)]
    pub liqs: serde_json::Value,
    #[serde(rename = "knockoutCrosses", default)]
    pub kos: serde_json::Value,
    #[serde(rename = "feeChanges", default)]
    pub fees: serde_json::Value,
    #[serde(rename = "userBalances", default)]
    pub bals: serde_json::Value,
}

impl CombinedData {
    pub fn meta_block(&self) -> i64 {
        self.meta.block.number
    }

    pub fn table(&self, table: TableName) -> &serde_json::Value {
        match table {
            TableName::Swaps => &self.swaps,
            TableName::Aggs => &self.aggs,
            TableName::Bal => &self.bals,
            TableName::Fee => &self.fees,
            TableName::Liq => &self.liqs,
            TableName::Ko => &self.kos,
        }
    }
}

/// A source of the combined six-table event stream.
#[async_trait]
pub trait SubgraphSource: Send + Sync + fmt::Debug {
    /// Fetch up to one page per table of rows with `block` in
    /// `[min_blocks[table], max_block]`, ascending.
    async fn combined_query(
        &self,
        min_blocks: &SubgraphStartBlocks,
        max_block: i64,
    ) -> Result<CombinedData, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// The endpoint answered with a non-empty `errors` array
    GraphErrors(String),
    /// The response had no `data` field
    MissingData,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::GraphErrors(msg) => write!(f, "Subgraph error: {}", msg),
            DataSourceError::MissingData => write!(f, "Subgraph response has no data field"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = DataSourceError::HttpError {
            status: 429,
            message: "Too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 429: Too many requests");

        let err = DataSourceError::MissingData;
        assert_eq!(err.to_string(), "Subgraph response has no data field");
    }

    #[test]
    fn test_cursor_only_advances() {
        let mut blocks = SubgraphStartBlocks::default();
        assert!(blocks.advance(TableName::Liq, 100));
        assert!(!blocks.advance(TableName::Liq, 100));
        assert!(!blocks.advance(TableName::Liq, 50));
        assert_eq!(blocks.get(TableName::Liq), 100);
        assert_eq!(blocks.get(TableName::Swaps), 0);
    }

    #[test]
    fn test_combined_data_parses_missing_tables() {
        let data: CombinedData = serde_json::from_value(serde_json::json!({
            "_meta": { "block": { "number": 1234, "timestamp": 99, "hash": "0xab" } },
            "swaps": [{ "id": "a" }]
        }))
        .unwrap();
        assert_eq!(data.meta_block(), 1234);
        assert!(data.table(TableName::Swaps).is_array());
        assert!(data.table(TableName::Ko).is_null());
    }
}
