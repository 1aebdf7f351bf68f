//! GraphQL client for the combined subgraph query.

use super::{CombinedData, DataSourceError, SubgraphSource, SubgraphStartBlocks};
use async_trait::async_trait;
use backoff::backoff::Constant;
use backoff::future::retry_notify;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const SUBGRAPH_TIMEOUT: Duration = Duration::from_secs(20);
pub const SUBGRAPH_RETRY: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "graphcache-indexer/1.0";

/// One page per table, ascending by block, bounded by the per-table windows.
pub const COMBINED_QUERY: &str = r#"
query Combined(
  $orderDir: OrderDirection,
  $swapMinBlock: BigInt, $swapMaxBlock: BigInt,
  $liqMinBlock: BigInt, $liqMaxBlock: BigInt,
  $aggMinBlock: BigInt, $aggMaxBlock: BigInt,
  $balMinBlock: BigInt, $balMaxBlock: BigInt,
  $feeMinBlock: BigInt, $feeMaxBlock: BigInt,
  $koMinBlock: BigInt, $koMaxBlock: BigInt
) {
  _meta { block { number timestamp hash } }
  swaps(first: 1000, orderBy: block, orderDirection: $orderDir,
        where: { block_gte: $swapMinBlock, block_lte: $swapMaxBlock }) {
    id transactionHash callIndex user block time
    pool { base quote poolIdx }
    isBuy inBaseQty qty limitPrice minOut baseFlow quoteFlow
  }
  liquidityChanges(first: 1000, orderBy: block, orderDirection: $orderDir,
        where: { block_gte: $liqMinBlock, block_lte: $liqMaxBlock }) {
    id transactionHash callIndex user block time
    pool { base quote poolIdx }
    positionType changeType bidTick askTick isBid liq baseFlow quoteFlow pivotTime
  }
  aggEvents(first: 1000, orderBy: block, orderDirection: $orderDir,
        where: { block_gte: $aggMinBlock, block_lte: $aggMaxBlock }) {
    id transactionHash eventIndex block time
    pool { base quote poolIdx }
    bidTick askTick swapPrice inBaseQty isSwap isLiq isFeeChange isTickSkewed
    flowsAtMarket baseFlow quoteFlow feeRate
  }
  userBalances(first: 1000, orderBy: block, orderDirection: $orderDir,
        where: { block_gte: $balMinBlock, block_lte: $balMaxBlock }) {
    id transactionHash block time user token
  }
  feeChanges(first: 1000, orderBy: block, orderDirection: $orderDir,
        where: { block_gte: $feeMinBlock, block_lte: $feeMaxBlock }) {
    id transactionHash callIndex block time feeRate
    pool { base quote poolIdx }
  }
  knockoutCrosses(first: 1000, orderBy: block, orderDirection: $orderDir,
        where: { block_gte: $koMinBlock, block_lte: $koMaxBlock }) {
    id transactionHash block time tick isBid pivotTime feeMileage
    pool { base quote poolIdx }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    errors: Vec<GraphMessage>,
    data: Option<CombinedData>,
}

/// Subgraph endpoint for one chain.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: Client,
    url: String,
}

impl SubgraphClient {
    /// `[api-key]` in the URL is replaced with `api_key` when one is given.
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self, DataSourceError> {
        let client = Client::builder()
            .timeout(SUBGRAPH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DataSourceError::Other(e.to_string()))?;
        Ok(Self {
            client,
            url: url.replacen("[api-key]", api_key.unwrap_or_default(), 1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post_combined(
        &self,
        body: &serde_json::Value,
    ) -> Result<CombinedData, DataSourceError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| DataSourceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::HttpError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| DataSourceError::NetworkError(e.to_string()))?;
        parse_graph_response(&text)
    }
}

pub(crate) fn combined_variables(min_blocks: &SubgraphStartBlocks, max_block: i64) -> serde_json::Value {
    serde_json::json!({
        "orderDir": "asc",
        "swapMinBlock": min_blocks.swaps,
        "swapMaxBlock": max_block,
        "liqMinBlock": min_blocks.liq,
        "liqMaxBlock": max_block,
        "aggMinBlock": min_blocks.aggs,
        "aggMaxBlock": max_block,
        "balMinBlock": min_blocks.bal,
        "balMaxBlock": max_block,
        "feeMinBlock": min_blocks.fee,
        "feeMaxBlock": max_block,
        "koMinBlock": min_blocks.ko,
        "koMaxBlock": max_block,
    })
}

pub(crate) fn parse_graph_response(body: &str) -> Result<CombinedData, DataSourceError> {
    let parsed: GraphResponse =
        serde_json::from_str(body).map_err(|e| DataSourceError::ParseError(e.to_string()))?;
    if let Some(first) = parsed.errors.first() {
        return Err(DataSourceError::GraphErrors(first.message.clone()));
    }
    parsed.data.ok_or(DataSourceError::MissingData)
}

#[async_trait]
impl SubgraphSource for SubgraphClient {
    /// Retries every failure every 5 seconds, forever. The subgraph is a
    /// liveness dependency; restarting would only lose the in-memory state.
    async fn combined_query(
        &self,
        min_blocks: &SubgraphStartBlocks,
        max_block: i64,
    ) -> Result<CombinedData, DataSourceError> {
        let body = serde_json::json!({
            "query": COMBINED_QUERY,
            "variables": combined_variables(min_blocks, max_block),
        });
        debug!(url = %self.url, ?min_blocks, max_block, "Combined subgraph query");

        retry_notify(
            Constant::new(SUBGRAPH_RETRY),
            || async {
                self.post_combined(&body)
                    .await
                    .map_err(backoff::Error::transient)
            },
            |err: DataSourceError, wait: Duration| {
                warn!(error = %err, retry_in = ?wait, "Subgraph query failed");
            },
        )
        .await
    }
}
