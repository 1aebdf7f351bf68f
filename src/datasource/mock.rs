//! Mock sources for testing without network calls.

use super::chain::{ChainQuery, ChainQueryError, KnockoutLiq};
use super::{CombinedData, DataSourceError, SubgraphSource, SubgraphStartBlocks};
use crate::domain::{KOClaimLocation, PositionLocation};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Subgraph source that replays queued responses in order.
///
/// Once the queue is drained it keeps answering with empty tables at the
/// last meta block it served, which looks like a caught-up endpoint.
#[derive(Debug, Default)]
pub struct MockSubgraphSource {
    responses: Mutex<VecDeque<Result<CombinedData, DataSourceError>>>,
    last_meta_block: Mutex<i64>,
    queries: Mutex<Vec<SubgraphStartBlocks>>,
}

impl MockSubgraphSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the `data` object of a combined response.
    ///
    /// # Panics
    /// Panics if `data` is not a valid combined response.
    pub fn with_response(self, data: serde_json::Value) -> Self {
        let parsed: CombinedData = match serde_json::from_value(data) {
            Ok(parsed) => parsed,
            Err(e) => panic!("invalid mock combined response: {}", e),
        };
        self.responses.lock().push_back(Ok(parsed));
        self
    }

    pub fn with_error(self, err: DataSourceError) -> Self {
        self.responses.lock().push_back(Err(err));
        self
    }

    /// Cursors passed to each query, in call order.
    pub fn queries(&self) -> Vec<SubgraphStartBlocks> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SubgraphSource for MockSubgraphSource {
    async fn combined_query(
        &self,
        min_blocks: &SubgraphStartBlocks,
        _max_block: i64,
    ) -> Result<CombinedData, DataSourceError> {
        self.queries.lock().push(*min_blocks);

        let next = self.responses.lock().pop_front();
        match next {
            Some(Ok(data)) => {
                *self.last_meta_block.lock() = data.meta_block();
                Ok(data)
            }
            Some(Err(err)) => Err(err),
            None => {
                let mut data = CombinedData::default();
                data.meta.block.number = *self.last_meta_block.lock();
                Ok(data)
            }
        }
    }
}

/// Chain query answering fixed values, with call counting and injectable
/// failures.
#[derive(Debug, Default)]
pub struct MockChainQuery {
    ambient: u128,
    range: u128,
    rewards: u128,
    knockout: KnockoutLiq,
    pivot: i64,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl MockChainQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ambient(mut self, seeds: u128) -> Self {
        self.ambient = seeds;
        self
    }

    pub fn with_range(mut self, liq: u128, rewards: u128) -> Self {
        self.range = liq;
        self.rewards = rewards;
        self
    }

    pub fn with_knockout(mut self, liq: u128, knocked_out: bool) -> Self {
        self.knockout = KnockoutLiq { liq, knocked_out };
        self
    }

    pub fn with_pivot(mut self, pivot: i64) -> Self {
        self.pivot = pivot;
        self
    }

    /// Fail the next `n` calls with a transport error.
    pub fn failing(self, n: usize) -> Self {
        self.fail_next.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().clone()
    }

    fn record(&self) -> Result<(), ChainQueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(tokio::time::Instant::now());
        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ChainQueryError::Transport("mock failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChainQuery for MockChainQuery {
    async fn query_ambient_tokens(&self, _loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        self.record()?;
        Ok(self.ambient)
    }

    async fn query_range_tokens(&self, _loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        self.record()?;
        Ok(self.range)
    }

    async fn query_conc_rewards(&self, _loc: &PositionLocation) -> Result<u128, ChainQueryError> {
        self.record()?;
        Ok(self.rewards)
    }

    async fn query_knockout_tokens(
        &self,
        _loc: &KOClaimLocation,
    ) -> Result<KnockoutLiq, ChainQueryError> {
        self.record()?;
        Ok(self.knockout)
    }

    async fn query_knockout_pivot(&self, _loc: &PositionLocation) -> Result<i64, ChainQueryError> {
        self.record()?;
        Ok(self.pivot)
    }
}
