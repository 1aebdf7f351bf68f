//! Refresh handles: one on-chain read per model object, written back under
//! the object's own lock.

use crate::datasource::{ChainQuery, ChainQueryError};
use crate::domain::{KOClaimLocation, PositionLocation};
use crate::engine::{SharedPosition, SharedSubplot};
use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const N_MAX_RETRIES: usize = 3;
pub const RETRY_MIN_WAIT: Duration = Duration::from_secs(30);
pub const RETRY_MAX_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("query {label} failed after {attempts} attempts: {source}")]
    Exhausted {
        label: &'static str,
        attempts: usize,
        #[source]
        source: ChainQueryError,
    },
}

/// Retry budget for a single contract call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: N_MAX_RETRIES,
            min_wait: RETRY_MIN_WAIT,
            max_wait: RETRY_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Same retry count, no waiting.
    pub fn immediate() -> Self {
        Self {
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Run `op`, retrying up to `max_retries` times with a random wait so a
    /// struggling RPC node is not hit by every worker at once.
    pub async fn run<T, F, Fut>(&self, label: &'static str, op: F) -> Result<T, RefreshError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainQueryError>>,
    {
        let mut op = op;
        let schedule = RandomWait {
            budget: self.max_retries,
            remaining: self.max_retries,
            min_wait: self.min_wait,
            max_wait: self.max_wait,
        };
        retry_notify(
            schedule,
            || {
                let attempt = op();
                async move { attempt.await.map_err(backoff::Error::transient) }
            },
            |err: ChainQueryError, wait: Duration| {
                warn!(label, error = %err, retry_in = ?wait, "Chain query attempt failed");
            },
        )
        .await
        .map_err(|source| RefreshError::Exhausted {
            label,
            attempts: self.max_retries + 1,
            source,
        })
    }
}

/// Uniform random wait in `[min_wait, max_wait]`, a fixed number of times.
#[derive(Debug, Clone)]
struct RandomWait {
    budget: usize,
    remaining: usize,
    min_wait: Duration,
    max_wait: Duration,
}

impl Backoff for RandomWait {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        if self.max_wait <= self.min_wait {
            return Some(self.min_wait);
        }
        let millis = rand::thread_rng()
            .gen_range(self.min_wait.as_millis() as u64..=self.max_wait.as_millis() as u64);
        Some(Duration::from_millis(millis))
    }

    fn reset(&mut self) {
        self.remaining = self.budget;
    }
}

/// A refreshable model object and the on-chain reads that back it.
#[derive(Debug, Clone)]
pub enum RefreshHandle {
    /// Ambient seeds, or range liquidity plus rewards.
    Position {
        loc: PositionLocation,
        pos: SharedPosition,
    },
    /// Range rewards only. Ambient positions have nothing to read here.
    Rewards {
        loc: PositionLocation,
        pos: SharedPosition,
    },
    /// Liquidity still resting in the current pivot.
    KnockoutAlive {
        loc: PositionLocation,
        sub: SharedSubplot,
    },
    /// Liquidity left over in one knocked-out pivot.
    KnockoutPost {
        loc: KOClaimLocation,
        sub: SharedSubplot,
    },
}

impl RefreshHandle {
    pub fn label_tag(&self) -> &'static str {
        match self {
            RefreshHandle::Position { loc, .. } if loc.liq.is_ambient() => "ambient",
            RefreshHandle::Position { .. } => "range",
            RefreshHandle::Rewards { loc, .. } if loc.liq.is_ambient() => "rewards-ambient",
            RefreshHandle::Rewards { .. } => "rewards-range",
            RefreshHandle::KnockoutAlive { .. } => "knockoutActive",
            RefreshHandle::KnockoutPost { .. } => "knockoutPost",
        }
    }

    /// Read the authoritative values and write them into the model object.
    /// No lock is held while a query is in flight.
    pub async fn refresh_query(
        &self,
        query: &dyn ChainQuery,
        retry: &RetryPolicy,
        now: i64,
    ) -> Result<(), RefreshError> {
        match self {
            RefreshHandle::Position { loc, pos } if loc.liq.is_ambient() => {
                let seeds = retry
                    .run("ambientLiq", || query.query_ambient_tokens(loc))
                    .await?;
                pos.write().update_ambient(seeds, now);
            }
            RefreshHandle::Position { loc, pos } => {
                let conc = retry
                    .run("rangeLiq", || query.query_range_tokens(loc))
                    .await?;
                let rewards = retry
                    .run("rangeRewards", || query.query_conc_rewards(loc))
                    .await?;
                pos.write().update_range(conc, rewards, now);
            }
            RefreshHandle::Rewards { loc, pos } => {
                if !loc.liq.is_ambient() {
                    let rewards = retry
                        .run("rangeRewards", || query.query_conc_rewards(loc))
                        .await?;
                    pos.write().update_range_rewards(rewards, now);
                }
            }
            RefreshHandle::KnockoutAlive { loc, sub } => {
                let pivot = retry
                    .run("pivotTimeLatest", || query.query_knockout_pivot(loc))
                    .await?;
                let liq = if pivot == 0 {
                    0
                } else {
                    let claim = loc.to_claim_loc(pivot);
                    retry
                        .run("knockoutLiq", || query.query_knockout_tokens(&claim))
                        .await?
                        .liq
                };
                let mut sub = sub.write();
                sub.liq.update_active_liq(liq, now);
                sub.tracker.update_knockout(liq, false, now);
            }
            RefreshHandle::KnockoutPost { loc, sub } => {
                let resp = retry
                    .run("knockoutLiq", || query.query_knockout_tokens(loc))
                    .await?;
                if resp.knocked_out {
                    let mut sub = sub.write();
                    sub.liq.update_post_ko_liq(loc.pivot_time, resp.liq, now);
                    let active = sub.tracker.conc_liq;
                    sub.tracker.update_knockout(active, true, now);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockChainQuery;
    use crate::domain::{ChainId, EthAddress, LiquidityLocation, PoolLocation};
    use crate::engine::{KnockoutSaga, PositionTracker};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn loc(liq: LiquidityLocation) -> PositionLocation {
        let (pool, _) = PoolLocation::canonical(
            ChainId::from_int(1),
            EthAddress::zero(),
            EthAddress::parse("0x00000000000000000000000000000000000000ff").unwrap(),
            420,
        );
        PositionLocation::new(pool, liq, EthAddress::zero())
    }

    #[tokio::test]
    async fn test_range_position_refresh_writes_both_fields() {
        let chain = MockChainQuery::new().with_range(500, 7);
        let pos = Arc::new(RwLock::new(PositionTracker::new()));
        let handle = RefreshHandle::Position {
            loc: loc(LiquidityLocation::range(-10, 10)),
            pos: pos.clone(),
        };
        handle.refresh_query(&chain, &RetryPolicy::immediate(), 1000).await.unwrap();
        assert_eq!(pos.read().conc_liq, 500);
        assert_eq!(pos.read().reward_liq, 7);
        assert_eq!(pos.read().refresh_time, 1000);
        assert_eq!(chain.calls(), 2);
    }

    #[tokio::test]
    async fn test_ambient_rewards_handle_is_noop() {
        let chain = MockChainQuery::new().with_range(500, 7);
        let pos = Arc::new(RwLock::new(PositionTracker::new()));
        let handle = RefreshHandle::Rewards {
            loc: loc(LiquidityLocation::ambient()),
            pos: pos.clone(),
        };
        handle.refresh_query(&chain, &RetryPolicy::immediate(), 1000).await.unwrap();
        assert_eq!(chain.calls(), 0);
        assert_eq!(handle.label_tag(), "rewards-ambient");
    }

    #[tokio::test]
    async fn test_knockout_alive_with_no_pivot_is_empty() {
        let chain = MockChainQuery::new().with_pivot(0).with_knockout(99, false);
        let saga = KnockoutSaga::new();
        let (sub, _) = saga.for_user(&EthAddress::zero());
        sub.write().liq.update_active_liq(5, 1);
        let handle = RefreshHandle::KnockoutAlive {
            loc: loc(LiquidityLocation::knockout(-16, 0, true)),
            sub: sub.clone(),
        };
        handle.refresh_query(&chain, &RetryPolicy::immediate(), 50).await.unwrap();
        assert_eq!(sub.read().liq.active.conc_liq, 0);
        assert_eq!(chain.calls(), 1);
    }

    #[tokio::test]
    async fn test_knockout_post_records_knocked_out_liq() {
        let chain = MockChainQuery::new().with_knockout(1234, true);
        let saga = KnockoutSaga::new();
        let (sub, _) = saga.for_user(&EthAddress::zero());
        let claim = loc(LiquidityLocation::knockout(-16, 0, true)).to_claim_loc(777);
        let handle = RefreshHandle::KnockoutPost {
            loc: claim,
            sub: sub.clone(),
        };
        handle.refresh_query(&chain, &RetryPolicy::immediate(), 50).await.unwrap();
        let sub = sub.read();
        assert_eq!(sub.liq.knocked_out[&777].conc_liq, 1234);
        assert!(sub.tracker.has_knocked_out);
    }

    #[tokio::test]
    async fn test_retry_recovers_within_budget() {
        let chain = MockChainQuery::new().with_ambient(3).failing(3);
        let pos = Arc::new(RwLock::new(PositionTracker::new()));
        let handle = RefreshHandle::Position {
            loc: loc(LiquidityLocation::ambient()),
            pos: pos.clone(),
        };
        handle.refresh_query(&chain, &RetryPolicy::immediate(), 10).await.unwrap();
        assert_eq!(pos.read().ambient_seeds, 3);
        assert_eq!(chain.calls(), 4);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_reported() {
        let chain = MockChainQuery::new().with_ambient(3).failing(4);
        let pos = Arc::new(RwLock::new(PositionTracker::new()));
        let handle = RefreshHandle::Position {
            loc: loc(LiquidityLocation::ambient()),
            pos,
        };
        let err = handle
            .refresh_query(&chain, &RetryPolicy::immediate(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Exhausted { attempts: 4, .. }));
    }

    #[test]
    fn test_random_wait_bounds() {
        let mut wait = RandomWait {
            budget: 3,
            remaining: 3,
            min_wait: RETRY_MIN_WAIT,
            max_wait: RETRY_MAX_WAIT,
        };
        for _ in 0..3 {
            let next = wait.next_backoff().unwrap();
            assert!(next >= RETRY_MIN_WAIT && next <= RETRY_MAX_WAIT);
        }
        assert_eq!(wait.next_backoff(), None);
    }
}
