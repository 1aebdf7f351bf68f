//! High-water-mark sync of all six tables through one combined query.

use super::channel::{IngestOutcome, SyncChannel, SyncError};
use crate::datasource::{SubgraphSource, SubgraphStartBlocks, MAX_BLOCK};
use crate::orchestration::ControllerOverNetwork;
use crate::tables::{
    AggEventsTable, BalancesTable, FeeChangesTable, KnockoutCrossesTable, LiqChangesTable,
    RowContext, SwapsTable, TableName,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SOURCE_RETRY_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct SyncChannels {
    swaps: SyncChannel<SwapsTable>,
    aggs: SyncChannel<AggEventsTable>,
    bal: SyncChannel<BalancesTable>,
    liq: SyncChannel<LiqChangesTable>,
    fee: SyncChannel<FeeChangesTable>,
    ko: SyncChannel<KnockoutCrossesTable>,
}

impl SyncChannels {
    fn new(ctx: RowContext) -> Self {
        Self {
            swaps: SyncChannel::new(ctx.clone()),
            aggs: SyncChannel::new(ctx.clone()),
            bal: SyncChannel::new(ctx.clone()),
            liq: SyncChannel::new(ctx.clone()),
            fee: SyncChannel::new(ctx.clone()),
            ko: SyncChannel::new(ctx),
        }
    }
}

/// Result of one combined query round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// The source failed or is not indexed yet; nothing was ingested.
    Unavailable,
    /// Rows were processed. `caught_up` is set once no table has more.
    Synced { meta_block: i64, caught_up: bool, failed_tables: usize },
}

#[derive(Debug)]
pub struct CombinedSyncer {
    ctrl: ControllerOverNetwork,
    source: Arc<dyn SubgraphSource>,
    channels: SyncChannels,
    cursors: SubgraphStartBlocks,
    poll_interval: Duration,
    retry_wait: Duration,
    /// Last error of each table whose cursor is held by a bad row.
    stalled: BTreeMap<TableName, String>,
}

impl CombinedSyncer {
    pub fn new(
        ctrl: ControllerOverNetwork,
        source: Arc<dyn SubgraphSource>,
        poll_interval: Duration,
    ) -> Self {
        let ctx = RowContext::new(ctrl.network().clone(), ctrl.chain_id().clone());
        Self {
            ctrl,
            source,
            channels: SyncChannels::new(ctx),
            cursors: SubgraphStartBlocks::default(),
            poll_interval,
            retry_wait: SOURCE_RETRY_WAIT,
            stalled: BTreeMap::new(),
        }
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    pub fn controller(&self) -> &ControllerOverNetwork {
        &self.ctrl
    }

    pub fn cursors(&self) -> SubgraphStartBlocks {
        self.cursors
    }

    /// Tables currently held back by a bad row.
    pub fn stalled_tables(&self) -> Vec<TableName> {
        self.stalled.keys().copied().collect()
    }

    /// Replace the cursors wholesale, e.g. after replaying a startup cache.
    pub fn set_start_blocks(&mut self, cursors: SubgraphStartBlocks) {
        self.cursors = cursors;
    }

    /// Ingest one page of `table` rows through that table's channel.
    pub async fn ingest_table(
        &mut self,
        table: TableName,
        data: &serde_json::Value,
        cursor: i64,
        max_block: i64,
    ) -> Result<IngestOutcome, SyncError> {
        let ctrl = &self.ctrl;
        let ch = &mut self.channels;
        match table {
            TableName::Swaps => ch.swaps.ingest_entries(ctrl, data, cursor, max_block).await,
            TableName::Aggs => ch.aggs.ingest_entries(ctrl, data, cursor, max_block).await,
            TableName::Bal => ch.bal.ingest_entries(ctrl, data, cursor, max_block).await,
            TableName::Liq => ch.liq.ingest_entries(ctrl, data, cursor, max_block).await,
            TableName::Fee => ch.fee.ingest_entries(ctrl, data, cursor, max_block).await,
            TableName::Ko => ch.ko.ingest_entries(ctrl, data, cursor, max_block).await,
        }
    }

    /// One combined query and the ingest of every table it returned.
    pub async fn sync_step(&mut self) -> SyncStep {
        let data = match self.source.combined_query(&self.cursors, MAX_BLOCK).await {
            Ok(data) => data,
            Err(e) => {
                warn!(network = %self.ctrl.network(), error = %e, "Combined subgraph query failed");
                return SyncStep::Unavailable;
            }
        };

        let meta_block = data.meta_block();
        if meta_block == 0 {
            warn!(network = %self.ctrl.network(), "Subgraph latest block is 0, retrying");
            return SyncStep::Unavailable;
        }

        let mut has_more = false;
        let mut advanced = false;
        let mut failed_tables = 0;
        for table in TableName::ALL {
            let cursor = self.cursors.get(table);
            match self
                .ingest_table(table, data.table(table), cursor, meta_block)
                .await
            {
                Ok(outcome) => {
                    if self.stalled.remove(&table).is_some() {
                        info!(network = %self.ctrl.network(), table = ?table, "Table page recovered");
                    }
                    has_more |= outcome.has_more;
                    advanced |= self.cursors.advance(table, outcome.last_observed);
                }
                Err(e) => {
                    let msg = e.to_string();
                    if self.stalled.get(&table) == Some(&msg) {
                        debug!(network = %self.ctrl.network(), error = %msg, "Table page still has bad rows");
                    } else {
                        warn!(network = %self.ctrl.network(), error = %msg, "Skipping table page with bad rows");
                        self.stalled.insert(table, msg);
                    }
                    has_more = true;
                    failed_tables += 1;
                }
            }
        }

        self.ctrl
            .cache()
            .set_latest_block(self.ctrl.chain_id().clone(), meta_block);
        if advanced {
            let c = &self.cursors;
            debug!(
                network = %self.ctrl.network(),
                swaps = c.swaps,
                aggs = c.aggs,
                bal = c.bal,
                liq = c.liq,
                fee = c.fee,
                ko = c.ko,
                "Sync step"
            );
        }

        SyncStep::Synced {
            meta_block,
            caught_up: !has_more,
            failed_tables,
        }
    }

    /// Backfill until every table is caught up.
    pub async fn sync_startup(&mut self) {
        self.sync_loop(true).await;
        info!(
            network = %self.ctrl.network(),
            chain_id = %self.ctrl.chain_id(),
            "Startup subgraph sync done"
        );
    }

    /// Follow the source head forever.
    pub async fn poll_updates(&mut self) {
        self.sync_loop(false).await;
    }

    async fn sync_loop(&mut self, startup: bool) {
        let mut last_head = 0;
        loop {
            match self.sync_step().await {
                SyncStep::Unavailable => tokio::time::sleep(self.retry_wait).await,
                SyncStep::Synced { failed_tables, .. } if failed_tables > 0 => {
                    tokio::time::sleep(self.retry_wait).await;
                }
                SyncStep::Synced {
                    meta_block,
                    caught_up: true,
                    ..
                } => {
                    if startup {
                        return;
                    }
                    if meta_block > last_head {
                        debug!(network = %self.ctrl.network(), block = meta_block, "New subgraph block");
                        last_head = meta_block;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                SyncStep::Synced { .. } => {}
            }
        }
    }
}
