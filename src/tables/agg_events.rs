use super::{
    de_num_string, parse_float, parse_int, parse_pool, RawPool, RowContext, RowError, Table,
    TableName,
};
use crate::domain::{EthTxHash, PoolLocation};
use serde::Deserialize;

/// Per-transaction aggregate of a pool event: a fee change, a swap or a
/// liquidity change, with its net flows.
#[derive(Debug, Clone, PartialEq)]
pub struct AggEvent {
    pub id: String,
    pub tx: EthTxHash,
    pub event_index: i64,
    pub pool: PoolLocation,
    pub block: i64,
    pub time: i64,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub swap_price: f64,
    pub in_base_qty: bool,
    pub is_swap: bool,
    pub is_liq: bool,
    pub is_fee_change: bool,
    pub is_tick_skewed: bool,
    pub flows_at_market: bool,
    pub base_flow: f64,
    pub quote_flow: f64,
    pub fee_rate: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggEventSubgraph {
    pub id: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub event_index: i64,
    pub pool: RawPool,
    #[serde(deserialize_with = "de_num_string")]
    pub block: String,
    #[serde(deserialize_with = "de_num_string")]
    pub time: String,
    #[serde(default)]
    pub bid_tick: i32,
    #[serde(default)]
    pub ask_tick: i32,
    #[serde(default, deserialize_with = "de_num_string")]
    pub swap_price: String,
    #[serde(default)]
    pub in_base_qty: bool,
    #[serde(default)]
    pub is_swap: bool,
    #[serde(default)]
    pub is_liq: bool,
    #[serde(default)]
    pub is_fee_change: bool,
    #[serde(default)]
    pub is_tick_skewed: bool,
    #[serde(default)]
    pub flows_at_market: bool,
    #[serde(default, deserialize_with = "de_num_string")]
    pub base_flow: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub quote_flow: String,
    #[serde(default)]
    pub fee_rate: i64,
}

pub struct AggEventsTable;

impl Table for AggEventsTable {
    type Raw = AggEventSubgraph;
    type Row = AggEvent;

    const NAME: TableName = TableName::Aggs;

    fn convert(raw: AggEventSubgraph, ctx: &RowContext) -> Result<AggEvent, RowError> {
        let id = ctx.composite_id(&raw.id);
        let base_flow = parse_float(&id, "baseFlow", &raw.base_flow)?;
        let quote_flow = parse_float(&id, "quoteFlow", &raw.quote_flow)?;
        let (pool, base_flow, quote_flow) = parse_pool(&id, &raw.pool, ctx, base_flow, quote_flow)?;

        Ok(AggEvent {
            tx: EthTxHash::new(&raw.transaction_hash),
            event_index: raw.event_index,
            block: parse_int(&id, "block", &raw.block)?,
            time: parse_int(&id, "time", &raw.time)?,
            bid_tick: raw.bid_tick,
            ask_tick: raw.ask_tick,
            swap_price: parse_float(&id, "swapPrice", &raw.swap_price)?,
            in_base_qty: raw.in_base_qty,
            is_swap: raw.is_swap,
            is_liq: raw.is_liq,
            is_fee_change: raw.is_fee_change,
            is_tick_skewed: raw.is_tick_skewed,
            flows_at_market: raw.flows_at_market,
            base_flow,
            quote_flow,
            fee_rate: raw.fee_rate,
            pool,
            id,
        })
    }

    fn row_id(row: &AggEvent) -> &str {
        &row.id
    }

    fn row_block(row: &AggEvent) -> i64 {
        row.block
    }
}
