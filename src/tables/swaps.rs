use super::{
    de_num_string, parse_addr, parse_float, parse_int, parse_pool, RawPool, RowContext, RowError,
    Table, TableName,
};
use crate::domain::{EthAddress, EthTxHash, PoolLocation};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Swap {
    pub id: String,
    pub tx: EthTxHash,
    pub call_index: i64,
    pub user: EthAddress,
    pub pool: PoolLocation,
    pub block: i64,
    pub time: i64,
    pub is_buy: bool,
    pub in_base_qty: bool,
    pub qty: f64,
    pub limit_price: f64,
    pub min_out: f64,
    pub base_flow: f64,
    pub quote_flow: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapSubgraph {
    pub id: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub call_index: i64,
    pub user: String,
    pub pool: RawPool,
    #[serde(deserialize_with = "de_num_string")]
    pub block: String,
    #[serde(deserialize_with = "de_num_string")]
    pub time: String,
    #[serde(default)]
    pub is_buy: bool,
    #[serde(default)]
    pub in_base_qty: bool,
    #[serde(default, deserialize_with = "de_num_string")]
    pub qty: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub limit_price: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub min_out: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub base_flow: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub quote_flow: String,
}

pub struct SwapsTable;

impl Table for SwapsTable {
    type Raw = SwapSubgraph;
    type Row = Swap;

    const NAME: TableName = TableName::Swaps;

    fn convert(raw: SwapSubgraph, ctx: &RowContext) -> Result<Swap, RowError> {
        let id = ctx.composite_id(&raw.id);
        let base_flow = parse_float(&id, "baseFlow", &raw.base_flow)?;
        let quote_flow = parse_float(&id, "quoteFlow", &raw.quote_flow)?;
        let (pool, base_flow, quote_flow) = parse_pool(&id, &raw.pool, ctx, base_flow, quote_flow)?;

        Ok(Swap {
            tx: EthTxHash::new(&raw.transaction_hash),
            call_index: raw.call_index,
            user: parse_addr(&id, "user", &raw.user)?,
            block: parse_int(&id, "block", &raw.block)?,
            time: parse_int(&id, "time", &raw.time)?,
            is_buy: raw.is_buy,
            in_base_qty: raw.in_base_qty,
            qty: parse_float(&id, "qty", &raw.qty)?,
            limit_price: parse_float(&id, "limitPrice", &raw.limit_price)?,
            min_out: parse_float(&id, "minOut", &raw.min_out)?,
            base_flow,
            quote_flow,
            pool,
            id,
        })
    }

    fn row_id(row: &Swap) -> &str {
        &row.id
    }

    fn row_block(row: &Swap) -> i64 {
        row.block
    }
}
