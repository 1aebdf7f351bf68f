use super::{
    de_num_string, parse_float, parse_int, parse_pool, RawPool, RowContext, RowError, Table,
    TableName,
};
use crate::domain::{EthTxHash, PoolLocation};
use serde::Deserialize;

/// The pool's price swept through a knockout tick, knocking out every order
/// of one pivot generation on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct KnockoutCross {
    pub id: String,
    pub tx: EthTxHash,
    pub pool: PoolLocation,
    pub block: i64,
    pub time: i64,
    pub tick: i32,
    pub is_bid: bool,
    pub pivot_time: i64,
    pub fee_mileage: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnockoutCrossSubgraph {
    pub id: String,
    #[serde(default)]
    pub transaction_hash: String,
    pub pool: RawPool,
    #[serde(deserialize_with = "de_num_string")]
    pub block: String,
    #[serde(deserialize_with = "de_num_string")]
    pub time: String,
    pub tick: i32,
    #[serde(default)]
    pub is_bid: bool,
    #[serde(deserialize_with = "de_num_string")]
    pub pivot_time: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub fee_mileage: String,
}

pub struct KnockoutCrossesTable;

impl Table for KnockoutCrossesTable {
    type Raw = KnockoutCrossSubgraph;
    type Row = KnockoutCross;

    const NAME: TableName = TableName::Ko;

    fn convert(raw: KnockoutCrossSubgraph, ctx: &RowContext) -> Result<KnockoutCross, RowError> {
        let id = ctx.composite_id(&raw.id);
        let (pool, _, _) = parse_pool(&id, &raw.pool, ctx, 0.0, 0.0)?;

        Ok(KnockoutCross {
            tx: EthTxHash::new(&raw.transaction_hash),
            block: parse_int(&id, "block", &raw.block)?,
            time: parse_int(&id, "time", &raw.time)?,
            tick: raw.tick,
            is_bid: raw.is_bid,
            pivot_time: parse_int(&id, "pivotTime", &raw.pivot_time)?,
            fee_mileage: parse_float(&id, "feeMileage", &raw.fee_mileage)?,
            pool,
            id,
        })
    }

    fn row_id(row: &KnockoutCross) -> &str {
        &row.id
    }

    fn row_block(row: &KnockoutCross) -> i64 {
        row.block
    }
}
