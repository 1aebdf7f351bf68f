use super::{
    de_num_string, parse_int, parse_pool, RawPool, RowContext, RowError, Table, TableName,
};
use crate::domain::{EthTxHash, PoolLocation};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct FeeChange {
    pub id: String,
    pub tx: EthTxHash,
    pub call_index: i64,
    pub pool: PoolLocation,
    pub block: i64,
    pub time: i64,
    /// Raw on-chain fee rate, in units of 1/1_000_000.
    pub fee_rate: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeChangeSubgraph {
    pub id: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub call_index: i64,
    pub pool: RawPool,
    #[serde(deserialize_with = "de_num_string")]
    pub block: String,
    #[serde(deserialize_with = "de_num_string")]
    pub time: String,
    #[serde(default)]
    pub fee_rate: i64,
}

pub struct FeeChangesTable;

impl Table for FeeChangesTable {
    type Raw = FeeChangeSubgraph;
    type Row = FeeChange;

    const NAME: TableName = TableName::Fee;

    fn convert(raw: FeeChangeSubgraph, ctx: &RowContext) -> Result<FeeChange, RowError> {
        let id = ctx.composite_id(&raw.id);
        let (pool, _, _) = parse_pool(&id, &raw.pool, ctx, 0.0, 0.0)?;

        Ok(FeeChange {
            tx: EthTxHash::new(&raw.transaction_hash),
            call_index: raw.call_index,
            block: parse_int(&id, "block", &raw.block)?,
            time: parse_int(&id, "time", &raw.time)?,
            fee_rate: raw.fee_rate,
            pool,
            id,
        })
    }

    fn row_id(row: &FeeChange) -> &str {
        &row.id
    }

    fn row_block(row: &FeeChange) -> i64 {
        row.block
    }
}
