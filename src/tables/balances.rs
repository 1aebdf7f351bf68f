use super::{de_num_string, parse_addr, parse_int, RowContext, RowError, Table, TableName};
use crate::domain::{EthAddress, EthTxHash};
use serde::Deserialize;

/// A token credited to a user's surplus collateral balance.
#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub id: String,
    pub tx: EthTxHash,
    pub block: i64,
    pub time: i64,
    pub user: EthAddress,
    pub token: EthAddress,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSubgraph {
    pub id: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(deserialize_with = "de_num_string")]
    pub block: String,
    #[serde(deserialize_with = "de_num_string")]
    pub time: String,
    pub user: String,
    pub token: String,
}

pub struct BalancesTable;

impl Table for BalancesTable {
    type Raw = BalanceSubgraph;
    type Row = Balance;

    const NAME: TableName = TableName::Bal;

    fn convert(raw: BalanceSubgraph, ctx: &RowContext) -> Result<Balance, RowError> {
        let id = ctx.composite_id(&raw.id);
        Ok(Balance {
            tx: EthTxHash::new(&raw.transaction_hash),
            block: parse_int(&id, "block", &raw.block)?,
            time: parse_int(&id, "time", &raw.time)?,
            user: parse_addr(&id, "user", &raw.user)?,
            token: parse_addr(&id, "token", &raw.token)?,
            id,
        })
    }

    fn row_id(row: &Balance) -> &str {
        &row.id
    }

    fn row_block(row: &Balance) -> i64 {
        row.block
    }
}
