use super::{
    de_num_string, parse_addr, parse_float, parse_int, parse_pool, RawPool, RowContext, RowError,
    Table, TableName,
};
use crate::domain::{EthAddress, EthTxHash, LiquidityLocation, PoolLocation, PositionLocation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Mint,
    Burn,
    Harvest,
    Recover,
    Claim,
    Cross,
}

impl ChangeType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "mint" => Some(ChangeType::Mint),
            "burn" => Some(ChangeType::Burn),
            "harvest" => Some(ChangeType::Harvest),
            "recover" => Some(ChangeType::Recover),
            "claim" => Some(ChangeType::Claim),
            "cross" => Some(ChangeType::Cross),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Ambient,
    Concentrated,
    Knockout,
}

impl PositionType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "ambient" => Some(PositionType::Ambient),
            "concentrated" => Some(PositionType::Concentrated),
            "knockout" => Some(PositionType::Knockout),
            _ => None,
        }
    }
}

/// A liquidity mint, burn, harvest, recover, claim or knockout cross.
#[derive(Debug, Clone, PartialEq)]
pub struct LiqChange {
    pub id: String,
    pub tx: EthTxHash,
    pub call_index: i64,
    pub pool: PoolLocation,
    pub user: EthAddress,
    pub block: i64,
    pub time: i64,
    pub position_type: PositionType,
    pub change_type: ChangeType,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
    pub liq: f64,
    pub base_flow: f64,
    pub quote_flow: f64,
    pub pivot_time: Option<i64>,
}

impl LiqChange {
    pub fn liq_location(&self) -> LiquidityLocation {
        match self.position_type {
            PositionType::Ambient => LiquidityLocation::ambient(),
            PositionType::Concentrated => LiquidityLocation::range(self.bid_tick, self.ask_tick),
            PositionType::Knockout => {
                LiquidityLocation::knockout(self.bid_tick, self.ask_tick, self.is_bid)
            }
        }
    }

    pub fn position_location(&self) -> PositionLocation {
        PositionLocation::new(self.pool.clone(), self.liq_location(), self.user.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiqChangeSubgraph {
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
    pub position_type: String,
    pub change_type: String,
    #[serde(default)]
    pub bid_tick: i32,
    #[serde(default)]
    pub ask_tick: i32,
    #[serde(default)]
    pub is_bid: bool,
    #[serde(default, deserialize_with = "de_num_string")]
    pub liq: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub base_flow: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub quote_flow: String,
    #[serde(default, deserialize_with = "de_num_string")]
    pub pivot_time: String,
}

pub struct LiqChangesTable;

impl Table for LiqChangesTable {
    type Raw = LiqChangeSubgraph;
    type Row = LiqChange;

    const NAME: TableName = TableName::Liq;

    fn convert(raw: LiqChangeSubgraph, ctx: &RowContext) -> Result<LiqChange, RowError> {
        let id = ctx.composite_id(&raw.id);
        let base_flow = parse_float(&id, "baseFlow", &raw.base_flow)?;
        let quote_flow = parse_float(&id, "quoteFlow", &raw.quote_flow)?;
        let (pool, base_flow, quote_flow) = parse_pool(&id, &raw.pool, ctx, base_flow, quote_flow)?;

        let change_type =
            ChangeType::parse(&raw.change_type).ok_or_else(|| RowError::InvalidField {
                id: id.clone(),
                field: "changeType",
                value: raw.change_type.clone(),
            })?;
        let position_type =
            PositionType::parse(&raw.position_type).ok_or_else(|| RowError::InvalidField {
                id: id.clone(),
                field: "positionType",
                value: raw.position_type.clone(),
            })?;

        let pivot_time = if raw.pivot_time.trim().is_empty() {
            None
        } else {
            Some(parse_int(&id, "pivotTime", &raw.pivot_time)?)
        };

        Ok(LiqChange {
            tx: EthTxHash::new(&raw.transaction_hash),
            call_index: raw.call_index,
            user: parse_addr(&id, "user", &raw.user)?,
            block: parse_int(&id, "block", &raw.block)?,
            time: parse_int(&id, "time", &raw.time)?,
            position_type,
            change_type,
            bid_tick: raw.bid_tick,
            ask_tick: raw.ask_tick,
            is_bid: raw.is_bid,
            liq: parse_float(&id, "liq", &raw.liq)?,
            base_flow,
            quote_flow,
            pivot_time,
            pool,
            id,
        })
    }

    fn row_id(row: &LiqChange) -> &str {
        &row.id
    }

    fn row_block(row: &LiqChange) -> i64 {
        row.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainId, NetworkName};

    fn raw_json() -> serde_json::Value {
        serde_json::json!({
            "id": "0xabc-7",
            "transactionHash": format!("0x{}", "1".repeat(64)),
            "callIndex": 2,
            "user": "0x00000000000000000000000000000000000000AA",
            "pool": {
                "base": "0x0000000000000000000000000000000000000000",
                "quote": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "poolIdx": "420"
            },
            "block": "17000000",
            "time": 1690000000,
            "positionType": "knockout",
            "changeType": "mint",
            "bidTick": -250,
            "askTick": -234,
            "isBid": true,
            "liq": "1000",
            "baseFlow": "250000",
            "quoteFlow": "",
            "pivotTime": null
        })
    }

    #[test]
    fn test_convert_liq_change() {
        let raw: LiqChangeSubgraph = serde_json::from_value(raw_json()).unwrap();
        let ctx = RowContext::new(NetworkName::new("ethereum"), ChainId::from_int(1));
        let row = LiqChangesTable::convert(raw, &ctx).unwrap();

        assert_eq!(row.id, "ethereum0xabc-7");
        assert_eq!(row.block, 17000000);
        assert_eq!(row.time, 1690000000);
        assert_eq!(row.change_type, ChangeType::Mint);
        assert_eq!(row.position_type, PositionType::Knockout);
        assert_eq!(row.base_flow, 250000.0);
        assert_eq!(row.quote_flow, 0.0);
        assert_eq!(row.pivot_time, None);
        assert_eq!(row.user.as_str(), "0x00000000000000000000000000000000000000aa");
        assert_eq!(row.liq_location(), LiquidityLocation::knockout(-250, -234, true));
    }

    #[test]
    fn test_convert_rejects_unknown_change_type() {
        let mut json = raw_json();
        json["changeType"] = serde_json::json!("teleport");
        let raw: LiqChangeSubgraph = serde_json::from_value(json).unwrap();
        let ctx = RowContext::new(NetworkName::new("ethereum"), ChainId::from_int(1));
        assert!(LiqChangesTable::convert(raw, &ctx).is_err());
    }

    #[test]
    fn test_concentrated_location_drops_is_bid() {
        let mut json = raw_json();
        json["positionType"] = serde_json::json!("concentrated");
        let raw: LiqChangeSubgraph = serde_json::from_value(json).unwrap();
        let ctx = RowContext::new(NetworkName::new("ethereum"), ChainId::from_int(1));
        let row = LiqChangesTable::convert(raw, &ctx).unwrap();
        assert_eq!(row.liq_location(), LiquidityLocation::range(-250, -234));
    }
}
