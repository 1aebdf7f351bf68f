//! User-facing transaction history entries and their stable ordering.

use crate::domain::{EthAddress, EthTxHash, PoolLocation};
use crate::tables::{ChangeType, LiqChange, PositionType, Swap};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Swap,
    #[serde(rename = "liqchange")]
    LiqChange,
    LimitOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxChangeType {
    Swap,
    Mint,
    Burn,
    Harvest,
    Recover,
    Claim,
    Cross,
}

impl From<ChangeType> for TxChangeType {
    fn from(change: ChangeType) -> Self {
        match change {
            ChangeType::Mint => TxChangeType::Mint,
            ChangeType::Burn => TxChangeType::Burn,
            ChangeType::Harvest => TxChangeType::Harvest,
            ChangeType::Recover => TxChangeType::Recover,
            ChangeType::Claim => TxChangeType::Claim,
            ChangeType::Cross => TxChangeType::Cross,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTxEvent {
    #[serde(flatten)]
    pub pool: PoolLocation,
    pub user: EthAddress,
    pub tx_hash: EthTxHash,
    pub block_num: i64,
    pub tx_time: i64,
    pub call_index: i64,
    pub entity_type: EntityType,
    pub change_type: TxChangeType,
    /// None for swaps.
    pub position_type: Option<PositionType>,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
    pub is_buy: bool,
    pub in_base_qty: bool,
    pub base_flow: f64,
    pub quote_flow: f64,
}

impl PoolTxEvent {
    pub fn from_swap(swap: &Swap) -> Self {
        PoolTxEvent {
            pool: swap.pool.clone(),
            user: swap.user.clone(),
            tx_hash: swap.tx.clone(),
            block_num: swap.block,
            tx_time: swap.time,
            call_index: swap.call_index,
            entity_type: EntityType::Swap,
            change_type: TxChangeType::Swap,
            position_type: None,
            bid_tick: 0,
            ask_tick: 0,
            is_bid: false,
            is_buy: swap.is_buy,
            in_base_qty: swap.in_base_qty,
            base_flow: swap.base_flow,
            quote_flow: swap.quote_flow,
        }
    }

    /// Knockout changes are reported as limit orders. A bid knockout buys,
    /// paying in base.
    pub fn from_liq_change(change: &LiqChange) -> Self {
        let entity_type = if change.position_type == PositionType::Knockout {
            EntityType::LimitOrder
        } else {
            EntityType::LiqChange
        };
        PoolTxEvent {
            pool: change.pool.clone(),
            user: change.user.clone(),
            tx_hash: change.tx.clone(),
            block_num: change.block,
            tx_time: change.time,
            call_index: change.call_index,
            entity_type,
            change_type: change.change_type.into(),
            position_type: Some(change.position_type),
            bid_tick: change.bid_tick,
            ask_tick: change.ask_tick,
            is_bid: change.is_bid,
            is_buy: change.is_bid,
            in_base_qty: change.is_bid,
            base_flow: change.base_flow,
            quote_flow: change.quote_flow,
        }
    }

    /// Ascending `(tx_time, call_index)` order used by the history lists.
    pub fn comes_before(a: &PoolTxEvent, b: &PoolTxEvent) -> bool {
        (a.tx_time, a.call_index) < (b.tx_time, b.call_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChainId;

    fn event(tx_time: i64, call_index: i64) -> PoolTxEvent {
        let (pool, _) = PoolLocation::canonical(
            ChainId::from_int(1),
            EthAddress::zero(),
            EthAddress::parse("0x00000000000000000000000000000000000000ff").unwrap(),
            420,
        );
        PoolTxEvent {
            pool,
            user: EthAddress::zero(),
            tx_hash: EthTxHash::default(),
            block_num: 1,
            tx_time,
            call_index,
            entity_type: EntityType::Swap,
            change_type: TxChangeType::Swap,
            position_type: None,
            bid_tick: 0,
            ask_tick: 0,
            is_bid: false,
            is_buy: true,
            in_base_qty: false,
            base_flow: 1.0,
            quote_flow: -1.0,
        }
    }

    #[test]
    fn test_ordering_by_time_then_call_index() {
        assert!(PoolTxEvent::comes_before(&event(10, 5), &event(11, 0)));
        assert!(PoolTxEvent::comes_before(&event(10, 0), &event(10, 1)));
        assert!(!PoolTxEvent::comes_before(&event(10, 1), &event(10, 1)));
        assert!(!PoolTxEvent::comes_before(&event(11, 0), &event(10, 9)));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(event(10, 2)).unwrap();
        assert_eq!(json["entityType"], "swap");
        assert_eq!(json["changeType"], "swap");
        assert_eq!(json["txTime"], 10);
        assert_eq!(json["poolIdx"], 420);
        assert_eq!(json["chainId"], "0x1");
        assert!(json["positionType"].is_null());
    }
}
