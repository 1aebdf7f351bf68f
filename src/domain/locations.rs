//! Composite keys addressing pools, positions, knockout books and claims.

use super::primitives::{ChainId, EthAddress};
use serde::{Deserialize, Serialize};

/// A pool on one chain. `base < quote` in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolLocation {
    pub chain_id: ChainId,
    pub base: EthAddress,
    pub quote: EthAddress,
    pub pool_idx: u64,
}

impl PoolLocation {
    /// Build a pool location, swapping base and quote into canonical order.
    /// Returns whether the pair was flipped so callers can flip flows too.
    pub fn canonical(
        chain_id: ChainId,
        base: EthAddress,
        quote: EthAddress,
        pool_idx: u64,
    ) -> (Self, bool) {
        let flipped = base > quote;
        let (base, quote) = if flipped { (quote, base) } else { (base, quote) };
        (
            PoolLocation {
                chain_id,
                base,
                quote,
                pool_idx,
            },
            flipped,
        )
    }
}

/// Tick range of a position. Ambient positions are `(0, 0, false)`; range
/// positions never set `is_bid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityLocation {
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
}

impl LiquidityLocation {
    pub fn ambient() -> Self {
        LiquidityLocation::default()
    }

    pub fn range(bid_tick: i32, ask_tick: i32) -> Self {
        LiquidityLocation {
            bid_tick,
            ask_tick,
            is_bid: false,
        }
    }

    pub fn knockout(bid_tick: i32, ask_tick: i32, is_bid: bool) -> Self {
        LiquidityLocation {
            bid_tick,
            ask_tick,
            is_bid,
        }
    }

    pub fn is_ambient(&self) -> bool {
        self.bid_tick == 0 && self.ask_tick == 0
    }

    /// The tick a knockout order sits at: its bid tick for bids, ask tick for asks.
    pub fn pivot_tick(&self) -> i32 {
        if self.is_bid {
            self.bid_tick
        } else {
            self.ask_tick
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionLocation {
    #[serde(flatten)]
    pub pool: PoolLocation,
    #[serde(flatten)]
    pub liq: LiquidityLocation,
    pub user: EthAddress,
}

impl PositionLocation {
    pub fn new(pool: PoolLocation, liq: LiquidityLocation, user: EthAddress) -> Self {
        PositionLocation { pool, liq, user }
    }

    pub fn to_book_loc(&self) -> BookLocation {
        BookLocation {
            pool: self.pool.clone(),
            bid_tick: self.liq.bid_tick,
            ask_tick: self.liq.ask_tick,
            is_bid: self.liq.is_bid,
        }
    }

    pub fn to_claim_loc(&self, pivot_time: i64) -> KOClaimLocation {
        KOClaimLocation {
            pos: self.clone(),
            pivot_time,
        }
    }
}

/// The knockout order book at one side and tick range, across all users.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLocation {
    #[serde(flatten)]
    pub pool: PoolLocation,
    pub bid_tick: i32,
    pub ask_tick: i32,
    pub is_bid: bool,
}

impl BookLocation {
    /// Book for a knockout cross at `tick`, given the chain's knockout width.
    pub fn from_cross(pool: PoolLocation, tick: i32, is_bid: bool, tick_width: i32) -> Self {
        let (bid_tick, ask_tick) = if is_bid {
            (tick, tick + tick_width)
        } else {
            (tick - tick_width, tick)
        };
        BookLocation {
            pool,
            bid_tick,
            ask_tick,
            is_bid,
        }
    }

    pub fn to_position_loc(&self, user: EthAddress) -> PositionLocation {
        PositionLocation {
            pool: self.pool.clone(),
            liq: LiquidityLocation::knockout(self.bid_tick, self.ask_tick, self.is_bid),
            user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KOClaimLocation {
    #[serde(flatten)]
    pub pos: PositionLocation,
    pub pivot_time: i64,
}

/// Key for the per-user indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainAndAddr {
    pub chain_id: ChainId,
    pub user: EthAddress,
}

impl ChainAndAddr {
    pub fn new(chain_id: ChainId, user: EthAddress) -> Self {
        ChainAndAddr { chain_id, user }
    }
}

/// Key for the per-user-per-pool indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserAndPool {
    pub user: EthAddress,
    pub pool: PoolLocation,
}

impl UserAndPool {
    pub fn new(user: EthAddress, pool: PoolLocation) -> Self {
        UserAndPool { user, pool }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> EthAddress {
        EthAddress::parse(&format!("0x{:040x}", last)).unwrap()
    }

    #[test]
    fn test_canonical_pool_flips_reversed_pair() {
        let (pool, flipped) = PoolLocation::canonical(ChainId::from_int(1), addr(9), addr(2), 420);
        assert!(flipped);
        assert_eq!(pool.base, addr(2));
        assert_eq!(pool.quote, addr(9));

        let (_, flipped) = PoolLocation::canonical(ChainId::from_int(1), addr(2), addr(9), 420);
        assert!(!flipped);
    }

    #[test]
    fn test_book_from_cross_uses_tick_width() {
        let (pool, _) = PoolLocation::canonical(ChainId::from_int(1), addr(1), addr(2), 36000);
        let bid = BookLocation::from_cross(pool.clone(), -250, true, 16);
        assert_eq!((bid.bid_tick, bid.ask_tick), (-250, -234));
        let ask = BookLocation::from_cross(pool, -250, false, 16);
        assert_eq!((ask.bid_tick, ask.ask_tick), (-266, -250));
    }

    #[test]
    fn test_book_position_round_trip() {
        let (pool, _) = PoolLocation::canonical(ChainId::from_int(1), addr(1), addr(2), 36000);
        let book = BookLocation::from_cross(pool, 100, false, 8);
        let pos = book.to_position_loc(addr(7));
        assert_eq!(pos.to_book_loc(), book);
        assert_eq!(pos.liq.pivot_tick(), 100);
    }
}
