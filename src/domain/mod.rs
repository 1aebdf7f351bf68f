//! Domain identifiers and the composite keys the caches are indexed by.

pub mod locations;
pub mod primitives;

pub use locations::{
    BookLocation, ChainAndAddr, KOClaimLocation, LiquidityLocation, PoolLocation,
    PositionLocation, UserAndPool,
};
pub use primitives::{AddressParseError, ChainId, EthAddress, EthTxHash, NetworkName};
