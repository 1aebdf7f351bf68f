//! Derived domain model: positions, knockouts, liquidity curves and
//! per-pool trading history, plus the flow arithmetic they share.

pub mod apr;
pub mod candle;
pub mod knockout;
pub mod liquidity_curve;
pub mod liquidity_math;
pub mod position_tracker;
pub mod trading_history;
pub mod tx_history;

pub use apr::{calc_apr, AprCalcResult};
pub use candle::{Candle, CandleBuilder};
pub use knockout::{
    KnockoutLiquiditySeries, KnockoutPivotCand, KnockoutSaga, KnockoutSubplot, SharedSubplot,
};
pub use liquidity_curve::{LiquidityBump, LiquidityCurve};
pub use position_tracker::{LiquidityDeltaHist, PositionTracker, SharedPosition};
pub use trading_history::{AccumPoolStats, PoolTradingHistory};
pub use tx_history::{EntityType, PoolTxEvent, TxChangeType};
