//! Refresh pipeline: debounced, rate-limited on-chain reads that keep the
//! numeric state of positions authoritative.

pub mod handle_refresher;
pub mod handles;
pub mod liquidity_refresher;
pub mod router;

pub use handle_refresher::{is_recent_event, unix_now, window_tag, Clock, HandleRefresher};
pub use handles::{RefreshError, RefreshHandle, RetryPolicy};
pub use liquidity_refresher::{LiquidityRefresher, RefreshConfig};
pub use router::{RefreshMsg, RefreshRouter};
