//! Concurrent in-memory storage for the indexed model.

pub mod keyed;
pub mod memory;

pub use keyed::{RwLockMap, RwLockMapArray, RwLockMapMap};
pub use memory::{KnockoutSet, MemoryCache, PositionSet, SharedCurve, SharedHistory};
