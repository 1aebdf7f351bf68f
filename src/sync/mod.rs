pub mod channel;
pub mod combined;
pub mod startup_cache;

pub use channel::{IngestOutcome, SyncChannel, SyncError};
pub use combined::{CombinedSyncer, SyncStep, SOURCE_RETRY_WAIT};
pub use startup_cache::{load_startup_cache, ChunkName, StartupCacheError, StartupCacheProvider};
