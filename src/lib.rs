pub mod api;
pub mod cache;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod refresh;
pub mod sync;
pub mod tables;

pub use cache::MemoryCache;
pub use config::{Config, NetworkConfig};
pub use error::AppError;
pub use orchestration::{Controller, ControllerOverNetwork};
