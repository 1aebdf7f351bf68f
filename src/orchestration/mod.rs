pub mod controller;
pub mod supervise;

pub use controller::{
    Controller, ControllerError, ControllerOverNetwork, Ingest, N_POSITIONS_REFRESH_ON_SWAP,
};
pub use supervise::{first_task_exit, TaskExit};
