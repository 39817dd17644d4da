pub mod config;
pub mod error;
pub mod run;

pub use config::{QueueConfig, RunqHome};
pub use error::*;
pub use run::*;
