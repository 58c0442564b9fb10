pub mod config;
pub mod error;
pub mod types;

pub use config::BootConfig;
pub use error::{BootError, BootResult};
pub use types::*;
