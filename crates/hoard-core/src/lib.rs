//! Shared types, configuration and errors for the hoard storage engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::HoardConfig;
pub use error::{HoardError, Result};
pub use types::*;
