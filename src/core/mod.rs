//! Core types: errors, configuration, logging

pub mod types;
pub mod error;
pub mod config;
pub mod logging;

pub use types::*;
pub use error::Error;
pub use config::{SubtreeConfig, MAX_SUBTREE_LEVELS};
