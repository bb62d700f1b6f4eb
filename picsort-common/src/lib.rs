//! # picsort common library
//!
//! Shared code for the picsort workspace:
//! - Error and result types
//! - Layered configuration (defaults, TOML, environment, CLI)
//! - Logging bootstrap

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigLayer, SortConfig};
pub use error::{Error, Result};
