//! Common infrastructure shared by the CallVita crates.
//!
//! Only binaries install a subscriber; library crates emit `tracing`
//! events and leave the choice of output to the host.

pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
pub use logging::setup::{log_welcome, parse_log_level, setup_logging, LoggingConfig};
