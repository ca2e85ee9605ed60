//! # Sitekit Common
//!
//! Logging configuration shared by the Sitekit worker crates and tools.

pub mod logging;

pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat, LoggingError};
