//! Shared utilities for the Quire storage engine.

pub mod logging;

pub use logging::{try_init_logging, LogFormat};
