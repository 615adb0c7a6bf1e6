//! Observability support
//!
//! The library itself only emits `tracing` events; subscriber setup lives
//! here for binaries that want the stock configuration.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
