//! Logging initialisation for the API server.

pub mod tracer;

pub use tracer::{init_logging, LoggingConfig};
