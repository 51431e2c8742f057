//! Logging setup and timing helpers.

mod logging;
mod timer;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timer::SpanTimer;
