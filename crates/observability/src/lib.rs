//! Process-wide observability wiring.

mod tracing_init;

pub use tracing_init::init;
