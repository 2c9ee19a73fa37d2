//! Progress event distribution for the backup engine.
//!
//! The orchestrator publishes a [`keeper_core::BackupProgress`] snapshot after
//! every pipeline step; streaming transports (SSE, websocket) subscribe here.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryEventBus, InMemoryBusError};

/// Bus type carried through the engine: progress snapshots, fan-out to all
/// subscribers.
pub type ProgressBus = InMemoryEventBus<keeper_core::BackupProgress>;
