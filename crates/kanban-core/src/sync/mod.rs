//! Remote synchronisation
//!
//! Local writes are immediate; remote writes go through a [`SyncEngine`],
//! which debounces bursts of mutations into one save of the newest snapshot
//! and coalesces saves requested while another is still in flight.

pub mod debounce;
pub mod engine;

pub use debounce::Debouncer;
pub use engine::{SaveOutcome, SyncEngine, SyncStatus};
