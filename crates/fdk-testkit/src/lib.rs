//! Deterministic test doubles for the dispatch system.
//!
//! No randomness, no network, no database: [`MemStore`] keeps everything in
//! one mutex-guarded map set, [`CapturingNotifier`] records pushes instead
//! of sending them, and `fixtures` builds entity values with sensible
//! defaults. Scenario tests across the workspace run entirely on these.

pub mod fixtures;
mod mem_store;
mod notifier;

pub use mem_store::MemStore;
pub use notifier::{CapturingNotifier, PushRecord};
