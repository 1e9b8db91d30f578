//! Build orchestration and output tree layout.

/// Paths inside an assembled mod tree.
pub mod layout;
/// Staged build state machine.
pub mod orchestrator;
