//! Shared primitives: errors, identifiers, cancellation, pixel math.

/// Identifier rules, cancellation and filesystem helpers.
pub mod core;
/// Error taxonomy.
pub mod error;
pub(crate) mod math;
