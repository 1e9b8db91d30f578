//! Cover texture generation.

/// Mask compositing and the default cover pool.
pub mod compositor;
/// Mask variants and key-colour regions.
pub mod mask;
/// Workshop poster and preview images.
pub mod poster;
