//! Audio conversion: fingerprints, backends and the conversion cache.

/// Backend trait, policy and the policy-applying [`backend::Converter`].
pub mod backend;
/// Persistent conversion cache.
pub mod cache;
/// External converter process (`ffmpeg`).
pub mod external;
/// Source file fingerprints.
pub mod fingerprint;
/// In-process decode, resample and Vorbis encode.
pub mod native;
