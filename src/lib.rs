//! moozic builds Project Zomboid music mods from a list of tracks and cover images.
//!
//! A build runs as a staged pipeline:
//!
//! - Load and validate a [`ModProject`]
//! - Convert every track to canonical Ogg Vorbis through the [`ConversionCache`]
//! - Composite cover textures with the [`Compositor`]
//! - Generate scripts and metadata, then assemble `<output>/<mod_id>/`
//!
//! [`BuildOrchestrator`] drives all of it; the pieces are usable on their own as well.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Audio conversion backends and cache.
pub mod audio;
/// Build orchestration and output layout.
pub mod build;
/// Build options.
pub mod config;
/// Cover compositing.
pub mod cover;
/// Definition text generation.
pub mod definitions;
mod foundation;
/// Project data model.
pub mod project;

pub use crate::audio::backend::{
    BACKEND_ENV_VAR, BackendKind, BackendOpts, BackendPolicy, ConversionBackend, ConvertJob,
    Converter, TargetFormat, create_backend,
};
pub use crate::audio::cache::{CacheEntry, CachedAudio, ConversionCache};
pub use crate::audio::external::{BinaryLocator, ExternalBackend};
pub use crate::audio::fingerprint::{Fingerprint, FingerprintMode, fingerprint_file};
pub use crate::audio::native::NativeBackend;
pub use crate::build::layout::ModLayout;
pub use crate::build::orchestrator::{
    BuildEvent, BuildHandle, BuildOrchestrator, BuildResult, BuildStage, BuildStatus,
    CoverOutcome, CoverTarget, TrackAudio, TrackOutcome,
};
pub use crate::config::BuildConfig;
pub use crate::cover::compositor::{Compositor, CoverSelection, DefaultCoverPool, Texture};
pub use crate::cover::mask::MaskVariant;
pub use crate::definitions::generate::{Definitions, ReadyOutputs, generate};
pub use crate::foundation::core::{CancelToken, sanitize_id, validate_mod_id};
pub use crate::foundation::error::{CoverError, MoozicError, MoozicResult};
pub use crate::project::model::{
    CoverSource, CoverSpec, ModProject, OutputKind, ResolutionTier, Track, TrackStatus,
};
