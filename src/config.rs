use std::path::PathBuf;
use std::time::Duration;

use crate::audio::backend::{BackendOpts, BackendPolicy};
use crate::audio::external::default_ffmpeg_candidates;
use crate::audio::fingerprint::FingerprintMode;
use crate::cover::compositor::CoverSelection;
use crate::foundation::error::{MoozicError, MoozicResult};

/// Upper bound on the default worker count, so external converters are not oversubscribed.
pub const MAX_DEFAULT_THREADS: usize = 8;

/// Options for one build invocation.
///
/// Build it with [`BuildConfig::default`] (or [`BuildConfig::from_env`] to honour
/// `MOOZIC_AUDIO_BACKEND`) and override fields as needed.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Directory the `<mod_id>/` tree is assembled under.
    pub output_dir: PathBuf,
    /// Conversion cache root.
    pub cache_dir: PathBuf,
    /// Holds `masks/`, `covers/`, `poster/` and `models_X/`.
    pub assets_root: PathBuf,
    /// Backend selection policy.
    pub policy: BackendPolicy,
    /// Reconvert every track even when the cache holds a valid entry.
    pub force: bool,
    /// Worker threads. `None` uses `min(2 x cores, 8)`.
    pub threads: Option<usize>,
    /// Time limit per external conversion.
    pub convert_timeout: Duration,
    /// Delay between cancellation and killing an external conversion.
    pub cancel_grace: Duration,
    /// How source fingerprints are computed.
    pub fingerprint_mode: FingerprintMode,
    /// How default covers are chosen.
    pub cover_selection: CoverSelection,
    /// Bundled converter locations checked before `PATH`.
    pub ffmpeg_candidates: Vec<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("OUTPUT"),
            cache_dir: PathBuf::from(".moozic-cache"),
            assets_root: PathBuf::from("assets"),
            policy: BackendPolicy::Auto,
            force: false,
            threads: None,
            convert_timeout: Duration::from_secs(300),
            cancel_grace: Duration::from_secs(2),
            fingerprint_mode: FingerprintMode::Metadata,
            cover_selection: CoverSelection::default(),
            ffmpeg_candidates: default_ffmpeg_candidates(),
        }
    }
}

impl BuildConfig {
    /// Defaults with the backend policy taken from the environment when set.
    pub fn from_env() -> MoozicResult<Self> {
        let mut cfg = Self::default();
        if let Some(policy) = BackendPolicy::from_env()? {
            cfg.policy = policy;
        }
        Ok(cfg)
    }

    /// Check option ranges.
    pub fn validate(&self) -> MoozicResult<()> {
        if self.threads == Some(0) {
            return Err(MoozicError::validation(
                "build 'threads' must be >= 1 when set",
            ));
        }
        if self.convert_timeout.is_zero() {
            return Err(MoozicError::validation(
                "conversion timeout must be non-zero",
            ));
        }
        Ok(())
    }

    /// Worker count actually used.
    pub fn effective_threads(&self) -> usize {
        match self.threads {
            Some(n) => n,
            None => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (cores * 2).clamp(1, MAX_DEFAULT_THREADS)
            }
        }
    }

    /// Options for the built-in conversion backends.
    pub fn backend_opts(&self) -> BackendOpts {
        BackendOpts {
            ffmpeg_candidates: self.ffmpeg_candidates.clone(),
            timeout: self.convert_timeout,
            cancel_grace: self.cancel_grace,
        }
    }

    /// Mask directory.
    pub fn masks_dir(&self) -> PathBuf {
        self.assets_root.join("masks")
    }

    /// Default cover pool directory.
    pub fn covers_dir(&self) -> PathBuf {
        self.assets_root.join("covers")
    }

    /// Built-in poster used when a project has none.
    pub fn default_poster(&self) -> PathBuf {
        self.assets_root.join("poster").join("poster.png")
    }

    /// World item meshes copied into mods without a parent.
    pub fn models_dir(&self) -> PathBuf {
        self.assets_root.join("models_X").join("WorldItems")
    }

    /// Built-in mod icon.
    pub fn default_icon(&self) -> PathBuf {
        self.assets_root.join("poster").join("icon.png")
    }

    /// Final tree location for `mod_id`.
    pub fn tree_dir(&self, mod_id: &str) -> PathBuf {
        self.output_dir.join(mod_id)
    }

    /// Staging directory used while assembling `mod_id`.
    pub fn staging_dir(&self, mod_id: &str) -> PathBuf {
        self.output_dir
            .join(format!(".{mod_id}.staging-{}", std::process::id()))
    }

    /// Where the previous tree of `mod_id` waits while the new one is swapped in.
    pub fn retired_dir(&self, mod_id: &str) -> PathBuf {
        self.output_dir
            .join(format!(".{mod_id}.old-{}", std::process::id()))
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
