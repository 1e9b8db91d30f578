use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::foundation::core::{CancelToken, ensure_parent_dir, partial_path};
use crate::foundation::error::{MoozicError, MoozicResult};

/// Environment variable consulted by [`BackendPolicy::from_env`].
pub const BACKEND_ENV_VAR: &str = "MOOZIC_AUDIO_BACKEND";

/// Canonical output sample rate.
pub const CANONICAL_SAMPLE_RATE: u32 = 44_100;
/// Canonical output channel count.
pub const CANONICAL_CHANNELS: u16 = 2;
/// Vorbis VBR quality in `[-0.1, 1.0]`, matching `ffmpeg -q:a 5`.
pub const VORBIS_QUALITY: f32 = 0.5;

/// Target audio format. Only one canonical format is produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    /// Ogg Vorbis, 44.1 kHz stereo.
    #[default]
    OggVorbis,
}

impl TargetFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::OggVorbis => "ogg",
        }
    }

    /// Short tag used in cache keys.
    pub fn tag(self) -> &'static str {
        match self {
            Self::OggVorbis => "ogg-vorbis-44100-2",
        }
    }
}

/// Conversion backend variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process decode and encode.
    Native,
    /// External converter process (`ffmpeg`).
    External,
}

impl BackendKind {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backends a conversion may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendPolicy {
    /// Native first, external on any native failure.
    #[default]
    Auto,
    /// Native only; failures are not retried elsewhere.
    NativeOnly,
    /// External only.
    ExternalOnly,
}

impl BackendPolicy {
    /// Whether output produced by `kind` is acceptable under this policy.
    pub fn permits(self, kind: BackendKind) -> bool {
        match self {
            Self::Auto => true,
            Self::NativeOnly => kind == BackendKind::Native,
            Self::ExternalOnly => kind == BackendKind::External,
        }
    }

    /// Read [`BACKEND_ENV_VAR`]. Unset or blank means `None`; an unknown value is an error.
    pub fn from_env() -> MoozicResult<Option<Self>> {
        Self::from_env_value(std::env::var(BACKEND_ENV_VAR).ok().as_deref())
    }

    /// Interpret a raw [`BACKEND_ENV_VAR`] value.
    pub fn from_env_value(value: Option<&str>) -> MoozicResult<Option<Self>> {
        match value {
            Some(v) if !v.trim().is_empty() => v.parse().map(Some),
            _ => Ok(None),
        }
    }

    /// Canonical name accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::NativeOnly => "native-only",
            Self::ExternalOnly => "external-only",
        }
    }
}

impl FromStr for BackendPolicy {
    type Err = MoozicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "native-only" | "native_only" | "native" => Ok(Self::NativeOnly),
            "external-only" | "external_only" | "external" | "ffmpeg" => Ok(Self::ExternalOnly),
            other => Err(MoozicError::validation(format!(
                "unknown audio backend policy '{other}' (expected auto, native-only or external-only)"
            ))),
        }
    }
}

impl std::fmt::Display for BackendPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work handed to a backend.
///
/// A single source is a plain conversion; several sources are concatenated in order.
#[derive(Clone, Copy, Debug)]
pub struct ConvertJob<'a> {
    /// Input files, at least one.
    pub sources: &'a [PathBuf],
    /// File the backend must create.
    pub dest: &'a Path,
    /// Output format.
    pub format: TargetFormat,
    /// Cancellation flag of the surrounding build, if any.
    pub cancel: Option<&'a CancelToken>,
}

/// A strategy for turning source audio into canonical audio.
///
/// Implementations write the complete output to `job.dest` or fail. They are shared across worker
/// threads and must not hold per-call state.
pub trait ConversionBackend: Send + Sync {
    /// Variant tag recorded in cache entries.
    fn kind(&self) -> BackendKind;

    /// Whether the backend can run at all (e.g. its binary was found).
    fn is_available(&self) -> bool {
        true
    }

    /// Produce `job.dest` from `job.sources`.
    fn convert(&self, job: &ConvertJob<'_>) -> MoozicResult<()>;
}

/// Construction options shared by the built-in backends.
#[derive(Clone, Debug)]
pub struct BackendOpts {
    /// Bundled converter locations checked before `PATH`.
    pub ffmpeg_candidates: Vec<PathBuf>,
    /// Time limit per external conversion.
    pub timeout: Duration,
    /// Delay between a cancellation request and killing an external process.
    pub cancel_grace: Duration,
}

impl Default for BackendOpts {
    fn default() -> Self {
        Self {
            ffmpeg_candidates: crate::audio::external::default_ffmpeg_candidates(),
            timeout: Duration::from_secs(300),
            cancel_grace: Duration::from_secs(2),
        }
    }
}

/// Create a built-in backend implementation.
pub fn create_backend(kind: BackendKind, opts: &BackendOpts) -> Box<dyn ConversionBackend> {
    match kind {
        BackendKind::Native => Box::new(crate::audio::native::NativeBackend::new()),
        BackendKind::External => Box::new(crate::audio::external::ExternalBackend::new(opts)),
    }
}

/// Applies a [`BackendPolicy`] over one native and one external backend.
///
/// Output is written to a hidden sibling of the destination and renamed into place on success, so
/// the destination either holds a complete file or is untouched.
pub struct Converter {
    native: Box<dyn ConversionBackend>,
    external: Box<dyn ConversionBackend>,
}

impl Converter {
    /// Pair two backends. `native` should report [`BackendKind::Native`] and `external`
    /// [`BackendKind::External`].
    pub fn new(native: Box<dyn ConversionBackend>, external: Box<dyn ConversionBackend>) -> Self {
        Self { native, external }
    }

    /// Converter over the built-in backends.
    pub fn with_opts(opts: &BackendOpts) -> Self {
        Self::new(
            create_backend(BackendKind::Native, opts),
            create_backend(BackendKind::External, opts),
        )
    }

    fn backend(&self, kind: BackendKind) -> &dyn ConversionBackend {
        match kind {
            BackendKind::Native => self.native.as_ref(),
            BackendKind::External => self.external.as_ref(),
        }
    }

    /// Convert one source to `dest`. Returns the backend that produced the file.
    pub fn convert(
        &self,
        source: &Path,
        dest: &Path,
        format: TargetFormat,
        policy: BackendPolicy,
        cancel: Option<&CancelToken>,
    ) -> MoozicResult<BackendKind> {
        self.run(&[source.to_path_buf()], dest, format, policy, cancel)
    }

    /// Concatenate `sources` in order into one canonical file at `dest`.
    pub fn stitch(
        &self,
        sources: &[PathBuf],
        dest: &Path,
        format: TargetFormat,
        policy: BackendPolicy,
        cancel: Option<&CancelToken>,
    ) -> MoozicResult<BackendKind> {
        self.run(sources, dest, format, policy, cancel)
    }

    fn run(
        &self,
        sources: &[PathBuf],
        dest: &Path,
        format: TargetFormat,
        policy: BackendPolicy,
        cancel: Option<&CancelToken>,
    ) -> MoozicResult<BackendKind> {
        if sources.is_empty() {
            return Err(MoozicError::validation("conversion needs at least one source"));
        }
        ensure_parent_dir(dest)?;

        match policy {
            BackendPolicy::NativeOnly => {
                self.attempt(BackendKind::Native, sources, dest, format, cancel)?;
                Ok(BackendKind::Native)
            }
            BackendPolicy::ExternalOnly => {
                self.attempt(BackendKind::External, sources, dest, format, cancel)?;
                Ok(BackendKind::External)
            }
            BackendPolicy::Auto => {
                let native_err =
                    match self.attempt(BackendKind::Native, sources, dest, format, cancel) {
                        Ok(()) => return Ok(BackendKind::Native),
                        Err(e) => e,
                    };
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    return Err(native_err);
                }
                tracing::warn!(
                    source = %sources[0].display(),
                    error = %native_err,
                    "native conversion failed; falling back to external converter"
                );
                match self.attempt(BackendKind::External, sources, dest, format, cancel) {
                    Ok(()) => Ok(BackendKind::External),
                    Err(e @ MoozicError::Timeout { .. }) => Err(e),
                    Err(external_err) => Err(MoozicError::conversion(format!(
                        "native: {native_err}; external: {external_err}"
                    ))),
                }
            }
        }
    }

    fn attempt(
        &self,
        kind: BackendKind,
        sources: &[PathBuf],
        dest: &Path,
        format: TargetFormat,
        cancel: Option<&CancelToken>,
    ) -> MoozicResult<()> {
        let backend = self.backend(kind);
        if !backend.is_available() {
            return Err(MoozicError::conversion(format!("{kind} backend is unavailable")));
        }

        let partial = partial_path(dest);
        let job = ConvertJob {
            sources,
            dest: &partial,
            format,
            cancel,
        };
        let res = backend.convert(&job).and_then(|()| {
            if !partial.is_file() {
                return Err(MoozicError::conversion(format!(
                    "{kind} backend reported success but wrote no output"
                )));
            }
            std::fs::rename(&partial, dest).map_err(|e| MoozicError::io(dest, e))
        });
        if res.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        res
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/backend.rs"]
mod tests;
