use std::fs::File;
use std::io::{BufWriter, Write};
use std::num::{NonZeroU8, NonZeroU32};
use std::path::Path;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use vorbis_rs::{VorbisBitrateManagementStrategy, VorbisEncoderBuilder};

use crate::audio::backend::{
    BackendKind, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE, ConversionBackend, ConvertJob,
    TargetFormat, VORBIS_QUALITY,
};
use crate::foundation::core::CancelToken;
use crate::foundation::error::{MoozicError, MoozicResult};

/// Extensions the in-process decoder handles. Anything else is left to the external converter.
pub const NATIVE_EXTENSIONS: &[&str] = &["ogg", "oga", "mp3", "flac", "wav"];

const ENCODE_BLOCK_FRAMES: usize = 4096;
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Decoded audio as two planar channels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StereoPcm {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Left channel.
    pub left: Vec<f32>,
    /// Right channel.
    pub right: Vec<f32>,
}

impl StereoPcm {
    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Append `other`, which must share the sample rate.
    pub fn append(&mut self, other: StereoPcm) {
        self.left.extend(other.left);
        self.right.extend(other.right);
    }
}

/// In-process backend: symphonia decode, rubato resample, Vorbis encode.
#[derive(Clone, Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }

    /// Whether `path` has an extension the decoder handles.
    pub fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| NATIVE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl ConversionBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn convert(&self, job: &ConvertJob<'_>) -> MoozicResult<()> {
        if let Some(unsupported) = job.sources.iter().find(|p| !Self::supports(p)) {
            let ext = unsupported
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(MoozicError::conversion(format!(
                "native decoder does not handle '.{ext}' files ('{}')",
                unsupported.display()
            )));
        }

        let mut pcm = StereoPcm {
            sample_rate: CANONICAL_SAMPLE_RATE,
            ..StereoPcm::default()
        };
        for source in job.sources {
            let decoded = decode_stereo(source, job.cancel)?;
            pcm.append(resample_stereo(decoded, CANONICAL_SAMPLE_RATE)?);
        }
        if pcm.frames() == 0 {
            return Err(MoozicError::conversion(format!(
                "'{}' decoded to no audio",
                job.sources[0].display()
            )));
        }

        match job.format {
            TargetFormat::OggVorbis => encode_vorbis(&pcm, job.dest, job.cancel),
        }
    }
}

/// Decode the default track of `path`, mapped to stereo at its native rate.
///
/// Mono is duplicated into both channels; extra channels beyond the first two are dropped.
#[tracing::instrument(skip(cancel))]
pub fn decode_stereo(path: &Path, cancel: Option<&CancelToken>) -> MoozicResult<StereoPcm> {
    let file = File::open(path).map_err(|e| MoozicError::io(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            MoozicError::conversion(format!("probe '{}': {e}", path.display()))
        })?;
    let mut format = probed.format;

    let track = format.default_track().ok_or_else(|| {
        MoozicError::conversion(format!("'{}' has no audio track", path.display()))
    })?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(CANONICAL_SAMPLE_RATE);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| {
            MoozicError::conversion(format!("create decoder for '{}': {e}", path.display()))
        })?;

    let mut out = StereoPcm::default();
    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(MoozicError::conversion("cancelled"));
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(MoozicError::conversion(format!(
                    "read '{}': {e}",
                    path.display()
                )));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(path = %path.display(), error = e, "skipping corrupt packet");
                continue;
            }
            Err(e) => {
                return Err(MoozicError::conversion(format!(
                    "decode '{}': {e}",
                    path.display()
                )));
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let channels = spec.channels.count();
        if channels == 0 {
            continue;
        }
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(channels) {
            let l = frame[0];
            let r = if channels > 1 { frame[1] } else { frame[0] };
            out.left.push(l);
            out.right.push(r);
        }
    }

    out.sample_rate = sample_rate;
    Ok(out)
}

/// Resample both channels to `to_rate`.
pub fn resample_stereo(pcm: StereoPcm, to_rate: u32) -> MoozicResult<StereoPcm> {
    if pcm.sample_rate == to_rate || pcm.frames() == 0 {
        return Ok(StereoPcm {
            sample_rate: to_rate,
            ..pcm
        });
    }
    if pcm.sample_rate == 0 {
        return Err(MoozicError::conversion("source reports a 0 Hz sample rate"));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        pcm.sample_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK_FRAMES,
        2,
        usize::from(CANONICAL_CHANNELS),
    )
    .map_err(|e| MoozicError::conversion(format!("create resampler: {e}")))?;

    let expected =
        (pcm.frames() as f64 * f64::from(to_rate) / f64::from(pcm.sample_rate)).round() as usize;
    // The first `delay` output frames precede the first input frame.
    let delay = resampler.output_delay();
    let needed = delay + expected;
    let mut left = Vec::with_capacity(needed + 2 * RESAMPLE_CHUNK_FRAMES);
    let mut right = Vec::with_capacity(needed + 2 * RESAMPLE_CHUNK_FRAMES);

    // Past the end of the input, zero chunks flush the tail held back by the delay.
    let mut pos = 0;
    while left.len() < needed {
        let want = resampler.input_frames_next();
        let start = pos.min(pcm.frames());
        let end = (pos + want).min(pcm.frames());
        let mut l = pcm.left[start..end].to_vec();
        let mut r = pcm.right[start..end].to_vec();
        l.resize(want, 0.0);
        r.resize(want, 0.0);
        let input = vec![l, r];
        let chunk = resampler
            .process(&input, None)
            .map_err(|e| MoozicError::conversion(format!("resample: {e}")))?;
        left.extend_from_slice(&chunk[0]);
        right.extend_from_slice(&chunk[1]);
        pos += want;
    }
    left.truncate(needed);
    right.truncate(needed);
    left.drain(..delay);
    right.drain(..delay);

    Ok(StereoPcm {
        sample_rate: to_rate,
        left,
        right,
    })
}

/// Encode `pcm` as Ogg Vorbis at `dest`.
pub fn encode_vorbis(pcm: &StereoPcm, dest: &Path, cancel: Option<&CancelToken>) -> MoozicResult<()> {
    let rate = NonZeroU32::new(pcm.sample_rate)
        .ok_or_else(|| MoozicError::conversion("cannot encode at 0 Hz"))?;
    let channels = NonZeroU8::new(CANONICAL_CHANNELS as u8)
        .ok_or_else(|| MoozicError::conversion("cannot encode 0 channels"))?;

    let file = File::create(dest).map_err(|e| MoozicError::io(dest, e))?;
    let sink = BufWriter::new(file);
    let mut builder = VorbisEncoderBuilder::new(rate, channels, sink)
        .map_err(|e| MoozicError::conversion(format!("vorbis encoder: {e}")))?;
    builder.bitrate_management_strategy(VorbisBitrateManagementStrategy::QualityVbr {
        target_quality: VORBIS_QUALITY,
    });
    let mut encoder = builder
        .build()
        .map_err(|e| MoozicError::conversion(format!("vorbis encoder: {e}")))?;

    for (l, r) in pcm
        .left
        .chunks(ENCODE_BLOCK_FRAMES)
        .zip(pcm.right.chunks(ENCODE_BLOCK_FRAMES))
    {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(MoozicError::conversion("cancelled"));
        }
        encoder
            .encode_audio_block([l, r])
            .map_err(|e| MoozicError::conversion(format!("vorbis encode: {e}")))?;
    }

    let mut sink = encoder
        .finish()
        .map_err(|e| MoozicError::conversion(format!("vorbis finish: {e}")))?;
    sink.flush().map_err(|e| MoozicError::io(dest, e))
}

#[cfg(test)]
#[path = "../../tests/unit/audio/native.rs"]
mod tests;
