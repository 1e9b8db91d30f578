use super::*;
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "moozic_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * f32::from(i16::MAX)) as i16;
        for _ in 0..channels {
            w.write_sample(v).unwrap();
        }
    }
    w.finalize().unwrap();
}

#[test]
fn supports_known_extensions_only() {
    assert!(NativeBackend::supports(Path::new("a.MP3")));
    assert!(NativeBackend::supports(Path::new("dir/a.flac")));
    assert!(!NativeBackend::supports(Path::new("a.m4a")));
    assert!(!NativeBackend::supports(Path::new("noext")));
}

#[test]
fn unsupported_extension_fails_before_touching_dest() {
    let tmp = temp_dir("native_unsupported");
    let sources = vec![tmp.join("song.wma")];
    let dest = tmp.join("out.ogg");
    let err = NativeBackend::new()
        .convert(&ConvertJob {
            sources: &sources,
            dest: &dest,
            format: TargetFormat::OggVorbis,
            cancel: None,
        })
        .unwrap_err();
    assert!(err.is_conversion_failure());
    assert!(err.to_string().contains(".wma"));
    assert!(!dest.exists());
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn decode_duplicates_mono_into_both_channels() {
    let tmp = temp_dir("native_mono");
    let wav = tmp.join("mono.wav");
    write_sine_wav(&wav, 8000, 1, 800);
    let pcm = decode_stereo(&wav, None).unwrap();
    assert_eq!(pcm.sample_rate, 8000);
    assert_eq!(pcm.frames(), 800);
    assert_eq!(pcm.left, pcm.right);
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn resample_scales_length() {
    let pcm = StereoPcm {
        sample_rate: 22_050,
        left: vec![0.25; 22_050],
        right: vec![-0.25; 22_050],
    };
    let out = resample_stereo(pcm, 44_100).unwrap();
    assert_eq!(out.sample_rate, 44_100);
    assert_eq!(out.frames(), 44_100);
    assert_eq!(out.left.len(), out.right.len());
}

#[test]
fn resample_keeps_onset_and_tail_in_place() {
    let step_at = 24_000;
    let mut left = vec![0.0f32; 48_000];
    left[step_at..].fill(0.5);
    let pcm = StereoPcm {
        sample_rate: 48_000,
        right: left.clone(),
        left,
    };
    let out = resample_stereo(pcm, 44_100).unwrap();
    assert_eq!(out.frames(), 44_100);

    let onset = out.left.iter().position(|&s| s > 0.25).unwrap();
    let expected = step_at * 44_100 / 48_000;
    assert!(onset.abs_diff(expected) <= 4, "onset {onset}, expected {expected}");
    let late = &out.left[out.frames() - 600..out.frames() - 300];
    assert!(late.iter().all(|&s| (s - 0.5).abs() < 0.05));
}

#[test]
fn resample_same_rate_is_identity() {
    let pcm = StereoPcm {
        sample_rate: 44_100,
        left: vec![0.1, 0.2],
        right: vec![0.3, 0.4],
    };
    assert_eq!(resample_stereo(pcm.clone(), 44_100).unwrap(), pcm);
}

#[test]
fn wav_converts_to_canonical_ogg() {
    let tmp = temp_dir("native_wav_to_ogg");
    let wav = tmp.join("tone.wav");
    write_sine_wav(&wav, 22_050, 1, 22_050);
    let sources = vec![wav];
    let dest = tmp.join("tone.ogg");
    NativeBackend::new()
        .convert(&ConvertJob {
            sources: &sources,
            dest: &dest,
            format: TargetFormat::OggVorbis,
            cancel: None,
        })
        .unwrap();

    let bytes = std::fs::read(&dest).unwrap();
    assert_eq!(&bytes[..4], b"OggS");

    let back = decode_stereo(&dest, None).unwrap();
    assert_eq!(back.sample_rate, CANONICAL_SAMPLE_RATE);
    let secs = back.frames() as f64 / f64::from(back.sample_rate);
    assert!((secs - 1.0).abs() < 0.1, "duration {secs}");
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn cancelled_decode_stops() {
    let tmp = temp_dir("native_cancel");
    let wav = tmp.join("tone.wav");
    write_sine_wav(&wav, 8000, 2, 8000);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = decode_stereo(&wav, Some(&cancel)).unwrap_err();
    assert!(err.to_string().contains("cancelled"));
    std::fs::remove_dir_all(&tmp).ok();
}
