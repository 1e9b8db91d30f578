use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::audio::backend::{
    BackendKind, BackendOpts, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE, ConversionBackend,
    ConvertJob, TargetFormat,
};
use crate::foundation::core::CancelToken;
use crate::foundation::error::{MoozicError, MoozicResult};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Finds an executable in an ordered list of bundled locations, then on `PATH`.
#[derive(Clone, Debug)]
pub struct BinaryLocator {
    name: String,
    candidates: Vec<PathBuf>,
    search_path: bool,
}

impl BinaryLocator {
    /// Look for `name` in each of `candidates` (directories or direct file paths), then `PATH`.
    pub fn new(name: impl Into<String>, candidates: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            candidates,
            search_path: true,
        }
    }

    /// Skip the `PATH` lookup.
    pub fn without_path_search(mut self) -> Self {
        self.search_path = false;
        self
    }

    /// First match in candidate order, or `None`.
    pub fn resolve(&self) -> Option<PathBuf> {
        let exe = format!("{}{}", self.name, std::env::consts::EXE_SUFFIX);
        for c in &self.candidates {
            let direct = if c.is_dir() { c.join(&exe) } else { c.clone() };
            if direct.is_file() {
                return Some(direct);
            }
        }
        if self.search_path {
            return which::which(&self.name).ok();
        }
        None
    }
}

/// Bundled converter locations next to the running executable.
pub fn default_ffmpeg_candidates() -> Vec<PathBuf> {
    let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    else {
        return Vec::new();
    };
    [".", "ffmpeg", "bin", "ffmpeg/bin"]
        .iter()
        .map(|sub| exe_dir.join(sub))
        .collect()
}

/// Whether an `ffmpeg` binary can be found on `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    which::which("ffmpeg").is_ok()
}

/// Backend that shells out to `ffmpeg`.
///
/// The binary is resolved once, at construction. A backend without a binary reports itself as
/// unavailable instead of failing each job.
#[derive(Clone, Debug)]
pub struct ExternalBackend {
    binary: Option<PathBuf>,
    timeout: Duration,
    cancel_grace: Duration,
}

impl ExternalBackend {
    /// Resolve `ffmpeg` from `opts.ffmpeg_candidates`, then `PATH`.
    pub fn new(opts: &BackendOpts) -> Self {
        let binary = BinaryLocator::new("ffmpeg", opts.ffmpeg_candidates.clone()).resolve();
        match &binary {
            Some(p) => tracing::debug!(binary = %p.display(), "external converter resolved"),
            None => tracing::debug!("no external converter found"),
        }
        Self {
            binary,
            timeout: opts.timeout,
            cancel_grace: opts.cancel_grace,
        }
    }

    /// Use an explicit converter binary.
    pub fn with_binary(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: Some(binary.into()),
            timeout,
            cancel_grace: Duration::from_secs(2),
        }
    }

    /// Resolved converter path.
    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }
}

impl ConversionBackend for ExternalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::External
    }

    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    fn convert(&self, job: &ConvertJob<'_>) -> MoozicResult<()> {
        let binary = self.binary.as_ref().ok_or_else(|| {
            MoozicError::conversion("ffmpeg is required for this source, but was not found")
        })?;
        let mut cmd = Command::new(binary);
        cmd.args(ffmpeg_args(job.sources, job.dest, job.format));
        run_with_timeout(cmd, "ffmpeg", self.timeout, job.cancel, self.cancel_grace)
    }
}

/// Arguments converting (or concatenating) `sources` into canonical audio at `dest`.
pub fn ffmpeg_args(sources: &[PathBuf], dest: &Path, format: TargetFormat) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
        .iter()
        .map(OsString::from)
        .collect();
    for s in sources {
        args.push("-i".into());
        args.push(s.as_os_str().to_owned());
    }
    if sources.len() > 1 {
        let inputs: String = (0..sources.len()).map(|i| format!("[{i}:a]")).collect();
        args.push("-filter_complex".into());
        args.push(format!("{inputs}concat=n={}:v=0:a=1[outa]", sources.len()).into());
        args.push("-map".into());
        args.push("[outa]".into());
    }
    args.push("-vn".into());
    match format {
        TargetFormat::OggVorbis => {
            let rate = CANONICAL_SAMPLE_RATE.to_string();
            let channels = CANONICAL_CHANNELS.to_string();
            for a in [
                "-c:a",
                "libvorbis",
                "-q:a",
                "5",
                "-ar",
                rate.as_str(),
                "-ac",
                channels.as_str(),
                "-f",
                "ogg",
            ] {
                args.push(a.into());
            }
        }
    }
    args.push(dest.as_os_str().to_owned());
    args
}

/// Run `cmd` to completion, killing it past `timeout`, or `grace` after cancellation.
fn run_with_timeout(
    mut cmd: Command,
    tool: &str,
    timeout: Duration,
    cancel: Option<&CancelToken>,
    grace: Duration,
) -> MoozicResult<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| MoozicError::conversion(format!("failed to spawn {tool}: {e}")))?;

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MoozicError::conversion(format!("failed to open {tool} stderr")))?;
    let stderr_drain = std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok::<_, std::io::Error>(bytes)
    });

    let started = Instant::now();
    let mut cancelled_at: Option<Instant> = None;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MoozicError::conversion(format!("wait for {tool}: {e}")));
            }
        }

        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!(tool, secs = timeout.as_secs(), "external conversion timed out");
            return Err(MoozicError::Timeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            });
        }

        if cancel.is_some_and(CancelToken::is_cancelled) {
            let at = *cancelled_at.get_or_insert_with(Instant::now);
            if at.elapsed() >= grace {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MoozicError::conversion(format!("{tool} cancelled")));
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    };

    let stderr_bytes = stderr_drain
        .join()
        .map_err(|_| MoozicError::conversion(format!("{tool} stderr drain panicked")))?
        .unwrap_or_default();
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        return Err(MoozicError::conversion(format!(
            "{tool} exited with status {status}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/audio/external.rs"]
mod tests;
