use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::foundation::error::{MoozicError, MoozicResult};

/// Longest item key derived from a track identifier.
pub const MAX_ITEM_KEY_LEN: usize = 48;
/// Longest accepted mod identifier.
pub const MAX_MOD_ID_LEN: usize = 64;

/// Reduce free text to an ASCII alphanumeric identifier usable in game scripts.
///
/// Diacritics are folded (`Café` becomes `Cafe`), everything else outside `[A-Za-z0-9]` is dropped,
/// and the result is capped at [`MAX_ITEM_KEY_LEN`]. Empty input maps to `"Track"`.
pub fn sanitize_id(text: &str) -> String {
    let mut out: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(char::is_ascii_alphanumeric)
        .collect();
    out.truncate(MAX_ITEM_KEY_LEN);
    if out.is_empty() {
        return "Track".to_string();
    }
    out
}

/// Check that `id` is usable as a mod identifier: `[A-Za-z0-9_]`, no whitespace, bounded length.
pub fn validate_mod_id(id: &str) -> MoozicResult<()> {
    if id.is_empty() {
        return Err(MoozicError::validation("mod id must not be empty"));
    }
    if id.len() > MAX_MOD_ID_LEN {
        return Err(MoozicError::validation(format!(
            "mod id '{id}' is longer than {MAX_MOD_ID_LEN} characters"
        )));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(MoozicError::validation(format!(
            "mod id '{id}' contains invalid character {bad:?} (allowed: A-Z a-z 0-9 _)"
        )));
    }
    Ok(())
}

/// Human readable title from a file stem: underscores become spaces.
pub fn display_name_from_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = stem.replace('_', " ").trim().to_string();
    if name.is_empty() {
        "Track".to_string()
    } else {
        name
    }
}

/// Cooperative cancellation flag shared between a build and its caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the "running" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Seconds since the unix epoch, saturating to 0 on clock skew.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &Path) -> MoozicResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| MoozicError::io(dir, e))
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent_dir(path: &Path) -> MoozicResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Write `bytes` next to `path` and rename into place so readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> MoozicResult<()> {
    ensure_parent_dir(path)?;
    let tmp = partial_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| MoozicError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        MoozicError::io(path, e)
    })
}

/// Sibling temp path used for in-progress writes to `path`.
pub fn partial_path(path: &Path) -> std::path::PathBuf {
    static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial-{}-{n}{ext}", std::process::id()))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
