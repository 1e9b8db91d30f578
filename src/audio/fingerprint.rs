use std::io::Read;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::error::{MoozicError, MoozicResult};

const XXH3_SEED: u64 = 0x8b5ad4a0c7d8e9f1;

/// How a source file's identity is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Path, size and modification time. Cheap; any touch of the file changes it.
    #[default]
    Metadata,
    /// Size and a hash of the full contents. Identical files at different paths share it.
    Content,
}

/// Stable 128-bit identity of a source file (or an ordered list of them).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl Fingerprint {
    /// Lowercase 32-digit hex form, used for cache keys and file names.
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }

    /// Parse the form produced by [`Fingerprint::to_hex`].
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.is_ascii() {
            return None;
        }
        let hi = u64::from_str_radix(&s[..16], 16).ok()?;
        let lo = u64::from_str_radix(&s[16..], 16).ok()?;
        Some(Self { hi, lo })
    }

    /// Order-sensitive combination, used for multi-source outputs.
    pub fn combine(parts: &[Fingerprint]) -> Self {
        let mut h = StableHasher::new();
        h.write_bytes(b"combine");
        h.write_u64(parts.len() as u64);
        for p in parts {
            h.write_u64(p.hi);
            h.write_u64(p.lo);
        }
        h.finish()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Fingerprint::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid fingerprint '{s}'")))
    }
}

/// Compute the fingerprint of `path`.
///
/// Deterministic for unchanged inputs. An unreadable or missing source is an IO error, never a
/// fingerprint of nothing.
pub fn fingerprint_file(path: &Path, mode: FingerprintMode) -> MoozicResult<Fingerprint> {
    let meta = std::fs::metadata(path).map_err(|e| MoozicError::io(path, e))?;
    if !meta.is_file() {
        return Err(MoozicError::io(
            path,
            std::io::Error::other("source is not a regular file"),
        ));
    }

    let mut h = StableHasher::new();
    h.write_u64(meta.len());
    match mode {
        FingerprintMode::Metadata => {
            h.write_bytes(b"meta");
            let abs = std::path::absolute(path).map_err(|e| MoozicError::io(path, e))?;
            h.write_str(&abs.to_string_lossy().replace('\\', "/"));
            let mtime = meta.modified().map_err(|e| MoozicError::io(path, e))?;
            let since = mtime
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default();
            h.write_u64(since.as_secs());
            h.write_u64(u64::from(since.subsec_nanos()));
        }
        FingerprintMode::Content => {
            h.write_bytes(b"content");
            let mut f = std::fs::File::open(path).map_err(|e| MoozicError::io(path, e))?;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = f.read(&mut buf).map_err(|e| MoozicError::io(path, e))?;
                if n == 0 {
                    break;
                }
                h.write_bytes(&buf[..n]);
            }
        }
    }
    Ok(h.finish())
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        let v = self.inner.digest128();
        Fingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/audio/fingerprint.rs"]
mod tests;
