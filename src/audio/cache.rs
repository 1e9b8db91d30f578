use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::backend::{BackendKind, BackendPolicy, Converter, TargetFormat};
use crate::audio::fingerprint::{Fingerprint, FingerprintMode, fingerprint_file};
use crate::foundation::core::{CancelToken, unix_now, write_atomic};
use crate::foundation::error::{MoozicError, MoozicResult};

const INDEX_FILE: &str = "index.json";
const AUDIO_DIR: &str = "audio";
const INDEX_VERSION: u32 = 1;

/// One converted file known to the cache.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the source(s) at conversion time.
    pub fingerprint: Fingerprint,
    /// Output format.
    pub format: TargetFormat,
    /// Converted file, relative to the cache root.
    pub file: PathBuf,
    /// Backend that produced the file.
    pub backend: BackendKind,
    /// Creation time, seconds since the unix epoch.
    pub created_at_unix: u64,
}

#[derive(Debug, Default, serde::Deserialize)]
struct CacheIndex {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

/// Result of a cache lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedAudio {
    /// Absolute location of the canonical file.
    pub path: PathBuf,
    /// Fingerprint the file was produced from.
    pub fingerprint: Fingerprint,
    /// Backend that produced the file.
    pub backend: BackendKind,
    /// Whether an existing entry was reused.
    pub hit: bool,
}

/// Persistent map from source fingerprint to converted audio.
///
/// Entries are only reused when the fingerprint still matches and the requested policy permits the
/// backend that produced them. Concurrent requests for the same key are serialized on a per-key
/// slot so exactly one conversion runs and the others observe its result.
///
/// Nothing is created on disk until the first conversion is stored.
pub struct ConversionCache {
    root: PathBuf,
    mode: FingerprintMode,
    converter: Converter,
    index: Mutex<CacheIndex>,
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    conversions: AtomicU64,
    hits: AtomicU64,
    per_fingerprint: Mutex<HashMap<Fingerprint, u64>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversionCache {
    /// Open the cache rooted at `root`, loading its index if one exists.
    ///
    /// An unreadable or outdated index is discarded with a warning; converted files stay on disk
    /// and are reclaimed by [`ConversionCache::purge_unreferenced`].
    pub fn open(
        root: impl Into<PathBuf>,
        converter: Converter,
        mode: FingerprintMode,
    ) -> MoozicResult<Self> {
        let root = root.into();
        let index_path = root.join(INDEX_FILE);
        let index = match std::fs::read(&index_path) {
            Ok(bytes) => match serde_json::from_slice::<CacheIndex>(&bytes) {
                Ok(index) if index.version == INDEX_VERSION => index,
                Ok(index) => {
                    tracing::warn!(found = index.version, "ignoring cache index of another version");
                    CacheIndex::default()
                }
                Err(e) => {
                    tracing::warn!(path = %index_path.display(), error = %e, "ignoring unreadable cache index");
                    CacheIndex::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheIndex::default(),
            Err(e) => return Err(MoozicError::io(&index_path, e)),
        };

        Ok(Self {
            root,
            mode,
            converter,
            index: Mutex::new(index),
            slots: Mutex::new(HashMap::new()),
            conversions: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            per_fingerprint: Mutex::new(HashMap::new()),
        })
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fingerprint mode used for sources.
    pub fn fingerprint_mode(&self) -> FingerprintMode {
        self.mode
    }

    /// Return canonical audio for `source`, converting only when no valid entry exists.
    pub fn get_or_convert(
        &self,
        source: &Path,
        format: TargetFormat,
        policy: BackendPolicy,
        force: bool,
    ) -> MoozicResult<CachedAudio> {
        self.get_or_convert_cancellable(source, format, policy, force, None)
    }

    /// [`ConversionCache::get_or_convert`] that stops early when `cancel` fires.
    #[tracing::instrument(skip(self, cancel), fields(source = %source.display()))]
    pub fn get_or_convert_cancellable(
        &self,
        source: &Path,
        format: TargetFormat,
        policy: BackendPolicy,
        force: bool,
        cancel: Option<&CancelToken>,
    ) -> MoozicResult<CachedAudio> {
        let fp = fingerprint_file(source, self.mode)?;
        self.get_or_produce(fp, format, policy, force, |dest| {
            self.converter.convert(source, dest, format, policy, cancel)
        })
    }

    /// Return canonical audio for `sources` concatenated in order.
    pub fn get_or_stitch(
        &self,
        sources: &[PathBuf],
        format: TargetFormat,
        policy: BackendPolicy,
        force: bool,
    ) -> MoozicResult<CachedAudio> {
        if sources.is_empty() {
            return Err(MoozicError::validation("stitch needs at least one source"));
        }
        let parts = sources
            .iter()
            .map(|s| fingerprint_file(s, self.mode))
            .collect::<MoozicResult<Vec<_>>>()?;
        let fp = Fingerprint::combine(&parts);
        self.get_or_produce(fp, format, policy, force, |dest| {
            self.converter.stitch(sources, dest, format, policy, None)
        })
    }

    fn get_or_produce(
        &self,
        fp: Fingerprint,
        format: TargetFormat,
        policy: BackendPolicy,
        force: bool,
        produce: impl FnOnce(&Path) -> MoozicResult<BackendKind>,
    ) -> MoozicResult<CachedAudio> {
        let key = cache_key(fp, format);
        let slot = self.slot(&key);
        let _guard = lock(&slot);

        if !force && let Some(entry) = self.valid_entry(&key, fp, policy) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, backend = %entry.backend, "conversion cache hit");
            return Ok(CachedAudio {
                path: self.root.join(&entry.file),
                fingerprint: fp,
                backend: entry.backend,
                hit: true,
            });
        }

        let rel = PathBuf::from(AUDIO_DIR).join(format!("{}.{}", fp.to_hex(), format.extension()));
        let dest = self.root.join(&rel);
        self.conversions.fetch_add(1, Ordering::Relaxed);
        *lock(&self.per_fingerprint).entry(fp).or_insert(0) += 1;
        let backend = produce(&dest)?;

        let entry = CacheEntry {
            fingerprint: fp,
            format,
            file: rel,
            backend,
            created_at_unix: unix_now(),
        };
        {
            let mut index = lock(&self.index);
            index.entries.insert(key.clone(), entry);
            self.persist(&index)?;
        }
        tracing::debug!(key = %key, backend = %backend, "stored converted audio");

        Ok(CachedAudio {
            path: dest,
            fingerprint: fp,
            backend,
            hit: false,
        })
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        lock(&self.slots)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn valid_entry(&self, key: &str, fp: Fingerprint, policy: BackendPolicy) -> Option<CacheEntry> {
        let index = lock(&self.index);
        let entry = index.entries.get(key)?;
        if entry.fingerprint != fp {
            return None;
        }
        if !policy.permits(entry.backend) {
            tracing::debug!(key, backend = %entry.backend, %policy, "cached entry not permitted by policy");
            return None;
        }
        if !self.root.join(&entry.file).is_file() {
            return None;
        }
        Some(entry.clone())
    }

    fn persist(&self, index: &CacheIndex) -> MoozicResult<()> {
        let bytes = serde_json::to_vec_pretty(&CacheIndexRef {
            version: INDEX_VERSION,
            entries: &index.entries,
        })
        .map_err(|e| MoozicError::serde(e.to_string()))?;
        write_atomic(&self.root.join(INDEX_FILE), &bytes)
    }

    /// Drop every entry so the next request for any source converts again. Files are kept.
    pub fn invalidate_all(&self) -> MoozicResult<()> {
        let mut index = lock(&self.index);
        if index.entries.is_empty() {
            return Ok(());
        }
        let dropped = index.entries.len();
        index.entries.clear();
        self.persist(&index)?;
        tracing::info!(dropped, "conversion cache invalidated");
        Ok(())
    }

    /// Delete converted files no entry refers to. Returns how many were removed.
    ///
    /// Must not run while conversions into this cache are in flight.
    pub fn purge_unreferenced(&self) -> MoozicResult<usize> {
        let dir = self.root.join(AUDIO_DIR);
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(MoozicError::io(&dir, e)),
        };
        let index = lock(&self.index);
        let referenced: std::collections::HashSet<PathBuf> = index
            .entries
            .values()
            .map(|e| self.root.join(&e.file))
            .collect();

        let mut removed = 0;
        for item in read {
            let item = item.map_err(|e| MoozicError::io(&dir, e))?;
            let path = item.path();
            if path.is_file() && !referenced.contains(&path) {
                std::fs::remove_file(&path).map_err(|e| MoozicError::io(&path, e))?;
                removed += 1;
            }
        }
        tracing::info!(removed, "purged unreferenced converted audio");
        Ok(removed)
    }

    /// Snapshot of all entries, ordered by key.
    pub fn entries(&self) -> Vec<(String, CacheEntry)> {
        lock(&self.index)
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Conversions started through this handle.
    pub fn conversion_total(&self) -> u64 {
        self.conversions.load(Ordering::Relaxed)
    }

    /// Conversions started for one fingerprint through this handle.
    pub fn conversion_count(&self, fp: Fingerprint) -> u64 {
        lock(&self.per_fingerprint).get(&fp).copied().unwrap_or(0)
    }

    /// Lookups answered from an existing entry.
    pub fn hit_total(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

#[derive(serde::Serialize)]
struct CacheIndexRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, CacheEntry>,
}

fn cache_key(fp: Fingerprint, format: TargetFormat) -> String {
    format!("{}:{}", fp.to_hex(), format.tag())
}

#[cfg(test)]
#[path = "../../tests/unit/audio/cache.rs"]
mod tests;
