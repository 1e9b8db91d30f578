use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::cover::mask::MaskVariant;
use crate::foundation::core::{display_name_from_stem, sanitize_id, validate_mod_id};
use crate::foundation::error::{MoozicError, MoozicResult};

/// A music mod being built: identity, metadata and the ordered track list.
///
/// Projects are authored as JSON and loaded with [`ModProject::from_path`]. Relative source and
/// cover paths are resolved against the directory holding the project file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ModProject {
    /// Mod identifier (`[A-Za-z0-9_]`), used for folder, script module and sound paths.
    pub mod_id: String,
    /// Display name.
    pub name: String,
    /// Mod this one requires, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_mod_id: Option<String>,
    /// Author names.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Free text description for mod.info and workshop.txt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Project-wide default poster image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<PathBuf>,
    /// Tracks in insertion order. Output ordering follows this list.
    pub tracks: Vec<Track>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// One song and the items it should become.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Track {
    /// Identifier unique within the project.
    pub id: String,
    /// Song title; defaults to the source file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Artist name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Source audio file.
    pub source: PathBuf,
    /// Item kinds to emit for this track.
    #[serde(default = "default_outputs")]
    pub outputs: Vec<OutputKind>,
    /// Identifier of the track used as this track's B-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_side: Option<String>,
    /// Cover art assignment.
    #[serde(default)]
    pub cover: CoverSpec,
    /// Conversion state, updated by the build.
    #[serde(skip)]
    pub status: TrackStatus,
}

fn default_outputs() -> Vec<OutputKind> {
    vec![OutputKind::Cassette]
}

/// Item kind a track is turned into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Cassette tape item.
    Cassette,
    /// Vinyl record plus its album sleeve.
    Vinyl,
}

impl OutputKind {
    /// Mask variants composited for this kind, in emission order.
    pub fn mask_variants(self) -> &'static [MaskVariant] {
        match self {
            Self::Cassette => &[MaskVariant::CassetteFront],
            Self::Vinyl => &[MaskVariant::VinylOuter, MaskVariant::VinylInner],
        }
    }

    /// Item name prefix (`Cassette`, `Vinyl`).
    pub fn item_prefix(self) -> &'static str {
        match self {
            Self::Cassette => "Cassette",
            Self::Vinyl => "Vinyl",
        }
    }
}

/// Which base image a track's covers use and how large they are rendered.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoverSpec {
    /// Override image or a default pick.
    #[serde(default)]
    pub source: CoverSource,
    /// Resolution tier.
    #[serde(default)]
    pub tier: ResolutionTier,
}

/// Base image source for a cover.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    /// Pick from the default cover pool.
    #[default]
    Default,
    /// Explicit image path.
    Override(PathBuf),
}

/// Output resolution tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    /// In-game texture sizes.
    #[default]
    Standard,
    /// Standard outputs plus a high-resolution inspection texture.
    HighRes,
}

/// Conversion state of a track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TrackStatus {
    /// Not converted yet.
    #[default]
    Pending,
    /// Converted during this build.
    Converted,
    /// Reused a valid cache entry.
    Cached,
    /// Conversion failed with the given reason.
    Failed(String),
}

impl TrackStatus {
    /// Whether canonical audio is available for the track.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Converted | Self::Cached)
    }
}

impl Track {
    /// Stable key used in item, sound, model and texture names.
    pub fn item_key(&self) -> String {
        sanitize_id(&self.id)
    }

    /// Title, falling back to the source file name.
    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => display_name_from_stem(&self.source),
        }
    }

    /// `"<artist> - <title>"`, or the title alone.
    pub fn display_label(&self) -> String {
        match self.artist.as_deref().map(str::trim) {
            Some(a) if !a.is_empty() => format!("{a} - {}", self.display_title()),
            _ => self.display_title(),
        }
    }

    /// Whether this track emits items of `kind`.
    pub fn emits(&self, kind: OutputKind) -> bool {
        self.outputs.contains(&kind)
    }
}

impl ModProject {
    /// Create an empty project rooted at the current directory.
    pub fn new(mod_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            name: name.into(),
            parent_mod_id: None,
            authors: Vec::new(),
            description: None,
            poster: None,
            tracks: Vec::new(),
            base_dir: PathBuf::new(),
        }
    }

    /// Parse a project from a JSON reader. Relative paths resolve against the working directory.
    pub fn from_reader<R: std::io::Read>(r: R) -> MoozicResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| MoozicError::validation(format!("parse project JSON: {e}")))
    }

    /// Parse a project from a JSON string.
    pub fn from_json_str(s: &str) -> MoozicResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse a project from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> MoozicResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            MoozicError::validation(format!("open project JSON '{}': {e}", path.display()))
        })?;
        let mut project = Self::from_reader(BufReader::new(f))?;
        project.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(project)
    }

    /// Serialize the project as pretty JSON.
    pub fn to_json_string(&self) -> MoozicResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| MoozicError::serde(e.to_string()))
    }

    /// Resolve a project-relative path.
    pub fn resolve_path(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    /// Look up a track by identifier.
    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Index of the track referenced as B-side by `tracks[idx]`.
    pub fn b_side_index(&self, idx: usize) -> Option<usize> {
        let id = self.tracks.get(idx)?.b_side.as_deref()?;
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Indices of tracks whose audio must be converted, in insertion order.
    ///
    /// A track needs audio when it emits items itself or is the B-side of one that does.
    pub fn audio_track_indices(&self) -> Vec<usize> {
        let mut needed = vec![false; self.tracks.len()];
        for (i, t) in self.tracks.iter().enumerate() {
            if t.outputs.is_empty() {
                continue;
            }
            needed[i] = true;
            if let Some(b) = self.b_side_index(i) {
                needed[b] = true;
            }
        }
        (0..self.tracks.len()).filter(|&i| needed[i]).collect()
    }

    /// Validate identifiers and references.
    ///
    /// Source files are not touched: a missing source is a per-track conversion failure, not a
    /// validation failure.
    pub fn validate(&self) -> MoozicResult<()> {
        validate_mod_id(&self.mod_id)?;
        if self.name.trim().is_empty() {
            return Err(MoozicError::validation("project name must be non-empty"));
        }
        if let Some(parent) = &self.parent_mod_id {
            validate_mod_id(parent)
                .map_err(|e| MoozicError::validation(format!("parent_mod_id: {e}")))?;
        }
        if self.tracks.is_empty() {
            return Err(MoozicError::validation("project has no tracks"));
        }

        let mut ids: HashMap<&str, usize> = HashMap::new();
        let mut keys: HashMap<String, &str> = HashMap::new();
        for (i, t) in self.tracks.iter().enumerate() {
            if t.id.trim().is_empty() {
                return Err(MoozicError::validation(format!(
                    "track #{i} has an empty id"
                )));
            }
            if ids.insert(t.id.as_str(), i).is_some() {
                return Err(MoozicError::validation(format!(
                    "duplicate track id '{}'",
                    t.id
                )));
            }
            let key = t.item_key();
            if let Some(other) = keys.insert(key.clone(), t.id.as_str()) {
                return Err(MoozicError::validation(format!(
                    "track ids '{other}' and '{}' map to the same item key '{key}'",
                    t.id
                )));
            }
            if t.source.as_os_str().is_empty() {
                return Err(MoozicError::validation(format!(
                    "track '{}' has an empty source path",
                    t.id
                )));
            }
            let distinct: BTreeSet<OutputKind> = t.outputs.iter().copied().collect();
            if distinct.len() != t.outputs.len() {
                return Err(MoozicError::validation(format!(
                    "track '{}' lists an output kind more than once",
                    t.id
                )));
            }
            if let CoverSource::Override(p) = &t.cover.source
                && p.as_os_str().is_empty()
            {
                return Err(MoozicError::validation(format!(
                    "track '{}' has an empty cover override path",
                    t.id
                )));
            }
        }

        let mut referenced: BTreeSet<&str> = BTreeSet::new();
        for t in &self.tracks {
            let Some(b) = t.b_side.as_deref() else {
                continue;
            };
            if b == t.id {
                return Err(MoozicError::validation(format!(
                    "track '{}' lists itself as its B-side",
                    t.id
                )));
            }
            if !ids.contains_key(b) {
                return Err(MoozicError::validation(format!(
                    "track '{}' references missing B-side '{b}'",
                    t.id
                )));
            }
            if !t.outputs.is_empty() {
                referenced.insert(b);
            }
        }

        for t in &self.tracks {
            if t.outputs.is_empty() && !referenced.contains(t.id.as_str()) {
                return Err(MoozicError::validation(format!(
                    "track '{}' has no outputs and is not used as a B-side",
                    t.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/project/model.rs"]
mod tests;
