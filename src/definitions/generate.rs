use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::build::layout::ModLayout;
use crate::cover::mask::MaskVariant;
use crate::foundation::error::{MoozicError, MoozicResult};
use crate::project::model::{ModProject, OutputKind};

/// World music tile that plays cassettes.
pub const CASSETTE_TILE: &str = "tsarcraft_music_01_62";
/// World music tile that plays vinyls.
pub const VINYL_TILE: &str = "tsarcraft_music_01_63";
/// Minimum game version written to `mod.info`.
pub const VERSION_MIN: &str = "42.13";
/// Author written when a project lists none.
pub const DEFAULT_AUTHOR: &str = "local-builder";
/// Workshop tags.
pub const WORKSHOP_TAGS: &str = "Build 42;Multiplayer;Music";

const CASSETTE_MESH: &str = "TCTape";
const CASSETTE_SCALE: &str = "0.0005";
const VINYL_SCALE: &str = "0.12";
const RECORD_WEIGHT: &str = "0.02";
const ALBUM_WEIGHT: &str = "0.05";

/// Outputs that finished successfully, keyed by track index.
///
/// Filled by the build from unordered worker results; generation walks tracks in insertion order
/// and only consults this set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadyOutputs {
    audio: BTreeSet<usize>,
    covers: BTreeSet<(usize, MaskVariant)>,
}

impl ReadyOutputs {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record canonical audio for `track`.
    pub fn mark_audio(&mut self, track: usize) {
        self.audio.insert(track);
    }

    /// Record a composited texture set for `track`.
    pub fn mark_cover(&mut self, track: usize, variant: MaskVariant) {
        self.covers.insert((track, variant));
    }

    /// Whether `track` has canonical audio.
    pub fn has_audio(&self, track: usize) -> bool {
        self.audio.contains(&track)
    }

    /// Whether `track` has a composited `variant`.
    pub fn has_cover(&self, track: usize, variant: MaskVariant) -> bool {
        self.covers.contains(&(track, variant))
    }
}

/// A generated text file, relative to the mod tree root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Tree-relative path.
    pub path: PathBuf,
    /// File contents.
    pub contents: String,
}

/// An item that was not emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedItem {
    /// Track the item belongs to.
    pub track_id: String,
    /// Item name that would have been emitted.
    pub item: String,
    /// Missing output.
    pub reason: String,
}

/// Everything the generator decided to emit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Definitions {
    /// Scripts, Lua, `mod.info` and `workshop.txt`.
    pub files: Vec<GeneratedFile>,
    /// Emitted item names in emission order.
    pub items: Vec<String>,
    /// Track indices whose audio is referenced, ascending.
    pub audio: Vec<usize>,
    /// Textures referenced by emitted items, in emission order.
    pub textures: Vec<(usize, MaskVariant)>,
    /// Items left out because an output was missing.
    pub skipped: Vec<SkippedItem>,
    /// Mesh names referenced by emitted models, sorted. Filled only for mods without a parent,
    /// which have to ship the meshes themselves.
    pub meshes: Vec<String>,
}

#[derive(Default)]
struct Scripts {
    items: Vec<String>,
    sounds: Vec<String>,
    models: Vec<String>,
    music: Vec<String>,
}

impl Scripts {
    fn item(&mut self, name: &str, weight: &str, icon: &str, display: &str, model: &str) {
        self.items.extend([
            format!("\titem {name}"),
            "\t{".to_string(),
            "\t\tItemType\t\t=\tbase:normal,".to_string(),
            "\t\tDisplayCategory = Entertainment,".to_string(),
            format!("\t\tWeight\t\t\t=\t{weight},"),
            format!("\t\tIcon\t\t\t=\t{icon},"),
            format!("\t\tDisplayName\t\t=\t{display},"),
            format!("\t\tWorldStaticModel = {model},"),
            "\t\tCanSpawn\t\t=\ttrue,".to_string(),
            "\t}".to_string(),
            String::new(),
        ]);
    }

    fn sound(&mut self, name: &str, file: &str) {
        self.sounds.extend([
            format!("\tsound {name}"),
            "\t{".to_string(),
            "\t\tcategory = True Music,".to_string(),
            "\t\tmaster = Ambient,".to_string(),
            "\t\tclip".to_string(),
            "\t\t{".to_string(),
            format!("\t\t\tfile = {file},"),
            "\t\t\tdistanceMax = 75,".to_string(),
            "\t\t}".to_string(),
            "\t}".to_string(),
            String::new(),
        ]);
    }

    fn model(&mut self, name: &str, mesh: &str, texture: &str, scale: &str) {
        self.models.extend([
            format!("\tmodel {name}"),
            "\t{".to_string(),
            format!("\t\tmesh = WorldItems/{mesh},"),
            format!("\t\ttexture = WorldItems/{texture},"),
            format!("\t\tscale = {scale},"),
            "\t}".to_string(),
            String::new(),
        ]);
    }

    fn music(&mut self, item: &str, tile: &str) {
        self.music.push(format!("GlobalMusic[\"{item}\"] = \"{tile}\""));
    }
}

fn script_module(mod_id: &str, body: &[String]) -> String {
    let mut lines = vec![
        format!("module {mod_id}"),
        "{".to_string(),
        "\timports".to_string(),
        "\t{".to_string(),
        "\t\tBase".to_string(),
        "\t}".to_string(),
        String::new(),
    ];
    lines.extend(body.iter().cloned());
    lines.push("}".to_string());
    lines.join("\n") + "\n"
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Generate definitions for every item whose outputs are ready.
///
/// Tracks are walked in insertion order and output kinds in declaration order, so unchanged
/// inputs always produce byte-identical files. An item is emitted only when its audio and every
/// texture it references are in `ready`; a SideB item additionally needs the B-side track's audio.
pub fn generate(project: &ModProject, ready: &ReadyOutputs) -> Definitions {
    let layout = ModLayout::new(project.mod_id.clone());
    let mod_id = project.mod_id.as_str();
    let mut scripts = Scripts::default();
    let mut out = Definitions::default();
    let mut audio = BTreeSet::new();
    let mut meshes = BTreeSet::new();
    let mut songs = Vec::new();

    for (idx, track) in project.tracks.iter().enumerate() {
        let key = track.item_key();
        let label = track.display_label();
        let b_idx = project.b_side_index(idx);
        let b_ready = b_idx.filter(|&b| ready.has_audio(b));
        let mut listed = false;
        let mut b_listed = false;

        for kind in [OutputKind::Cassette, OutputKind::Vinyl] {
            if !track.emits(kind) {
                continue;
            }
            let prefix = kind.item_prefix();
            let main_item = format!("{prefix}{key}");

            let missing = if !ready.has_audio(idx) {
                Some("audio not converted".to_string())
            } else {
                kind.mask_variants()
                    .iter()
                    .find(|&&v| !ready.has_cover(idx, v))
                    .map(|v| format!("{v} cover not composited"))
            };
            if let Some(reason) = missing {
                out.skipped.push(SkippedItem {
                    track_id: track.id.clone(),
                    item: main_item,
                    reason,
                });
                continue;
            }

            audio.insert(idx);
            out.textures
                .extend(kind.mask_variants().iter().map(|&v| (idx, v)));
            let tile = match kind {
                OutputKind::Cassette => CASSETTE_TILE,
                OutputKind::Vinyl => VINYL_TILE,
            };

            let record_variant = match kind {
                OutputKind::Cassette => MaskVariant::CassetteFront,
                OutputKind::Vinyl => MaskVariant::VinylInner,
            };
            let record_tex = ModLayout::texture_name(record_variant, &key);
            let (mesh, scale) = match kind {
                OutputKind::Cassette => (CASSETTE_MESH, CASSETTE_SCALE),
                OutputKind::Vinyl => (record_variant.texture_stem(), VINYL_SCALE),
            };
            let record_model = format!("{mod_id}.{record_tex}");

            scripts.model(&record_tex, mesh, &record_tex, scale);
            meshes.insert(mesh);
            if kind == OutputKind::Vinyl {
                let album_tex = ModLayout::texture_name(MaskVariant::VinylOuter, &key);
                let album_mesh = MaskVariant::VinylOuter.texture_stem();
                scripts.model(&album_tex, album_mesh, &album_tex, VINYL_SCALE);
                meshes.insert(album_mesh);
                let album_item = format!("VinylAlbum{key}");
                scripts.item(
                    &album_item,
                    ALBUM_WEIGHT,
                    &album_tex,
                    &format!("Vinyl Album {label}"),
                    &format!("{mod_id}.{album_tex}"),
                );
                out.items.push(album_item);
            }

            scripts.item(
                &main_item,
                RECORD_WEIGHT,
                &record_tex,
                &format!("{prefix} {label} (A-Side)"),
                &record_model,
            );
            scripts.sound(&main_item, &layout.sound_ref(&key));
            scripts.music(&main_item, tile);
            if kind == OutputKind::Vinyl {
                scripts.music(&format!("VinylAlbum{key}"), tile);
            }
            out.items.push(main_item.clone());
            listed = true;

            match (b_idx, b_ready) {
                (Some(b), Some(_)) => {
                    let side_b = format!("{main_item}SideB");
                    let b_key = project.tracks[b].item_key();
                    audio.insert(b);
                    scripts.item(
                        &side_b,
                        RECORD_WEIGHT,
                        &record_tex,
                        &format!("{prefix} {label} (B-Side)"),
                        &record_model,
                    );
                    scripts.sound(&side_b, &layout.sound_ref(&b_key));
                    scripts.music(&side_b, tile);
                    out.items.push(side_b);
                    b_listed = true;
                }
                (Some(b), None) => out.skipped.push(SkippedItem {
                    track_id: track.id.clone(),
                    item: format!("{main_item}SideB"),
                    reason: format!("B-side '{}' audio not converted", project.tracks[b].id),
                }),
                _ => {}
            }
        }

        if listed {
            match b_idx.filter(|_| b_listed) {
                Some(b) => songs.push(format!(
                    "{label} | B-Side: {}",
                    project.tracks[b].display_label()
                )),
                None => songs.push(label),
            }
        }
    }

    out.audio = audio.into_iter().collect();

    out.files.push(GeneratedFile {
        path: layout.items_script(),
        contents: script_module(mod_id, &scripts.items),
    });
    out.files.push(GeneratedFile {
        path: layout.sounds_script(),
        contents: script_module(mod_id, &scripts.sounds),
    });
    out.files.push(GeneratedFile {
        path: layout.models_script(),
        contents: script_module(mod_id, &scripts.models),
    });

    let mut music = vec!["require \"TCMusicDefenitions\"".to_string(), String::new()];
    music.extend(scripts.music);
    out.files.push(GeneratedFile {
        path: layout.music_defs(),
        contents: music.join("\n") + "\n",
    });
    if project.parent_mod_id.is_none() {
        out.meshes = meshes.into_iter().map(String::from).collect();
        out.files.push(GeneratedFile {
            path: layout.standalone_music_defs(),
            contents: standalone_music_defs(),
        });
    }

    let info = mod_info(project);
    for path in layout.mod_info_files() {
        out.files.push(GeneratedFile {
            path,
            contents: info.clone(),
        });
    }
    out.files.push(GeneratedFile {
        path: layout.workshop_txt(),
        contents: workshop_txt(project, &songs),
    });

    out
}

/// `mod.info` contents.
pub fn mod_info(project: &ModProject) -> String {
    let mut lines = vec![
        format!("name={}", single_line(&project.name)),
        "poster=poster.png".to_string(),
        format!("id={}", project.mod_id),
        format!("versionMin={VERSION_MIN}"),
        "icon=icon.png".to_string(),
    ];
    if let Some(parent) = project.parent_mod_id.as_deref().map(str::trim)
        && !parent.is_empty()
    {
        lines.push(format!("require=\\{parent}"));
    }
    let description = match project.description.as_deref().map(single_line) {
        Some(d) if !d.is_empty() => d,
        _ => format!("{} generated by moozic", single_line(&project.name)),
    };
    lines.push(format!("description={description}"));
    let authors: Vec<&str> = project
        .authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    let author = if authors.is_empty() {
        DEFAULT_AUTHOR.to_string()
    } else {
        authors.join(", ")
    };
    lines.push(format!("author={author}"));
    lines.push(String::new());
    lines.join("\n")
}

/// `workshop.txt` contents. Upload visibility is always `unlisted`.
pub fn workshop_txt(project: &ModProject, songs: &[String]) -> String {
    let name = single_line(&project.name);
    let mut lines = vec![
        "version=1".to_string(),
        "id=".to_string(),
        format!("title={name}"),
        format!("description=[h2]{name}[/h2]"),
    ];
    if let Some(d) = project.description.as_deref() {
        lines.extend(
            d.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| format!("description={l}")),
        );
    }
    if !songs.is_empty() {
        lines.push("description=[h3]Song List[/h3]".to_string());
        lines.extend(songs.iter().map(|s| format!("description={}", single_line(s))));
    }
    lines.push(format!("tags={WORKSHOP_TAGS}"));
    lines.push("visibility=unlisted".to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// Base music tables for a mod without a parent that provides them.
pub fn standalone_music_defs() -> String {
    let mut lines: Vec<String> = [
        "if not TCMusic then TCMusic = {} end",
        "if TCMusic.ItemMusicPlayer == nil then TCMusic.ItemMusicPlayer = {} end",
        "if TCMusic.VehicleMusicPlayer == nil then TCMusic.VehicleMusicPlayer = {} end",
        "if TCMusic.WorldMusicPlayer == nil then TCMusic.WorldMusicPlayer = {} end",
        "if TCMusic.WalkmanPlayer == nil then TCMusic.WalkmanPlayer = {} end",
        "if GlobalMusic == nil then GlobalMusic = {} end",
        "",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    for tile in [CASSETTE_TILE, VINYL_TILE] {
        lines.push(format!("TCMusic.WorldMusicPlayer[\"{tile}\"] = \"{tile}\""));
    }
    lines.push(format!("GlobalMusic[\"CassetteMainTheme\"] = \"{CASSETTE_TILE}\""));
    lines.push(format!("GlobalMusic[\"VinylMainTheme\"] = \"{VINYL_TILE}\""));
    lines.push(String::new());
    lines.join("\n")
}

#[derive(serde::Serialize)]
struct Manifest<'a> {
    mod_id: &'a str,
    files: Vec<String>,
}

fn slash_path(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `manifest.json` listing `files` (tree-relative) sorted and deduplicated.
///
/// The manifest itself is included so the listing covers the whole tree.
pub fn render_manifest(mod_id: &str, files: &[PathBuf]) -> MoozicResult<String> {
    let layout = ModLayout::new(mod_id);
    let listed: BTreeSet<String> = files
        .iter()
        .map(|p| slash_path(p))
        .chain(std::iter::once(slash_path(&layout.manifest())))
        .collect();
    let manifest = Manifest {
        mod_id,
        files: listed.into_iter().collect(),
    };
    serde_json::to_string_pretty(&manifest)
        .map(|s| s + "\n")
        .map_err(|e| MoozicError::serde(e.to_string()))
}

#[cfg(test)]
#[path = "../../tests/unit/definitions/generate.rs"]
mod tests;
