use std::path::PathBuf;

use crate::cover::mask::MaskVariant;

/// Paths inside an assembled mod tree, relative to `<output_dir>/<mod_id>/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModLayout {
    mod_id: String,
}

impl ModLayout {
    /// Layout for `mod_id`.
    pub fn new(mod_id: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
        }
    }

    /// Mod identifier.
    pub fn mod_id(&self) -> &str {
        &self.mod_id
    }

    /// `Contents/mods/<mod_id>`.
    pub fn mod_base(&self) -> PathBuf {
        PathBuf::from("Contents").join("mods").join(&self.mod_id)
    }

    /// Build 42 folder.
    pub fn v42(&self) -> PathBuf {
        self.mod_base().join("42")
    }

    /// Build 42 media folder.
    pub fn media(&self) -> PathBuf {
        self.v42().join("media")
    }

    /// Script definitions.
    pub fn scripts_dir(&self) -> PathBuf {
        self.media().join("scripts")
    }

    /// Shared Lua.
    pub fn lua_shared_dir(&self) -> PathBuf {
        self.media().join("lua").join("shared")
    }

    /// Item icons.
    pub fn textures_dir(&self) -> PathBuf {
        self.media().join("textures")
    }

    /// World model textures.
    pub fn world_textures_dir(&self) -> PathBuf {
        self.textures_dir().join("WorldItems")
    }

    /// High-resolution inspection textures.
    pub fn hr_dir(&self) -> PathBuf {
        self.textures_dir().join("HR")
    }

    /// World item meshes bundled by mods without a parent.
    pub fn models_dir(&self) -> PathBuf {
        self.media().join("models_X").join("WorldItems")
    }

    /// Bundled mesh file for `mesh`.
    pub fn mesh_file(&self, mesh: &str) -> PathBuf {
        self.models_dir().join(format!("{mesh}.fbx"))
    }

    /// Converted audio.
    pub fn sound_dir(&self) -> PathBuf {
        self.mod_base()
            .join("common")
            .join("media")
            .join("sound")
            .join(&self.mod_id)
    }

    /// Audio file of the track with item key `key`.
    pub fn sound_file(&self, key: &str) -> PathBuf {
        self.sound_dir().join(Self::sound_file_name(key))
    }

    /// File name of a track's audio.
    pub fn sound_file_name(key: &str) -> String {
        format!("{key}.ogg")
    }

    /// Reference to a track's audio as written in sound scripts.
    pub fn sound_ref(&self, key: &str) -> String {
        format!("media/sound/{}/{}", self.mod_id, Self::sound_file_name(key))
    }

    /// Texture name (no extension) shared by the model, icon and world texture.
    pub fn texture_name(variant: MaskVariant, key: &str) -> String {
        format!("{}_{key}", variant.texture_stem())
    }

    /// World texture file.
    pub fn world_texture(&self, variant: MaskVariant, key: &str) -> PathBuf {
        self.world_textures_dir()
            .join(format!("{}.png", Self::texture_name(variant, key)))
    }

    /// Inventory icon file.
    pub fn icon_texture(&self, variant: MaskVariant, key: &str) -> PathBuf {
        self.textures_dir()
            .join(format!("Item_{}.png", Self::texture_name(variant, key)))
    }

    /// High-resolution texture file.
    pub fn hr_texture(&self, variant: MaskVariant, key: &str) -> PathBuf {
        self.hr_dir().join(format!("{}_{key}.png", variant.hr_stem()))
    }

    /// Item script.
    pub fn items_script(&self) -> PathBuf {
        self.scripts_dir().join(format!("{}_Items.txt", self.mod_id))
    }

    /// Sound script.
    pub fn sounds_script(&self) -> PathBuf {
        self.scripts_dir().join(format!("{}_Sounds.txt", self.mod_id))
    }

    /// Model script.
    pub fn models_script(&self) -> PathBuf {
        self.scripts_dir().join(format!("{}_Models.txt", self.mod_id))
    }

    /// Music registration Lua.
    pub fn music_defs(&self) -> PathBuf {
        self.lua_shared_dir()
            .join(format!("{}_MusicDefs.lua", self.mod_id))
    }

    /// Base music table definitions, emitted only for standalone mods.
    pub fn standalone_music_defs(&self) -> PathBuf {
        self.lua_shared_dir().join("TCMusicDefenitions.lua")
    }

    /// Both mod.info copies.
    pub fn mod_info_files(&self) -> [PathBuf; 2] {
        [
            self.mod_base().join("mod.info"),
            self.v42().join("mod.info"),
        ]
    }

    /// Both poster copies.
    pub fn poster_files(&self) -> [PathBuf; 2] {
        [
            self.mod_base().join("poster.png"),
            self.v42().join("poster.png"),
        ]
    }

    /// Both icon copies.
    pub fn icon_files(&self) -> [PathBuf; 2] {
        [self.mod_base().join("icon.png"), self.v42().join("icon.png")]
    }

    /// Workshop description.
    pub fn workshop_txt(&self) -> PathBuf {
        PathBuf::from("workshop.txt")
    }

    /// Workshop preview.
    pub fn preview_png(&self) -> PathBuf {
        PathBuf::from("preview.png")
    }

    /// Listing of every emitted file.
    pub fn manifest(&self) -> PathBuf {
        PathBuf::from("manifest.json")
    }
}

#[cfg(test)]
#[path = "../../tests/unit/build/layout.rs"]
mod tests;
