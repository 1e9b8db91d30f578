use std::str::FromStr;

use image::RgbaImage;

use crate::foundation::error::MoozicError;
use crate::foundation::math::premultiply_px;

/// L1 distance from a key colour still treated as that key.
pub const KEY_TOLERANCE: u32 = 24;
/// Pixels below this alpha are treated as empty.
pub const MIN_ALPHA: u8 = 8;

const MAIN_KEY: [u8; 3] = [255, 0, 255];
const TRIM_KEY: [u8; 3] = [0, 255, 255];

/// Mask shapes a cover can be composited into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskVariant {
    /// Front label of a cassette.
    CassetteFront,
    /// Outer album sleeve of a vinyl.
    VinylOuter,
    /// Centre label of a vinyl record.
    VinylInner,
}

/// Stacking order of base image and frame artwork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layering {
    /// Frame drawn over the base, occluding it.
    BaseUnderFrame,
    /// Base drawn over the frame.
    BaseOverFrame,
}

impl MaskVariant {
    /// All variants.
    pub const ALL: [MaskVariant; 3] = [Self::CassetteFront, Self::VinylOuter, Self::VinylInner];

    /// File stem of the mask asset under the masks directory.
    pub fn asset_name(self) -> &'static str {
        match self {
            Self::CassetteFront => "cassette_front",
            Self::VinylOuter => "vinyl_outer",
            Self::VinylInner => "vinyl_inner",
        }
    }

    /// Name accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CassetteFront => "cassette-front",
            Self::VinylOuter => "vinyl-outer",
            Self::VinylInner => "vinyl-inner",
        }
    }

    /// How the base and frame stack.
    pub fn layering(self) -> Layering {
        match self {
            Self::CassetteFront | Self::VinylInner => Layering::BaseUnderFrame,
            Self::VinylOuter => Layering::BaseOverFrame,
        }
    }

    /// Brightness kept in trim regions, out of 255.
    pub fn trim_factor(self) -> u8 {
        match self {
            Self::CassetteFront => 128,
            Self::VinylOuter | Self::VinylInner => 214,
        }
    }

    /// Longest side of the standard-tier texture.
    pub fn standard_side(self) -> u32 {
        match self {
            Self::CassetteFront => 256,
            Self::VinylOuter | Self::VinylInner => 150,
        }
    }

    /// Texture name prefix used by models and items.
    pub fn texture_stem(self) -> &'static str {
        match self {
            Self::CassetteFront => "TMCassette",
            Self::VinylOuter => "TMVinylalbum",
            Self::VinylInner => "TMVinylrecord",
        }
    }

    /// Name prefix of the high-resolution inspection texture.
    pub fn hr_stem(self) -> &'static str {
        match self {
            Self::CassetteFront => "Cassette",
            Self::VinylOuter => "VinylAlbum",
            Self::VinylInner => "Vinyl",
        }
    }
}

impl std::fmt::Display for MaskVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskVariant {
    type Err = MoozicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s || v.asset_name() == s)
            .ok_or_else(|| {
                MoozicError::validation(format!(
                    "unknown mask variant '{s}' (expected cassette-front, vinyl-outer or vinyl-inner)"
                ))
            })
    }
}

/// Per-pixel placement regions read from a key-coloured mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRegions {
    /// Mask width.
    pub width: u32,
    /// Mask height.
    pub height: u32,
    /// Coverage (0..=255) of the main placement region.
    pub main: Vec<u8>,
    /// Coverage of the darkened trim region.
    pub trim: Vec<u8>,
    /// Mask pixels that are neither key nor noise, premultiplied RGBA8.
    pub frame: Vec<u8>,
    /// Bounding box `[x0, y0, x1, y1)` of main and trim together.
    pub bbox: Option<[u32; 4]>,
}

fn key_distance(px: &[u8], key: [u8; 3]) -> u32 {
    (0..3)
        .map(|i| u32::from(px[i].abs_diff(key[i])))
        .sum()
}

/// Split `mask` into main, trim and frame layers.
///
/// Magenta marks the main region and cyan the trim, within [`KEY_TOLERANCE`]. A mask with no key
/// pixels at all is treated as a plain stencil: its alpha becomes the main region and it has no
/// frame.
pub fn extract_regions(mask: &RgbaImage) -> KeyRegions {
    let (width, height) = mask.dimensions();
    let n = (width as usize) * (height as usize);
    let mut main = vec![0u8; n];
    let mut trim = vec![0u8; n];
    let mut frame = vec![0u8; n * 4];
    let mut keyed = false;

    for (i, px) in mask.as_raw().chunks_exact(4).enumerate() {
        if px[3] < MIN_ALPHA {
            continue;
        }
        if key_distance(px, TRIM_KEY) <= KEY_TOLERANCE {
            trim[i] = px[3];
            keyed = true;
        } else if key_distance(px, MAIN_KEY) <= KEY_TOLERANCE {
            main[i] = px[3];
            keyed = true;
        } else {
            let p = premultiply_px([px[0], px[1], px[2], px[3]]);
            frame[i * 4..i * 4 + 4].copy_from_slice(&p);
        }
    }

    if !keyed {
        for (i, px) in mask.as_raw().chunks_exact(4).enumerate() {
            main[i] = if px[3] >= MIN_ALPHA { px[3] } else { 0 };
        }
        frame.fill(0);
    }

    let bbox = bounding_box(width, height, |i| main[i] > 0 || trim[i] > 0);
    KeyRegions {
        width,
        height,
        main,
        trim,
        frame,
        bbox,
    }
}

/// Premultiplied copy of `overlay` with near-transparent pixels cleared.
pub fn clean_overlay(overlay: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(overlay.as_raw().len());
    for px in overlay.as_raw().chunks_exact(4) {
        if px[3] < MIN_ALPHA {
            out.extend_from_slice(&[0, 0, 0, 0]);
        } else {
            out.extend_from_slice(&premultiply_px([px[0], px[1], px[2], px[3]]));
        }
    }
    out
}

fn bounding_box(width: u32, height: u32, hit: impl Fn(usize) -> bool) -> Option<[u32; 4]> {
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0u32, 0u32);
    for y in 0..height {
        for x in 0..width {
            if hit((y as usize) * (width as usize) + x as usize) {
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x + 1);
                y1 = y1.max(y + 1);
            }
        }
    }
    (x0 < x1 && y0 < y1).then_some([x0, y0, x1, y1])
}

#[cfg(test)]
#[path = "../../tests/unit/cover/mask.rs"]
mod tests;
