use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use rand::Rng;

use crate::cover::mask::{Layering, MaskVariant, clean_overlay, extract_regions};
use crate::foundation::core::write_atomic;
use crate::foundation::error::{CoverError, MoozicError, MoozicResult};
use crate::foundation::math::{mul_div255, over, premultiply_px, scale_px, unpremultiply_px};
use crate::project::model::ResolutionTier;

/// Upper bound on the longest side of a high-resolution texture.
pub const MAX_HIGH_RES_SIDE: u32 = 2048;
/// Longest side of inventory icons.
pub const ICON_SIDE: u32 = 32;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// A finished texture, straight-alpha RGBA8, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texture {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes.
    pub data: Vec<u8>,
}

impl Texture {
    /// Wrap an image.
    pub fn from_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    /// Copy into an `image` buffer.
    pub fn to_image(&self) -> MoozicResult<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            MoozicError::Other(anyhow::anyhow!(
                "texture buffer does not match {}x{}",
                self.width,
                self.height
            ))
        })
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> MoozicResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_image()?
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| MoozicError::Other(anyhow::Error::new(e).context("encode png")))?;
        Ok(buf)
    }

    /// Write as PNG at `path`.
    pub fn save_png(&self, path: &Path) -> MoozicResult<()> {
        write_atomic(path, &self.encode_png()?)
    }

    /// Copy scaled so the longest side is `side`, keeping aspect.
    pub fn downscaled(&self, side: u32) -> MoozicResult<Texture> {
        let (w, h) = fit_within(self.width, self.height, side);
        if (w, h) == (self.width, self.height) {
            return Ok(self.clone());
        }
        let img = image::imageops::resize(&self.to_image()?, w, h, FilterType::Lanczos3);
        Ok(Texture::from_image(img))
    }
}

/// Size with longest side `side` and the aspect of `w`×`h`.
pub fn fit_within(w: u32, h: u32, side: u32) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (side, side);
    }
    if w >= h {
        let nh = ((u64::from(h) * u64::from(side) + u64::from(w) / 2) / u64::from(w)).max(1);
        (side, nh as u32)
    } else {
        let nw = ((u64::from(w) * u64::from(side) + u64::from(h) / 2) / u64::from(h)).max(1);
        (nw as u32, side)
    }
}

/// Longest output side for `variant` at `tier`, given the base image dimensions.
pub fn tier_side(variant: MaskVariant, tier: ResolutionTier, base_dims: (u32, u32)) -> u32 {
    let standard = variant.standard_side();
    match tier {
        ResolutionTier::Standard => standard,
        ResolutionTier::HighRes => base_dims
            .0
            .max(base_dims.1)
            .max(standard)
            .min(MAX_HIGH_RES_SIDE),
    }
}

/// Decode a base image. A missing file and an undecodable one are distinct errors.
pub fn load_base(path: &Path) -> MoozicResult<RgbaImage> {
    load_rgba(path).map_err(|e| match e {
        LoadError::NotFound => CoverError::MissingBase {
            path: path.to_path_buf(),
        }
        .into(),
        LoadError::Io(e) => MoozicError::io(path, e),
        LoadError::Decode(reason) => CoverError::UnsupportedImage {
            path: path.to_path_buf(),
            reason,
        }
        .into(),
    })
}

enum LoadError {
    NotFound,
    Io(std::io::Error),
    Decode(String),
}

fn load_rgba(path: &Path) -> Result<RgbaImage, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoadError::NotFound
        } else {
            LoadError::Io(e)
        }
    })?;
    image::load_from_memory(&bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| LoadError::Decode(e.to_string()))
}

/// Scale `img` to cover `w`×`h` and crop the centre.
pub fn cover_crop(img: &RgbaImage, w: u32, h: u32) -> RgbaImage {
    let (sw, sh) = img.dimensions();
    if (sw, sh) == (w, h) {
        return img.clone();
    }
    let scale = (f64::from(w) / f64::from(sw.max(1))).max(f64::from(h) / f64::from(sh.max(1)));
    let nw = ((f64::from(sw) * scale).ceil() as u32).max(w);
    let nh = ((f64::from(sh) * scale).ceil() as u32).max(h);
    let resized = image::imageops::resize(img, nw, nh, FilterType::Lanczos3);
    let x = (nw - w) / 2;
    let y = (nh - h) / 2;
    image::imageops::crop_imm(&resized, x, y, w, h).to_image()
}

/// Scale `img` to fit inside a `side`² square on `bg`, centred.
pub fn letterbox_square(img: &RgbaImage, side: u32, bg: [u8; 4]) -> RgbaImage {
    let (w, h) = fit_within(img.width(), img.height(), side);
    let resized = image::imageops::resize(img, w, h, FilterType::Lanczos3);
    let mut canvas = RgbaImage::from_pixel(side, side, image::Rgba(bg));
    let backdrop = premultiply_px(bg);
    let (ox, oy) = ((side - w) / 2, (side - h) / 2);
    for (x, y, px) in resized.enumerate_pixels() {
        let blended = over(backdrop, premultiply_px(px.0));
        canvas.put_pixel(ox + x, oy + y, image::Rgba(unpremultiply_px(blended)));
    }
    canvas
}

struct MaskAssets {
    mask: RgbaImage,
    overlay: Option<RgbaImage>,
}

struct VariantAssets {
    world: MaskAssets,
    item: Option<MaskAssets>,
}

/// Composites base images into mask variants.
///
/// Mask assets are read from `<masks_dir>/<variant>.png`, with optional frame artwork in
/// `<masks_dir>/<variant>_overlay.png`, and cached after first use. A variant may also ship a
/// dedicated inventory icon mask as `<variant>_item.png` (plus `<variant>_item_overlay.png`);
/// without one, icons are downscaled from the world texture. The compositor is shared across
/// worker threads; output depends only on its inputs.
pub struct Compositor {
    masks_dir: PathBuf,
    loaded: Mutex<HashMap<MaskVariant, Arc<VariantAssets>>>,
}

impl Compositor {
    /// Compositor reading masks from `masks_dir`.
    pub fn new(masks_dir: impl Into<PathBuf>) -> Self {
        Self {
            masks_dir: masks_dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Location of the mask asset for `variant`.
    pub fn mask_path(&self, variant: MaskVariant) -> PathBuf {
        self.asset_path(variant, "")
    }

    fn asset_path(&self, variant: MaskVariant, suffix: &str) -> PathBuf {
        self.masks_dir
            .join(format!("{}{suffix}.png", variant.asset_name()))
    }

    fn assets(&self, variant: MaskVariant) -> MoozicResult<Arc<VariantAssets>> {
        if let Some(a) = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&variant)
        {
            return Ok(a.clone());
        }

        let mask_path = self.mask_path(variant);
        let mask = load_optional(&mask_path)?.ok_or_else(|| CoverError::MissingMask {
            variant: variant.to_string(),
            path: mask_path.clone(),
        })?;
        let world = MaskAssets {
            mask,
            overlay: load_optional(&self.asset_path(variant, "_overlay"))?,
        };
        let item = match load_optional(&self.asset_path(variant, "_item"))? {
            Some(mask) => Some(MaskAssets {
                mask,
                overlay: load_optional(&self.asset_path(variant, "_item_overlay"))?,
            }),
            None => None,
        };

        let assets = Arc::new(VariantAssets { world, item });
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(variant, assets.clone());
        Ok(assets)
    }

    /// Composite the image at `base` into `variant` at `tier`.
    #[tracing::instrument(skip(self), fields(base = %base.display()))]
    pub fn composite(
        &self,
        base: &Path,
        variant: MaskVariant,
        tier: ResolutionTier,
    ) -> MoozicResult<Texture> {
        let base = load_base(base)?;
        self.composite_image(&base, variant, tier)
    }

    /// Composite an already decoded base image.
    pub fn composite_image(
        &self,
        base: &RgbaImage,
        variant: MaskVariant,
        tier: ResolutionTier,
    ) -> MoozicResult<Texture> {
        let assets = self.assets(variant)?;
        let side = tier_side(variant, tier, base.dimensions());
        let (w, h) = fit_within(assets.world.mask.width(), assets.world.mask.height(), side);
        render(base, variant, &assets.world, w, h)
    }

    /// Composite at an explicit output size. Both tiers go through here.
    pub fn composite_sized(
        &self,
        base: &RgbaImage,
        variant: MaskVariant,
        width: u32,
        height: u32,
    ) -> MoozicResult<Texture> {
        let assets = self.assets(variant)?;
        render(base, variant, &assets.world, width, height)
    }

    /// Inventory icon for `variant`, at most [`ICON_SIDE`] on its longest edge.
    ///
    /// Uses the variant's item mask when one exists, otherwise downscales `world`.
    pub fn icon(
        &self,
        base: &RgbaImage,
        variant: MaskVariant,
        world: &Texture,
    ) -> MoozicResult<Texture> {
        let assets = self.assets(variant)?;
        match &assets.item {
            Some(item) => {
                let (w, h) = fit_within(item.mask.width(), item.mask.height(), ICON_SIDE);
                render(base, variant, item, w, h)
            }
            None => world.downscaled(ICON_SIDE),
        }
    }
}

/// Reads an optional asset: `None` when absent, an error when unreadable or undecodable.
fn load_optional(path: &Path) -> MoozicResult<Option<RgbaImage>> {
    match load_rgba(path) {
        Ok(img) => Ok(Some(img)),
        Err(LoadError::NotFound) => Ok(None),
        Err(LoadError::Io(e)) => Err(MoozicError::io(path, e)),
        Err(LoadError::Decode(reason)) => Err(CoverError::UnsupportedImage {
            path: path.to_path_buf(),
            reason,
        }
        .into()),
    }
}

fn render(
    base: &RgbaImage,
    variant: MaskVariant,
    assets: &MaskAssets,
    width: u32,
    height: u32,
) -> MoozicResult<Texture> {
    if width == 0 || height == 0 {
        return Err(MoozicError::validation("texture size must be non-zero"));
    }

    let mask = if assets.mask.dimensions() == (width, height) {
        assets.mask.clone()
    } else {
        image::imageops::resize(&assets.mask, width, height, FilterType::Nearest)
    };
    let regions = extract_regions(&mask);
    let frame = match &assets.overlay {
        Some(overlay) if overlay.dimensions() == (width, height) => clean_overlay(overlay),
        Some(overlay) => clean_overlay(&image::imageops::resize(
            overlay,
            width,
            height,
            FilterType::Lanczos3,
        )),
        None => regions.frame.clone(),
    };

    let mut layer = vec![0u8; (width as usize) * (height as usize) * 4];
    if let Some([x0, y0, x1, y1]) = regions.bbox {
        let fitted = cover_crop(base, x1 - x0, y1 - y0);
        let trim_factor = u16::from(variant.trim_factor());
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y as usize) * (width as usize) + x as usize;
                let (m, t) = (regions.main[i], regions.trim[i]);
                if m == 0 && t == 0 {
                    continue;
                }
                let src = fitted.get_pixel(x - x0, y - y0).0;
                let px = premultiply_px(src);
                let px = if t > 0 {
                    let dark = [
                        mul_div255(u16::from(px[0]), trim_factor),
                        mul_div255(u16::from(px[1]), trim_factor),
                        mul_div255(u16::from(px[2]), trim_factor),
                        px[3],
                    ];
                    scale_px(dark, t)
                } else {
                    scale_px(px, m)
                };
                layer[i * 4..i * 4 + 4].copy_from_slice(&px);
            }
        }
    } else {
        tracing::warn!(%variant, "mask has no placement region; output is frame only");
    }

    let mut data = vec![0u8; layer.len()];
    for ((out, l), f) in data
        .chunks_exact_mut(4)
        .zip(layer.chunks_exact(4))
        .zip(frame.chunks_exact(4))
    {
        let l = [l[0], l[1], l[2], l[3]];
        let f = [f[0], f[1], f[2], f[3]];
        let px = match variant.layering() {
            Layering::BaseUnderFrame => over(l, f),
            Layering::BaseOverFrame => over(f, l),
        };
        out.copy_from_slice(&unpremultiply_px(px));
    }

    Ok(Texture {
        width,
        height,
        data,
    })
}

/// How a default cover is picked when a track has no override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSelection {
    /// Stable pick per track key; same seed and pool give the same choice every build.
    Seeded(u64),
    /// Fresh random pick each build.
    Random,
}

impl Default for CoverSelection {
    fn default() -> Self {
        Self::Seeded(0)
    }
}

/// Fixed set of fallback cover images.
#[derive(Clone, Debug)]
pub struct DefaultCoverPool {
    dir: PathBuf,
    images: Vec<PathBuf>,
}

impl DefaultCoverPool {
    /// Collect image files in `dir`, sorted by name. A missing directory gives an empty pool.
    pub fn scan(dir: impl Into<PathBuf>) -> MoozicResult<Self> {
        let dir = dir.into();
        let mut images = Vec::new();
        match std::fs::read_dir(&dir) {
            Ok(read) => {
                for entry in read {
                    let path = entry.map_err(|e| MoozicError::io(&dir, e))?.path();
                    let is_image = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                        .unwrap_or(false);
                    if is_image && path.is_file() {
                        images.push(path);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MoozicError::io(&dir, e)),
        }
        images.sort();
        Ok(Self { dir, images })
    }

    /// Pool from an explicit list, kept in the given order.
    pub fn from_images(dir: impl Into<PathBuf>, images: Vec<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            images,
        }
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the pool has no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Pick an image for the track with item key `key`.
    pub fn select(&self, key: &str, selection: CoverSelection) -> MoozicResult<&Path> {
        if self.images.is_empty() {
            return Err(CoverError::EmptyDefaultPool {
                dir: self.dir.clone(),
            }
            .into());
        }
        let idx = match selection {
            CoverSelection::Seeded(seed) => {
                (xxhash_rust::xxh3::xxh3_64_with_seed(key.as_bytes(), seed) % self.images.len() as u64)
                    as usize
            }
            CoverSelection::Random => rand::thread_rng().gen_range(0..self.images.len()),
        };
        Ok(&self.images[idx])
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cover/compositor.rs"]
mod tests;
