use std::path::Path;

use crate::cover::compositor::{Texture, letterbox_square, load_base};
use crate::foundation::error::MoozicResult;

/// Side of `poster.png`.
pub const POSTER_SIDE: u32 = 1024;
/// Side of the workshop `preview.png`.
pub const PREVIEW_SIDE: u32 = 256;

const BACKDROP: [u8; 4] = [0, 0, 0, 255];

/// Poster and preview rendered from one source image.
#[derive(Clone, Debug)]
pub struct WorkshopImages {
    /// Mod poster.
    pub poster: Texture,
    /// Workshop preview.
    pub preview: Texture,
}

/// Letterbox `source` onto opaque black squares of both workshop sizes.
pub fn render_workshop_images(source: &Path) -> MoozicResult<WorkshopImages> {
    let img = load_base(source)?;
    Ok(WorkshopImages {
        poster: Texture::from_image(letterbox_square(&img, POSTER_SIDE, BACKDROP)),
        preview: Texture::from_image(letterbox_square(&img, PREVIEW_SIDE, BACKDROP)),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/cover/poster.rs"]
mod tests;
