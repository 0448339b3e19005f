//! Image extraction: embedded bitmaps → PNG files (or inline data URIs).
//!
//! Images are written as `imagem_{n}.png` under `{image_dir}/images/`,
//! numbered across the document in page order. Bitmaps smaller than
//! [`MIN_IMAGE_SIDE`] on either side are decorations (rules, bullets, logos
//! cut into tiles) and are skipped.
//!
//! ## Why PNG?
//! Lossless compression keeps figure text and line art crisp; the files are
//! linked from the Markdown, so size matters less than fidelity.

use super::context::{ConversionContext, Field, ImageRef};
use super::{Metric, Stage, StageEnv, StageReport};
use crate::config::ImageLinkStyle;
use crate::error::StageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// Smallest width or height, in pixels, of an image worth keeping.
pub const MIN_IMAGE_SIDE: u32 = 50;

/// Folder created inside the image directory.
const IMAGES_SUBDIR: &str = "images";

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// `data:image/png;base64,…` for already-encoded PNG bytes.
pub fn data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Link path for an image file name.
pub fn relative_link(file_name: &str) -> String {
    format!("./{IMAGES_SUBDIR}/{file_name}")
}

/// Saves embedded images and records references to them.
pub struct ExtractImages;

impl ExtractImages {
    fn save(
        dir: &Path,
        index: usize,
        page: usize,
        img: &DynamicImage,
        style: ImageLinkStyle,
    ) -> Result<ImageRef, StageError> {
        let png = encode_png(img).map_err(|e| StageError::Io(e.to_string()))?;
        let file_name = format!("imagem_{index}.png");
        let path = dir.join(&file_name);
        std::fs::write(&path, &png)?;
        debug!(path = %path.display(), bytes = png.len(), "image saved");
        Ok(ImageRef {
            page,
            index,
            path,
            relative_path: relative_link(&file_name),
            inline_data: matches!(style, ImageLinkStyle::Inline).then(|| data_uri(&png)),
        })
    }
}

impl Stage for ExtractImages {
    fn name(&self) -> &'static str {
        "extract-images"
    }

    fn reads(&self) -> &'static [Field] {
        &[]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Images]
    }

    fn run(
        &self,
        ctx: &mut ConversionContext,
        env: &StageEnv<'_>,
    ) -> Result<StageReport, StageError> {
        let Some(base) = env.config.image_dir.as_deref() else {
            ctx.set_images(Vec::new());
            return Ok(StageReport::skipped("image extraction disabled"));
        };
        let images = env
            .source
            .images()
            .map_err(|e| StageError::Source(e.to_string()))?;
        let kept: Vec<_> = images
            .iter()
            .filter(|i| i.image.width() >= MIN_IMAGE_SIDE && i.image.height() >= MIN_IMAGE_SIDE)
            .collect();
        if kept.is_empty() {
            ctx.set_images(Vec::new());
            return Ok(StageReport::skipped(format!(
                "{} images, none large enough",
                images.len()
            )));
        }

        let dir = base.join(IMAGES_SUBDIR);
        std::fs::create_dir_all(&dir)?;

        let mut refs = Vec::with_capacity(kept.len());
        for img in kept {
            match Self::save(&dir, refs.len() + 1, img.page, &img.image, env.config.image_links) {
                Ok(r) => refs.push(r),
                Err(e) => warn!(page = img.page, error = %e, "image not saved"),
            }
        }
        let saved = refs.len();
        ctx.set_images(refs);
        Ok(StageReport::done()
            .with_note(format!("{saved} of {} images saved", images.len()))
            .with_metric(Metric::ImagesExtracted, saved))
    }
}
