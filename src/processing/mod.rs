//! Decode → orient → fit → caption → JPEG pipeline used by the render cache.

pub mod caption;
pub mod layout;
pub mod metadata;

use std::io::Cursor;

use ab_glyph::FontArc;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError, ImageReader, RgbaImage};
use tracing::{debug, warn};

use crate::config::RenderOptions;
use crate::error::Error;

#[derive(Clone)]
pub struct Caption {
    pub template: String,
    pub font: FontArc,
    pub size: f32,
    pub shadow: bool,
}

/// Everything a render needs besides the original bytes.
#[derive(Clone)]
pub struct RenderSpec {
    pub long_edge: u32,
    pub quality: u8,
    pub caption: Option<Caption>,
}

impl RenderSpec {
    /// Resolve the caption font once up front. A missing font disables captions.
    pub fn from_options(options: &RenderOptions) -> Self {
        let caption = if options.caption.enabled {
            match caption::load_font(options.caption.font_path.as_deref()) {
                Ok(font) => Some(Caption {
                    template: options.caption.template.clone(),
                    font,
                    size: options.caption.font_size,
                    shadow: options.caption.shadow,
                }),
                Err(err) => {
                    warn!(error = %err, "caption font unavailable; captions disabled");
                    None
                }
            }
        } else {
            None
        };
        Self {
            long_edge: options.long_edge,
            quality: options.jpeg_quality,
            caption,
        }
    }
}

impl std::fmt::Debug for RenderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSpec")
            .field("long_edge", &self.long_edge)
            .field("quality", &self.quality)
            .field("caption", &self.caption.as_ref().map(|c| &c.template))
            .finish()
    }
}

/// Decode with the format sniffed from content, not the file extension.
pub fn decode(bytes: &[u8], path: &str) -> Result<RgbaImage, Error> {
    let failure = |source: ImageError| Error::DecodeFailure {
        path: path.to_owned(),
        source,
    };
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| failure(ImageError::IoError(err)))?
        .decode()
        .map_err(failure)?;
    Ok(img.to_rgba8())
}

pub fn encode_jpeg(img: &RgbaImage, quality: u8) -> Result<Vec<u8>, Error> {
    let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|err| Error::Render(err.into()))?;
    Ok(out)
}

/// Full pipeline for one original. CPU-bound; call from a blocking thread.
pub fn render_jpeg(
    bytes: &[u8],
    spec: &RenderSpec,
    path: &str,
    filename: &str,
) -> Result<Vec<u8>, Error> {
    let mut img = decode(bytes, path)?;
    if let Some(orientation) = metadata::read_orientation(bytes) {
        img = metadata::apply_orientation(img, orientation);
    }
    if let Some((w, h)) = layout::fit_long_edge(img.width(), img.height(), spec.long_edge) {
        debug!(from = ?img.dimensions(), to = ?(w, h), "fitting long edge");
        img = layout::resize_rgba(&img, w, h).map_err(Error::Render)?;
    }
    if let Some(caption) = &spec.caption {
        let stamp = metadata::capture_timestamp(bytes);
        let text = caption::format_caption(&caption.template, stamp.as_deref(), filename);
        caption::draw_caption(&mut img, &caption.font, caption.size, caption.shadow, &text);
    }
    encode_jpeg(&img, spec.quality)
}
