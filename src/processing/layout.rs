use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::RgbaImage;

/// Target size with the longer edge clamped to `long_edge`, preserving aspect ratio.
///
/// Returns `None` when no resize is needed: `long_edge` is 0 or the image already fits.
/// Never upscales.
pub fn fit_long_edge(src_w: u32, src_h: u32, long_edge: u32) -> Option<(u32, u32)> {
    let longest = src_w.max(src_h);
    if long_edge == 0 || longest <= long_edge {
        return None;
    }
    let scale = long_edge as f64 / longest as f64;
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, long_edge);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, long_edge);
    Some((w, h))
}

pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .context("failed to construct resized RGBA image")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_clamped_on_width() {
        assert_eq!(fit_long_edge(4000, 3000, 1920), Some((1920, 1440)));
    }

    #[test]
    fn portrait_is_clamped_on_height() {
        assert_eq!(fit_long_edge(3000, 4000, 1000), Some((750, 1000)));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        assert_eq!(fit_long_edge(800, 600, 1920), None);
        assert_eq!(fit_long_edge(1920, 1080, 1920), None);
    }

    #[test]
    fn zero_long_edge_disables_resizing() {
        assert_eq!(fit_long_edge(8000, 6000, 0), None);
    }

    #[test]
    fn extreme_aspect_never_collapses_to_zero() {
        assert_eq!(fit_long_edge(10_000, 1, 100), Some((100, 1)));
    }

    #[test]
    fn resize_produces_requested_dimensions() {
        let src = RgbaImage::from_pixel(40, 20, image::Rgba([10, 20, 30, 255]));
        let out = resize_rgba(&src, 10, 5).unwrap();
        assert_eq!(out.dimensions(), (10, 5));
        assert_eq!(out.get_pixel(5, 2).0, [10, 20, 30, 255]);
    }
}
