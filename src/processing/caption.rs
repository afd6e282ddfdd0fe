//! Caption text rendered onto the bottom-left corner of a slide.

use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use fontdb::{Database, Family, Query, Source};
use image::RgbaImage;

const SHADOW_OFFSET: f32 = 2.0;
const MARGIN_FACTOR: f32 = 0.6;
const DATETIME: &str = "{datetime}";
const SEPARATORS: &[char] = &[' ', '\t', '·', '-', '|'];

/// Load the configured face, or the first usable system sans-serif.
pub fn load_font(path: Option<&Path>) -> Result<FontArc> {
    if let Some(path) = path {
        let data =
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?;
        return FontArc::try_from_vec(data)
            .with_context(|| format!("failed to decode font at {}", path.display()));
    }

    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::Name("Liberation Sans"),
        Family::SansSerif,
    ];

    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }

    for face in db.faces() {
        if let Some(font) = load_face(&db, face.id)? {
            return Ok(font);
        }
    }

    Err(anyhow!("no usable system font for captions"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    Ok(FontArc::try_from_vec(data).ok())
}

/// Substitute `{datetime}` and `{filename}`. An unknown timestamp takes the
/// template separator next to it along; the filename is inserted verbatim.
pub fn format_caption(template: &str, datetime: Option<&str>, filename: &str) -> String {
    let template = match datetime {
        Some(stamp) => template.replace(DATETIME, stamp),
        None => drop_placeholder(template, DATETIME),
    };
    template.replace("{filename}", filename)
}

/// Remove every `placeholder`, plus the separator run before it, or after it
/// when nothing precedes.
fn drop_placeholder(template: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(at) = rest.find(placeholder) {
        let before = &rest[..at];
        let after = &rest[at + placeholder.len()..];
        let kept = before.trim_end_matches(SEPARATORS);
        out.push_str(kept);
        rest = if kept.len() < before.len() {
            after
        } else {
            after.trim_start_matches(SEPARATORS)
        };
    }
    out.push_str(rest);
    out
}

/// Draw `text` white-on-shadow, bottom-left, with a margin of `0.6 * size`.
pub fn draw_caption(img: &mut RgbaImage, font: &FontArc, size: f32, shadow: bool, text: &str) {
    if text.is_empty() {
        return;
    }
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let margin = size * MARGIN_FACTOR;
    let left = margin;
    let baseline = img.height() as f32 - margin - scaled.descent().abs();
    if shadow {
        draw_text(
            img,
            font,
            text,
            [0, 0, 0],
            left + SHADOW_OFFSET,
            baseline + SHADOW_OFFSET,
            scale,
        );
    }
    draw_text(img, font, text, [255, 255, 255], left, baseline, scale);
}

fn draw_text(
    img: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    color: [u8; 3],
    left: f32,
    baseline: f32,
    scale: PxScale,
) {
    let scaled = font.as_scaled(scale);
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let advance = scaled.h_advance(glyph);
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                blend_pixel(
                    img,
                    bounds.min.x + x as f32,
                    bounds.min.y + y as f32,
                    color,
                    coverage,
                );
            });
        }
        cursor_x += advance;
        previous = Some(glyph);
    }
}

fn blend_pixel(img: &mut RgbaImage, x: f32, y: f32, color: [u8; 3], coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    if xi < 0 || yi < 0 || xi >= i64::from(img.width()) || yi >= i64::from(img.height()) {
        return;
    }
    let alpha = coverage.clamp(0.0, 1.0);
    let px = img.get_pixel_mut(xi as u32, yi as u32);
    for (dst, src) in px.0.iter_mut().zip(color) {
        let blended = f32::from(src) * alpha + f32::from(*dst) * (1.0 - alpha);
        *dst = blended.round().clamp(0.0, 255.0) as u8;
    }
}
