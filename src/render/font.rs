use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{Path as SkiaPath, PathBuilder};
use ttf_parser::{Face, GlyphId, OutlineBuilder, name_id};
use usvg::fontdb;

use crate::error::RenderError;

/// Families tried, in order, when no font is configured. All of them cover CJK.
pub const FALLBACK_FAMILIES: &[&str] = &[
    "Noto Sans Mono CJK SC",
    "Noto Sans CJK SC",
    "Source Han Sans SC",
    "WenQuanYi Zen Hei Mono",
    "WenQuanYi Micro Hei",
    "Microsoft YaHei",
    "PingFang SC",
    "Arial Unicode MS",
    "sans-serif",
];

#[derive(Clone)]
pub struct FontFace {
    data: Arc<Vec<u8>>,
    face_index: u32,
    family: Option<String>,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .finish()
    }
}

impl FontFace {
    pub fn from_data(data: Vec<u8>, face_index: u32) -> Result<Self, RenderError> {
        let face = Face::parse(&data, face_index).map_err(|_| RenderError::InvalidFont)?;
        let family = extract_family_name(&face);
        Ok(Self {
            data: Arc::new(data),
            face_index,
            family,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data, 0)
            .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn face(&self) -> Result<Face<'_>, RenderError> {
        Face::parse(&self.data, self.face_index).map_err(|_| RenderError::InvalidFont)
    }

    /// Lays `text` out on a single line in font units. Whitespace without a glyph
    /// advances by the space width; any other unmapped character is an error.
    pub fn layout(&self, text: &str) -> Result<TextLayout, RenderError> {
        let face = self.face()?;
        let units_per_em = f32::from(face.units_per_em().max(1));
        let ascender = f32::from(face.ascender());
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .map(f32::from)
            .unwrap_or(units_per_em / 2.0);

        let mut glyphs = Vec::new();
        let mut ink: Option<InkRect> = None;
        let mut pen_x = 0.0f32;
        for ch in text.chars() {
            let Some(id) = face.glyph_index(ch) else {
                if ch.is_whitespace() {
                    pen_x += space_advance;
                    continue;
                }
                return Err(RenderError::MissingGlyph(ch));
            };
            if let Some(rect) = face.glyph_bounding_box(id) {
                let glyph_ink = InkRect {
                    left: pen_x + f32::from(rect.x_min),
                    right: pen_x + f32::from(rect.x_max),
                    top: ascender - f32::from(rect.y_max),
                    bottom: ascender - f32::from(rect.y_min),
                };
                ink = Some(match ink {
                    Some(current) => current.union(glyph_ink),
                    None => glyph_ink,
                });
            }
            glyphs.push(PlacedGlyph { id, x: pen_x });
            pen_x += face.glyph_hor_advance(id).map(f32::from).unwrap_or(space_advance);
        }

        Ok(TextLayout {
            glyphs,
            ink,
            units_per_em,
            ascender,
        })
    }

    /// Outlines a laid-out line at `size` pixels with its ascender-top-left corner at
    /// `origin`. `None` when nothing has an outline.
    pub fn outline(
        &self,
        layout: &TextLayout,
        size: u32,
        origin: (f32, f32),
    ) -> Result<Option<SkiaPath>, RenderError> {
        let face = self.face()?;
        let scale = size as f32 / layout.units_per_em;
        let mut sink = PathSink {
            builder: PathBuilder::new(),
            scale,
            origin_x: origin.0,
            baseline: origin.1 + layout.ascender * scale,
            pen_x: 0.0,
        };
        for glyph in &layout.glyphs {
            sink.pen_x = glyph.x;
            face.outline_glyph(glyph.id, &mut sink);
        }
        Ok(sink.builder.finish())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InkRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl InkRect {
    fn union(self, other: InkRect) -> InkRect {
        InkRect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PlacedGlyph {
    pub id: GlyphId,
    pub x: f32,
}

/// One line of glyphs in font units. The ink rectangle is measured from the pen
/// origin with y growing downwards from the ascender line.
#[derive(Debug, Clone)]
pub struct TextLayout {
    pub(crate) glyphs: Vec<PlacedGlyph>,
    pub(crate) ink: Option<InkRect>,
    pub(crate) units_per_em: f32,
    pub(crate) ascender: f32,
}

/// Ink extent in whole pixels at a given size, relative to the text origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl TextLayout {
    pub fn pixel_box(&self, size: u32) -> Option<PixelBox> {
        let ink = self.ink?;
        let scale = size as f32 / self.units_per_em;
        let left = (ink.left * scale).floor() as i32;
        let top = (ink.top * scale).floor() as i32;
        let right = (ink.right * scale).ceil() as i32;
        let bottom = (ink.bottom * scale).ceil() as i32;
        Some(PixelBox {
            left,
            top,
            width: (right - left).max(0) as u32,
            height: (bottom - top).max(0) as u32,
        })
    }

    /// Largest size in `1..=max_size` whose ink still fits `width` x `height`,
    /// growing one pixel at a time and stopping at the first overflow.
    pub fn fit_size(&self, width: u32, height: u32, max_size: u32) -> Option<u32> {
        let mut fitted = None;
        for size in 1..=max_size {
            let pixel_box = self.pixel_box(size)?;
            if pixel_box.width > width || pixel_box.height > height {
                break;
            }
            fitted = Some(size);
        }
        fitted
    }
}

struct PathSink {
    builder: PathBuilder,
    scale: f32,
    origin_x: f32,
    baseline: f32,
    pen_x: f32,
}

impl PathSink {
    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.origin_x + (self.pen_x + x) * self.scale,
            self.baseline - y * self.scale,
        )
    }
}

impl OutlineBuilder for PathSink {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Picks the drawing font: an explicit file first, then a named system family, then
/// the first installed family of `fallback`.
pub fn resolve_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fallback: &[&str],
) -> Result<FontFace> {
    if let Some(path) = font_path {
        return FontFace::load(path);
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        return load_family(&db, family);
    }

    for candidate in fallback {
        if let Ok(font) = load_family(&db, candidate) {
            return Ok(font);
        }
    }

    Err(anyhow!("no fallback fonts found"))
}

fn load_family(db: &fontdb::Database, family: &str) -> Result<FontFace> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    FontFace::from_data(data, face_index)
        .map_err(|err| anyhow!("failed to parse font {}: {}", family, err))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1000 units per em, a single 600x700 glyph sitting on the baseline
    fn square_layout() -> TextLayout {
        TextLayout {
            glyphs: vec![PlacedGlyph {
                id: GlyphId(1),
                x: 0.0,
            }],
            ink: Some(InkRect {
                left: 50.0,
                top: 100.0,
                right: 650.0,
                bottom: 800.0,
            }),
            units_per_em: 1000.0,
            ascender: 800.0,
        }
    }

    #[test]
    fn pixel_box_scales_and_rounds_outwards() {
        let pixel_box = square_layout().pixel_box(10).unwrap();
        assert_eq!(
            pixel_box,
            PixelBox {
                left: 0,
                top: 1,
                width: 7,
                height: 7,
            }
        );
    }

    #[test]
    fn fit_stops_at_first_overflow() {
        let layout = square_layout();
        let size = layout.fit_size(60, 20, 500).unwrap();
        let fitted = layout.pixel_box(size).unwrap();
        assert!(fitted.width <= 60 && fitted.height <= 20);
        let next = layout.pixel_box(size + 1).unwrap();
        assert!(next.width > 60 || next.height > 20);
    }

    #[test]
    fn fit_respects_maximum_size() {
        assert_eq!(square_layout().fit_size(10_000, 10_000, 48), Some(48));
    }

    #[test]
    fn nothing_fits_a_tiny_box() {
        assert_eq!(square_layout().fit_size(0, 0, 500), None);
    }

    #[test]
    fn layout_without_ink_has_no_size() {
        let layout = TextLayout {
            glyphs: Vec::new(),
            ink: None,
            units_per_em: 1000.0,
            ascender: 800.0,
        };
        assert_eq!(layout.fit_size(100, 100, 500), None);
    }

    #[test]
    fn invalid_font_data_is_rejected() {
        assert!(matches!(
            FontFace::from_data(vec![0, 1, 2, 3], 0),
            Err(RenderError::InvalidFont)
        ));
    }

    fn tuffy() -> FontFace {
        FontFace::from_data(include_bytes!("../../tests/fixtures/Tuffy.ttf").to_vec(), 0).unwrap()
    }

    #[test]
    fn bundled_font_measures_wider_text_as_wider() {
        let font = tuffy();
        assert!(font.family().is_some_and(|family| family.contains("Tuffy")));
        let short = font.layout("Hi").unwrap();
        let long = font.layout("Hi there, friend").unwrap();
        let short_box = short.pixel_box(20).unwrap();
        let long_box = long.pixel_box(20).unwrap();
        assert!(long_box.width > short_box.width);
        assert!(long.fit_size(100, 20, 500) <= short.fit_size(100, 20, 500));
    }

    #[test]
    fn unmapped_character_is_a_missing_glyph() {
        assert!(matches!(tuffy().layout("你好"), Err(RenderError::MissingGlyph('你'))));
        assert!(tuffy().layout("a b").is_ok());
    }

    #[test]
    fn outline_lands_inside_the_measured_box() {
        let font = tuffy();
        let layout = font.layout("Hello").unwrap();
        let pixel_box = layout.pixel_box(32).unwrap();
        let path = font.outline(&layout, 32, (0.0, 0.0)).unwrap().unwrap();
        let bounds = path.bounds();
        let slack = 0.5;
        assert!(bounds.left() >= pixel_box.left as f32 - slack);
        assert!(bounds.top() >= pixel_box.top as f32 - slack);
        assert!(bounds.right() <= (pixel_box.left + pixel_box.width as i32) as f32 + slack);
        assert!(bounds.bottom() <= (pixel_box.top + pixel_box.height as i32) as f32 + slack);
    }
}
