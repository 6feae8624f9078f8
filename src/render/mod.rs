//! Redraws an image with translated text: each block's box is painted over with a
//! sampled background color and the translation is drawn centered at the largest
//! size that fits.

mod bbox;
mod color;
mod font;

use image::{ColorType, DynamicImage, Rgba, RgbaImage};
use std::path::Path;
use tiny_skia::{Color, FillRule, Paint, Pixmap, Transform};
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::ocr::TranslatedBlock;
use crate::settings::RenderSettings;

pub use bbox::BoundingBox;
pub use color::{
    DEFAULT_BACKGROUND, Rgb, add_discoloration, luminance, sample_background, text_color_for,
};
pub use font::{FALLBACK_FAMILIES, FontFace, PixelBox, TextLayout, resolve_font};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Pixels added around a box when sampling its background.
    pub margin: u32,
    pub discoloration: u8,
    pub max_font_size: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            margin: 10,
            discoloration: 40,
            max_font_size: 500,
        }
    }
}

impl From<&RenderSettings> for RenderOptions {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            margin: settings.margin,
            discoloration: settings.discoloration,
            max_font_size: settings.max_font_size,
        }
    }
}

pub struct Reconstructor {
    options: RenderOptions,
    font: Option<FontFace>,
}

impl Reconstructor {
    /// Without a font the reconstructor still erases the original text.
    pub fn new(options: RenderOptions, font: Option<FontFace>) -> Self {
        Self { options, font }
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        let font = resolve_font(
            settings.font_path.as_deref().map(Path::new),
            settings.font_family.as_deref(),
            FALLBACK_FAMILIES,
        );
        let font = match font {
            Ok(font) => {
                debug!(family = font.family().unwrap_or("unknown"), "render font resolved");
                Some(font)
            }
            Err(err) => {
                warn!(error = %err, "no usable font; translated text will not be drawn");
                None
            }
        };
        Self::new(RenderOptions::from(settings), font)
    }

    pub fn font(&self) -> Option<&FontFace> {
        self.font.as_ref()
    }

    /// Returns a new image of the same size and color type. Blocks with an empty
    /// translation are left untouched; per-block failures are logged and skipped.
    pub fn reconstruct(&self, image: &DynamicImage, blocks: &[TranslatedBlock]) -> DynamicImage {
        if blocks.iter().all(|block| block.translated_text.is_empty()) {
            return image.clone();
        }
        let mut canvas = image.to_rgba8();
        for block in blocks {
            if block.translated_text.is_empty() {
                continue;
            }
            if let Err(err) = self.render_block(&mut canvas, block) {
                warn!(source = block.source_text(), error = %err, "block not drawn");
            }
        }
        restore_color_type(canvas, image.color())
    }

    fn render_block(&self, canvas: &mut RgbaImage, block: &TranslatedBlock) -> Result<(), RenderError> {
        let (width, height) = canvas.dimensions();
        let bbox = BoundingBox::from_polygon(block.polygon(), width, height)
            .filter(|bbox| !bbox.is_empty())
            .ok_or(RenderError::DegenerateBox)?;

        let region = bbox.expand(self.options.margin, width, height);
        let background = sample_background(canvas, region)
            .map(|sample| add_discoloration(&sample, self.options.discoloration))
            .unwrap_or(DEFAULT_BACKGROUND);
        fill_box(canvas, bbox, background);

        let Some(font) = &self.font else {
            return Ok(());
        };
        let layout = font.layout(&block.translated_text)?;
        let Some(size) = layout.fit_size(bbox.width(), bbox.height(), self.options.max_font_size)
        else {
            debug!(text = %block.translated_text, "text does not fit its box at any size");
            return Ok(());
        };
        let text_color = text_color_for(background);
        draw_text(canvas, bbox, font, &layout, size, background, text_color)
    }
}

fn fill_box(canvas: &mut RgbaImage, bbox: BoundingBox, color: Rgb) {
    let [r, g, b] = color;
    for y in bbox.y_min..bbox.y_max {
        for x in bbox.x_min..bbox.x_max {
            canvas.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }
}

/// Rasterizes the text into a box-sized pixmap pre-filled with the (opaque)
/// background, then copies it back. Opaque pixels are identical premultiplied or not.
fn draw_text(
    canvas: &mut RgbaImage,
    bbox: BoundingBox,
    font: &FontFace,
    layout: &TextLayout,
    size: u32,
    background: Rgb,
    text_color: Rgb,
) -> Result<(), RenderError> {
    let (box_w, box_h) = (bbox.width(), bbox.height());
    let Some(pixel_box) = layout.pixel_box(size) else {
        return Ok(());
    };
    let origin_x = (box_w as i32 - pixel_box.width as i32).div_euclid(2) - pixel_box.left;
    let origin_y = (box_h as i32 - pixel_box.height as i32).div_euclid(2) - pixel_box.top;

    let Some(path) = font.outline(layout, size, (origin_x as f32, origin_y as f32))? else {
        return Ok(());
    };
    let mut pixmap = Pixmap::new(box_w, box_h).ok_or(RenderError::Pixmap {
        width: box_w,
        height: box_h,
    })?;
    pixmap.fill(Color::from_rgba8(background[0], background[1], background[2], 255));
    let mut paint = Paint::default();
    paint.set_color_rgba8(text_color[0], text_color[1], text_color[2], 255);
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

    for (idx, pixel) in pixmap.pixels().iter().enumerate() {
        let x = bbox.x_min + idx as u32 % box_w;
        let y = bbox.y_min + idx as u32 / box_w;
        canvas.put_pixel(x, y, Rgba([pixel.red(), pixel.green(), pixel.blue(), 255]));
    }
    Ok(())
}

fn restore_color_type(canvas: RgbaImage, color: ColorType) -> DynamicImage {
    let rgba = DynamicImage::ImageRgba8(canvas);
    match color {
        ColorType::L8 => DynamicImage::ImageLuma8(rgba.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(rgba.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(rgba.to_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(rgba.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(rgba.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(rgba.to_rgb16()),
        ColorType::Rgba16 => DynamicImage::ImageRgba16(rgba.to_rgba16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(rgba.to_rgb32f()),
        ColorType::Rgba32F => DynamicImage::ImageRgba32F(rgba.to_rgba32f()),
        _ => rgba,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::TextBlock;
    use image::{GenericImageView, Rgb as RgbPixel, RgbImage};

    fn page(width: u32, height: u32, paper: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, RgbPixel(paper)))
    }

    fn translated(x: f32, y: f32, w: f32, h: f32, source: &str, translation: &str) -> TranslatedBlock {
        TranslatedBlock::new(TextBlock::from_rect(x, y, w, h, source), translation)
    }

    #[test]
    fn no_translations_return_the_image_unchanged() {
        let image = page(40, 30, [12, 34, 56]);
        let reconstructor = Reconstructor::new(RenderOptions::default(), None);
        let blocks = vec![translated(0.0, 0.0, 10.0, 10.0, "Hi", "")];
        let output = reconstructor.reconstruct(&image, &blocks);
        assert_eq!(output, image);
        assert_eq!(reconstructor.reconstruct(&image, &[]), image);
    }

    #[test]
    fn box_is_erased_with_discolored_background() {
        let mut rgb = RgbImage::from_pixel(120, 40, RgbPixel([100, 120, 140]));
        // "ink" inside the box
        for x in 10..60 {
            rgb.put_pixel(x, 10, RgbPixel([0, 0, 0]));
        }
        let image = DynamicImage::ImageRgb8(rgb);
        let reconstructor = Reconstructor::new(RenderOptions::default(), None);
        let blocks = vec![translated(0.0, 0.0, 100.0, 20.0, "Hello", "你好")];

        let output = reconstructor.reconstruct(&image, &blocks);

        assert_eq!(output.color(), ColorType::Rgb8);
        assert_eq!(output.dimensions(), (120, 40));
        let output = output.to_rgb8();
        for y in 0..20 {
            for x in 0..100 {
                assert_eq!(output.get_pixel(x, y).0, [140, 160, 180], "pixel {},{}", x, y);
            }
        }
        assert_eq!(output.get_pixel(110, 30).0, [100, 120, 140]);
    }

    #[test]
    fn white_paper_is_erased_with_near_white() {
        let image = page(50, 50, [255, 255, 255]);
        let reconstructor = Reconstructor::new(RenderOptions::default(), None);
        let blocks = vec![translated(5.0, 5.0, 20.0, 10.0, "x", "y")];
        let output = reconstructor.reconstruct(&image, &blocks).to_rgb8();
        assert_eq!(output.get_pixel(10, 10).0, [245, 245, 245]);
        assert_eq!(output.get_pixel(40, 40).0, [255, 255, 255]);
    }

    #[test]
    fn degenerate_block_is_skipped() {
        let image = page(20, 20, [50, 50, 50]);
        let reconstructor = Reconstructor::new(RenderOptions::default(), None);
        let blocks = vec![translated(30.0, 30.0, 5.0, 5.0, "off", "page")];
        let output = reconstructor.reconstruct(&image, &blocks);
        assert_eq!(output.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn grayscale_input_stays_grayscale() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(30, 30, image::Luma([90])));
        let reconstructor = Reconstructor::new(RenderOptions::default(), None);
        let blocks = vec![translated(0.0, 0.0, 10.0, 10.0, "a", "b")];
        let output = reconstructor.reconstruct(&image, &blocks);
        assert_eq!(output.color(), ColorType::L8);
    }

    fn tuffy() -> FontFace {
        FontFace::from_data(include_bytes!("../../tests/fixtures/Tuffy.ttf").to_vec(), 0).unwrap()
    }

    /// Pixels of `image` inside `x0..x1, y0..y1` that differ from `background`.
    fn ink_pixels(
        image: &RgbImage,
        (x0, y0, x1, y1): (u32, u32, u32, u32),
        background: [u8; 3],
    ) -> Vec<(u32, u32)> {
        let mut ink = Vec::new();
        for y in y0..y1 {
            for x in x0..x1 {
                if image.get_pixel(x, y).0 != background {
                    ink.push((x, y));
                }
            }
        }
        ink
    }

    #[test]
    fn text_is_drawn_dark_and_centered_on_light_paper() {
        let image = page(200, 60, [200, 200, 200]);
        let reconstructor = Reconstructor::new(RenderOptions::default(), Some(tuffy()));
        let blocks = vec![translated(20.0, 10.0, 160.0, 40.0, "Hola", "Hello")];
        let output = reconstructor.reconstruct(&image, &blocks).to_rgb8();

        // nothing outside the box changes
        let outside = ink_pixels(&output, (0, 0, 200, 10), [200, 200, 200]);
        assert!(outside.is_empty());
        assert_eq!(output.get_pixel(5, 55).0, [200, 200, 200]);

        let ink = ink_pixels(&output, (20, 10, 180, 50), [240, 240, 240]);
        assert!(!ink.is_empty(), "no text pixels drawn");
        let darkest = ink
            .iter()
            .map(|(x, y)| output.get_pixel(*x, *y).0.iter().map(|c| u32::from(*c)).sum::<u32>())
            .min()
            .unwrap();
        assert!(darkest < 3 * 64, "text is not dark: {}", darkest);

        let left = ink.iter().map(|(x, _)| *x).min().unwrap();
        let right = ink.iter().map(|(x, _)| *x).max().unwrap() + 1;
        let top = ink.iter().map(|(_, y)| *y).min().unwrap();
        let bottom = ink.iter().map(|(_, y)| *y).max().unwrap() + 1;
        let center_x = (left + right) as f32 / 2.0;
        let center_y = (top + bottom) as f32 / 2.0;
        assert!((center_x - 100.0).abs() <= 2.0, "ink centered at x={}", center_x);
        assert!((center_y - 30.0).abs() <= 2.0, "ink centered at y={}", center_y);
        // the fitted size fills the box along at least one side
        assert!(right - left >= 150 || bottom - top >= 34);
    }

    #[test]
    fn text_is_drawn_light_on_dark_paper() {
        let image = page(120, 40, [20, 20, 30]);
        let reconstructor = Reconstructor::new(RenderOptions::default(), Some(tuffy()));
        let blocks = vec![translated(10.0, 10.0, 100.0, 20.0, "x", "Hello")];
        let output = reconstructor.reconstruct(&image, &blocks).to_rgb8();

        let ink = ink_pixels(&output, (10, 10, 110, 30), [60, 60, 70]);
        let brightest = ink
            .iter()
            .map(|(x, y)| output.get_pixel(*x, *y).0.iter().map(|c| u32::from(*c)).sum::<u32>())
            .max()
            .unwrap();
        assert!(brightest > 3 * 192, "text is not light: {}", brightest);
    }

    #[test]
    fn unmapped_glyph_leaves_the_box_erased() {
        let mut rgb = RgbImage::from_pixel(120, 40, RgbPixel([100, 120, 140]));
        for x in 10..60 {
            rgb.put_pixel(x, 10, RgbPixel([0, 0, 0]));
        }
        let image = DynamicImage::ImageRgb8(rgb);
        let reconstructor = Reconstructor::new(RenderOptions::default(), Some(tuffy()));
        let blocks = vec![
            translated(0.0, 0.0, 100.0, 20.0, "Hello", "你好"),
            translated(0.0, 25.0, 100.0, 15.0, "World", "World"),
        ];
        let output = reconstructor.reconstruct(&image, &blocks).to_rgb8();

        assert!(ink_pixels(&output, (0, 0, 100, 20), [140, 160, 180]).is_empty());
        // the failing block does not stop the next one
        assert!(!ink_pixels(&output, (0, 25, 100, 40), [140, 160, 180]).is_empty());
    }
}
