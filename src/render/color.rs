use image::RgbaImage;
use std::collections::HashMap;

use super::BoundingBox;

pub type Rgb = [u8; 3];

/// Substitute for a background that would come out pure white, and for samples
/// that are neither RGB nor RGBA.
pub const DEFAULT_BACKGROUND: Rgb = [245, 245, 245];

pub const BLACK: Rgb = [0, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];

/// Most frequent pixel value inside `region`. Ties go to the smallest color so the
/// result does not depend on iteration order. `None` for an empty region.
pub fn sample_background(image: &RgbaImage, region: BoundingBox) -> Option<[u8; 4]> {
    let mut histogram: HashMap<[u8; 4], u32> = HashMap::new();
    for y in region.y_min..region.y_max.min(image.height()) {
        for x in region.x_min..region.x_max.min(image.width()) {
            *histogram.entry(image.get_pixel(x, y).0).or_insert(0) += 1;
        }
    }
    histogram
        .into_iter()
        .max_by(|(color_a, count_a), (color_b, count_b)| {
            count_a.cmp(count_b).then_with(|| color_b.cmp(color_a))
        })
        .map(|(color, _)| color)
}

/// Shifts each channel by `strength`, saturating at 255. Alpha is dropped. A result
/// of pure white is replaced by [`DEFAULT_BACKGROUND`].
pub fn add_discoloration(color: &[u8], strength: u8) -> Rgb {
    let rgb = match color {
        [r, g, b] | [r, g, b, _] => [*r, *g, *b],
        _ => return DEFAULT_BACKGROUND,
    };
    let shifted = rgb.map(|channel| channel.saturating_add(strength));
    if shifted == WHITE {
        DEFAULT_BACKGROUND
    } else {
        shifted
    }
}

/// Relative luminance in `[0, 1]`.
pub fn luminance(color: Rgb) -> f32 {
    let [r, g, b] = color.map(f32::from);
    (0.299 * r + 0.587 * g + 0.114 * b) / 255.0
}

/// Black on light backgrounds, white on dark ones.
pub fn text_color_for(background: Rgb) -> Rgb {
    if luminance(background) > 0.5 {
        BLACK
    } else {
        WHITE
    }
}
