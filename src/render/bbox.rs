use crate::ocr::Point;

/// Axis-aligned pixel rectangle, half-open: `x_min..x_max` by `y_min..y_max`.
/// Always within `[0, width] x [0, height]` of the image it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    /// Envelope of the polygon's vertices clamped to the image. `None` for a polygon
    /// without finite points.
    pub fn from_polygon(polygon: &[Point], width: u32, height: u32) -> Option<Self> {
        let finite = polygon
            .iter()
            .filter(|point| point.x.is_finite() && point.y.is_finite());
        let mut extent: Option<(f32, f32, f32, f32)> = None;
        for point in finite {
            extent = Some(match extent {
                None => (point.x, point.y, point.x, point.y),
                Some((x0, y0, x1, y1)) => (
                    x0.min(point.x),
                    y0.min(point.y),
                    x1.max(point.x),
                    y1.max(point.y),
                ),
            });
        }
        let (x0, y0, x1, y1) = extent?;
        let x_min = clamp_coord(x0.floor(), width);
        let y_min = clamp_coord(y0.floor(), height);
        let x_max = clamp_coord(x1.ceil(), width).max(x_min);
        let y_max = clamp_coord(y1.ceil(), height).max(y_min);
        Some(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Grows the box by `margin` on every side without leaving the image.
    pub fn expand(&self, margin: u32, width: u32, height: u32) -> Self {
        Self {
            x_min: self.x_min.saturating_sub(margin),
            y_min: self.y_min.saturating_sub(margin),
            x_max: self.x_max.saturating_add(margin).min(width),
            y_max: self.y_max.saturating_add(margin).min(height),
        }
    }
}

fn clamp_coord(value: f32, limit: u32) -> u32 {
    value.clamp(0.0, limit as f32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(points: &[(f32, f32)]) -> Vec<Point> {
        points.iter().map(|(x, y)| Point::new(*x, *y)).collect()
    }

    #[test]
    fn envelope_of_a_rotated_quad() {
        let polygon = quad(&[(10.0, 5.0), (50.0, 2.0), (52.0, 20.0), (12.0, 24.5)]);
        let bbox = BoundingBox::from_polygon(&polygon, 100, 100).unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                x_min: 10,
                y_min: 2,
                x_max: 52,
                y_max: 25,
            }
        );
    }

    #[test]
    fn clamped_to_image_bounds() {
        let polygon = quad(&[(-5.0, -3.0), (120.0, -3.0), (120.0, 40.0), (-5.0, 40.0)]);
        let bbox = BoundingBox::from_polygon(&polygon, 100, 30).unwrap();
        assert_eq!((bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max), (0, 0, 100, 30));
    }

    #[test]
    fn invariant_holds_across_a_grid_of_polygons() {
        let (width, height) = (64u32, 48u32);
        let coords = [0.0f32, 0.4, 7.5, 31.9, 47.0, 48.0, 63.2, 64.0];
        for &xa in &coords {
            for &ya in &coords {
                for &xb in &coords {
                    let ya = ya.min(height as f32);
                    let yb = (ya + 3.3).min(height as f32);
                    let polygon = quad(&[(xa, ya), (xb, ya), (xb, yb), (xa, yb)]);
                    let bbox = BoundingBox::from_polygon(&polygon, width, height).unwrap();
                    assert!(bbox.x_min <= bbox.x_max && bbox.x_max <= width, "{:?}", bbox);
                    assert!(bbox.y_min <= bbox.y_max && bbox.y_max <= height, "{:?}", bbox);
                }
            }
        }
    }

    #[test]
    fn empty_or_non_finite_polygon_has_no_box() {
        assert_eq!(BoundingBox::from_polygon(&[], 10, 10), None);
        let polygon = quad(&[(f32::NAN, 1.0), (f32::INFINITY, 2.0)]);
        assert_eq!(BoundingBox::from_polygon(&polygon, 10, 10), None);
    }

    #[test]
    fn expansion_stops_at_edges() {
        let bbox = BoundingBox {
            x_min: 4,
            y_min: 15,
            x_max: 90,
            y_max: 25,
        };
        let grown = bbox.expand(10, 95, 30);
        assert_eq!((grown.x_min, grown.y_min, grown.x_max, grown.y_max), (0, 5, 95, 30));
    }
}
