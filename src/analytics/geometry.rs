//! Image-to-field mapping and polygon tests.

use crate::domain::metrics::{HEATMAP_COLS, HEATMAP_ROWS};
use crate::domain::{Point, SportProfile};

/// Linear mapping from image pixels to field meters.
///
/// Calibration points are not applied; the image is assumed to span the
/// whole field.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper {
    field_length: f64,
    field_width: f64,
    image_width: f64,
    image_height: f64,
}

impl FieldMapper {
    pub fn new(profile: SportProfile, image_width: f64, image_height: f64) -> Self {
        let (field_length, field_width) = profile.field_dimensions();
        Self {
            field_length,
            field_width,
            image_width,
            image_height,
        }
    }

    pub fn field_length(&self) -> f64 {
        self.field_length
    }

    /// Map an image position to field meters
    pub fn to_field(&self, p: Point) -> Point {
        Point::new(
            p.x / self.image_width * self.field_length,
            p.y / self.image_height * self.field_width,
        )
    }

    /// Heatmap `(row, col)` for a field position, clamped into the grid
    pub fn heatmap_cell(&self, field: Point) -> (usize, usize) {
        let col = bucket(field.x / self.field_length, HEATMAP_COLS);
        let row = bucket(field.y / self.field_width, HEATMAP_ROWS);
        (row, col)
    }
}

fn bucket(fraction: f64, buckets: usize) -> usize {
    let scaled = (fraction * buckets as f64).clamp(0.0, (buckets - 1) as f64);
    // NaN clamps to NaN and casts to 0
    scaled as usize
}

/// Ray-casting point-in-polygon test.
///
/// Polygons with fewer than three vertices contain nothing.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        // The straddle check guarantees a.y != b.y before dividing
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
