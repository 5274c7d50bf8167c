//! Box geometry shared by detection, prediction and redaction.

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left and `(x2, y2)`
/// bottom-right.
///
/// Coordinates are `f64` so that extrapolated boxes keep their exact value
/// until the compositor rasterizes them.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Area, or zero for inverted boxes.
    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Intersection over union. Zero when either box is empty.
    pub fn iou(&self, other: &BBox) -> f64 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Rasterize against a `width × height` frame.
    ///
    /// Edges are rounded outward (floor for the top-left corner, ceil for the
    /// bottom-right), then x is clamped to `[0, width-1]` and y to
    /// `[0, height-1]`. Returns `None` for non-finite or degenerate results
    /// (`x2 <= x1` or `y2 <= y1`).
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        if !self.is_finite() || width == 0 || height == 0 {
            return None;
        }
        let max_x = f64::from(width - 1);
        let max_y = f64::from(height - 1);
        let x1 = self.x1.floor().clamp(0.0, max_x);
        let y1 = self.y1.floor().clamp(0.0, max_y);
        let x2 = self.x2.ceil().clamp(0.0, max_x);
        let y2 = self.y2.ceil().clamp(0.0, max_y);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x1: x1 as u32,
            y1: y1 as u32,
            x2: x2 as u32,
            y2: y2 as u32,
        })
    }
}

/// Clamped pixel rectangle. Both corners are inclusive and lie inside the
/// frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_pulls_negative_edges_to_zero() {
        let rect = BBox::new(-5.0, -5.0, 15.0, 15.0).clamp_to(100, 100).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x1: 0,
                y1: 0,
                x2: 15,
                y2: 15
            }
        );
    }

    #[test]
    fn clamp_stops_at_last_pixel() {
        let rect = BBox::new(90.0, 95.0, 250.0, 400.0).clamp_to(100, 100).unwrap();
        assert_eq!(rect.x2, 99);
        assert_eq!(rect.y2, 99);
    }

    #[test]
    fn clamp_rejects_boxes_outside_the_frame() {
        assert!(BBox::new(-30.0, -30.0, -1.0, -1.0).clamp_to(100, 100).is_none());
        assert!(BBox::new(120.0, 10.0, 180.0, 50.0).clamp_to(100, 100).is_none());
    }

    #[test]
    fn clamp_rejects_inverted_and_nan_boxes() {
        assert!(BBox::new(50.0, 50.0, 40.0, 60.0).clamp_to(100, 100).is_none());
        assert!(BBox::new(f64::NAN, 0.0, 10.0, 10.0).clamp_to(100, 100).is_none());
        assert!(BBox::new(0.0, 0.0, 10.0, 10.0).clamp_to(0, 100).is_none());
    }

    #[test]
    fn clamp_collapses_box_starting_on_last_column() {
        assert!(BBox::new(99.0, 0.0, 150.0, 10.0).clamp_to(100, 100).is_none());
        let rect = BBox::new(98.0, 0.0, 150.0, 10.0).clamp_to(100, 100).unwrap();
        assert_eq!((rect.x1, rect.x2), (98, 99));
    }

    #[test]
    fn clamp_rounds_fractional_edges_outward() {
        let rect = BBox::new(10.6, 20.2, 30.1, 40.9).clamp_to(100, 100).unwrap();
        assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (10, 20, 31, 41));
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-12);
        assert_eq!(b.iou(&BBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }
}
