//! Page-space geometry: the quad polygon every block carries.
//!
//! All coordinates live in a single page-space whose origin is the top-left
//! corner of the page bounding box. Raster images of the same page exist at
//! several resolutions (low-res for layout/line detection, high-res for
//! OCR/vision crops), so the one operation everything depends on is
//! [`PolygonBox::rescale`]: a similarity transform between two image sizes
//! that share the page origin. Rescaling A→B→A must reproduce the original
//! within floating-point rounding, which the tests pin down.

use serde::{Deserialize, Serialize};

/// An axis-aligned quad polygon in page coordinates.
///
/// Corners are stored in top-left, top-right, bottom-right, bottom-left
/// order. Most layout models emit axis-aligned boxes; the four-corner form
/// is kept so skewed regions survive round-trips through serialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonBox {
    pub polygon: [[f64; 2]; 4],
}

impl PolygonBox {
    /// Build an axis-aligned polygon from a `(x0, y0, x1, y1)` bounding box.
    pub fn from_bbox(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            polygon: [[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
        }
    }

    /// Leftmost x coordinate.
    pub fn x0(&self) -> f64 {
        self.polygon.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min)
    }

    /// Topmost y coordinate.
    pub fn y0(&self) -> f64 {
        self.polygon.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min)
    }

    /// Rightmost x coordinate.
    pub fn x1(&self) -> f64 {
        self.polygon.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Bottommost y coordinate.
    pub fn y1(&self) -> f64 {
        self.polygon.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Bounding box as `(x0, y0, x1, y1)`.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        (self.x0(), self.y0(), self.x1(), self.y1())
    }

    pub fn width(&self) -> f64 {
        self.x1() - self.x0()
    }

    pub fn height(&self) -> f64 {
        self.y1() - self.y0()
    }

    /// `(width, height)` of the bounding box.
    pub fn size(&self) -> (f64, f64) {
        (self.width(), self.height())
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x0() + self.x1()) / 2.0,
            (self.y0() + self.y1()) / 2.0,
        )
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Similarity transform between two image sizes sharing the page origin.
    ///
    /// Each corner is scaled by `new/old` per axis. Degenerate source sizes
    /// (zero width or height) leave the polygon unchanged rather than
    /// producing NaNs.
    #[must_use]
    pub fn rescale(&self, old_size: (f64, f64), new_size: (f64, f64)) -> Self {
        if old_size.0 <= 0.0 || old_size.1 <= 0.0 {
            return self.clone();
        }
        let sx = new_size.0 / old_size.0;
        let sy = new_size.1 / old_size.1;
        let mut polygon = self.polygon;
        for p in &mut polygon {
            p[0] *= sx;
            p[1] *= sy;
        }
        Self { polygon }
    }

    /// Clamp every corner into `(x0, y0, x1, y1)`.
    ///
    /// Used after rescaling a child polygon so it never escapes its parent's
    /// bounds, and before cropping so pixel indices stay inside the image.
    #[must_use]
    pub fn fit_to_bounds(&self, bounds: (f64, f64, f64, f64)) -> Self {
        let (bx0, by0, bx1, by1) = bounds;
        let mut polygon = self.polygon;
        for p in &mut polygon {
            p[0] = p[0].clamp(bx0, bx1);
            p[1] = p[1].clamp(by0, by1);
        }
        Self { polygon }
    }

    /// Axis-aligned bounding box covering both polygons.
    #[must_use]
    pub fn union(&self, other: &PolygonBox) -> Self {
        Self::from_bbox(
            self.x0().min(other.x0()),
            self.y0().min(other.y0()),
            self.x1().max(other.x1()),
            self.y1().max(other.y1()),
        )
    }

    /// True when this polygon's bounding box lies entirely inside `other`'s.
    pub fn is_within(&self, other: &PolygonBox) -> bool {
        self.x0() >= other.x0()
            && self.y0() >= other.y0()
            && self.x1() <= other.x1()
            && self.y1() <= other.y1()
    }

    /// Fraction of this polygon's area covered by `other` (0.0–1.0).
    ///
    /// Computed on bounding boxes, which is how line-to-block assignment
    /// decides which layout region owns a detected text line.
    pub fn intersection_fraction(&self, other: &PolygonBox) -> f64 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        let ix = (self.x1().min(other.x1()) - self.x0().max(other.x0())).max(0.0);
        let iy = (self.y1().min(other.y1()) - self.y0().max(other.y0())).max(0.0);
        (ix * iy) / area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: &PolygonBox, b: &PolygonBox, tol: f64) -> bool {
        a.polygon
            .iter()
            .zip(b.polygon.iter())
            .all(|(p, q)| (p[0] - q[0]).abs() < tol && (p[1] - q[1]).abs() < tol)
    }

    #[test]
    fn bbox_accessors() {
        let p = PolygonBox::from_bbox(10.0, 20.0, 110.0, 70.0);
        assert_eq!(p.bbox(), (10.0, 20.0, 110.0, 70.0));
        assert_eq!(p.size(), (100.0, 50.0));
        assert_eq!(p.center(), (60.0, 45.0));
        assert_eq!(p.area(), 5000.0);
    }

    #[test]
    fn rescale_scales_both_axes() {
        let p = PolygonBox::from_bbox(10.0, 10.0, 20.0, 30.0);
        let scaled = p.rescale((100.0, 100.0), (200.0, 50.0));
        assert_eq!(scaled.bbox(), (20.0, 5.0, 40.0, 15.0));
    }

    #[test]
    fn rescale_round_trip_is_identity_within_tolerance() {
        let p = PolygonBox::from_bbox(13.7, 42.1, 561.9, 780.4);
        let there = p.rescale((612.0, 792.0), (816.0, 1056.0));
        let back = there.rescale((816.0, 1056.0), (612.0, 792.0));
        assert!(approx_eq(&p, &back, 1e-9), "got {:?}", back);
    }

    #[test]
    fn rescale_degenerate_size_is_noop() {
        let p = PolygonBox::from_bbox(1.0, 2.0, 3.0, 4.0);
        assert_eq!(p.rescale((0.0, 100.0), (50.0, 50.0)), p);
    }

    #[test]
    fn fit_to_bounds_clamps_corners() {
        let p = PolygonBox::from_bbox(-5.0, 10.0, 120.0, 90.0);
        let fitted = p.fit_to_bounds((0.0, 0.0, 100.0, 80.0));
        assert_eq!(fitted.bbox(), (0.0, 10.0, 100.0, 80.0));
    }

    #[test]
    fn union_covers_both_boxes() {
        let a = PolygonBox::from_bbox(0.0, 10.0, 50.0, 40.0);
        let b = PolygonBox::from_bbox(30.0, 0.0, 80.0, 25.0);
        assert_eq!(a.union(&b).bbox(), (0.0, 0.0, 80.0, 40.0));
    }

    #[test]
    fn containment_after_clamp() {
        let parent = PolygonBox::from_bbox(0.0, 0.0, 100.0, 100.0);
        let child = PolygonBox::from_bbox(90.0, 90.0, 150.0, 150.0);
        assert!(!child.is_within(&parent));
        assert!(child.fit_to_bounds(parent.bbox()).is_within(&parent));
    }

    #[test]
    fn intersection_fraction_of_half_overlap() {
        let a = PolygonBox::from_bbox(0.0, 0.0, 10.0, 10.0);
        let b = PolygonBox::from_bbox(5.0, 0.0, 20.0, 10.0);
        assert!((a.intersection_fraction(&b) - 0.5).abs() < 1e-12);
        assert_eq!(a.intersection_fraction(&PolygonBox::from_bbox(50.0, 50.0, 60.0, 60.0)), 0.0);
    }
}
