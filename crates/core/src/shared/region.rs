/// A candidate face location reported by a detector.
///
/// Coordinates are in source-image pixels and may extend past the image
/// edges; [`FaceRegion::clamp_to`] yields the visible part.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f64,
}

/// A region clamped inside an image, safe for pixel indexing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    /// Builds a region from corner coordinates `(x1, y1, x2, y2)`.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Self {
        let x = x1.round() as i32;
        let y = y1.round() as i32;
        Self {
            x,
            y,
            width: (x2.round() as i32 - x).max(0),
            height: (y2.round() as i32 - y).max(0),
            confidence,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Expands the shorter side around the center so the region is square.
    ///
    /// Recognition models expect a fixed aspect; stretching a tall face box
    /// into a square input distorts identity features.
    pub fn squared(&self) -> FaceRegion {
        let side = self.width.max(self.height);
        let cx = self.x as f64 + self.width as f64 / 2.0;
        let cy = self.y as f64 + self.height as f64 / 2.0;
        FaceRegion {
            x: (cx - side as f64 / 2.0).round() as i32,
            y: (cy - side as f64 / 2.0).round() as i32,
            width: side,
            height: side,
            confidence: self.confidence,
        }
    }

    /// Intersection with a `width`×`height` image, or `None` if empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x1 = self.x.max(0) as i64;
        let y1 = self.y.max(0) as i64;
        let x2 = (self.x as i64 + self.width as i64).min(width as i64);
        let y2 = (self.y as i64 + self.height as i64).min(height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn region(x: i32, y: i32, w: i32, h: i32) -> FaceRegion {
        FaceRegion::new(x, y, w, h, 0.9)
    }

    #[test]
    fn test_from_corners_rounds() {
        let r = FaceRegion::from_corners(10.4, 20.6, 50.5, 80.2, 0.7);
        assert_eq!((r.x, r.y, r.width, r.height), (10, 21, 41, 59));
        assert_relative_eq!(r.confidence, 0.7);
    }

    #[test]
    fn test_squared_keeps_center() {
        let r = region(100, 100, 40, 80).squared();
        assert_eq!((r.x, r.y, r.width, r.height), (80, 100, 80, 80));
    }

    #[test]
    fn test_clamp_inside_is_identity() {
        let rect = region(10, 10, 20, 20).clamp_to(100, 100).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 10,
                y: 10,
                width: 20,
                height: 20
            }
        );
    }

    #[test]
    fn test_clamp_negative_origin() {
        let rect = region(-10, -5, 30, 30).clamp_to(100, 100).unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (0, 0, 20, 25));
    }

    #[test]
    fn test_clamp_outside_is_none() {
        assert!(region(200, 200, 10, 10).clamp_to(100, 100).is_none());
    }

    #[test]
    fn test_area_of_degenerate_is_zero() {
        assert_eq!(region(0, 0, -5, 10).area(), 0);
    }
}
