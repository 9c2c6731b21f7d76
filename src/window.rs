use crate::geotransform::GeoTransform;
use geo::{LineString, Polygon};

/// Half-open pixel rectangle `[x_min, x_max) x [y_min, y_max)` in raster space.
/// `x` runs along columns, `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelWindow {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

impl PixelWindow {
    pub fn new(x_min: usize, y_min: usize, x_max: usize, y_max: usize) -> Self {
        debug_assert!(x_min <= x_max && y_min <= y_max);
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Whole raster of the given size.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> usize {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> usize {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn offset(&self) -> (isize, isize) {
        (self.x_min as isize, self.y_min as isize)
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn contains(&self, other: &PixelWindow) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && other.x_max <= self.x_max
            && other.y_max <= self.y_max
    }

    pub fn intersection(&self, other: &PixelWindow) -> Option<PixelWindow> {
        let x_min = self.x_min.max(other.x_min);
        let y_min = self.y_min.max(other.y_min);
        let x_max = self.x_max.min(other.x_max);
        let y_max = self.y_max.min(other.y_max);
        if x_min < x_max && y_min < y_max {
            Some(PixelWindow::new(x_min, y_min, x_max, y_max))
        } else {
            None
        }
    }

    /// Closed CRS ring through the four pixel-edge corners, clockwise in pixel space.
    pub fn to_polygon(&self, gt: &GeoTransform) -> Polygon<f64> {
        let corners = [
            (self.y_min, self.x_min),
            (self.y_min, self.x_max),
            (self.y_max, self.x_max),
            (self.y_max, self.x_min),
            (self.y_min, self.x_min),
        ];
        let ring: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(row, col)| gt.pixel_to_crs(row as f64, col as f64))
            .collect();
        Polygon::new(LineString::from(ring), vec![])
    }
}

impl std::fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}-{}, {}-{}] ({}x{})",
            self.x_min,
            self.x_max,
            self.y_min,
            self.y_max,
            self.width(),
            self.height()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};

    #[test]
    fn test_dimensions() {
        let w = PixelWindow::new(10, 20, 110, 70);
        assert_eq!(w.width(), 100);
        assert_eq!(w.height(), 50);
        assert_eq!(w.area(), 5000);
        assert!(!w.is_empty());
        assert!(PixelWindow::new(3, 3, 3, 9).is_empty());
    }

    #[test]
    fn test_intersection() {
        let a = PixelWindow::new(0, 0, 10, 10);
        let b = PixelWindow::new(5, 8, 20, 20);
        assert_eq!(a.intersection(&b), Some(PixelWindow::new(5, 8, 10, 10)));
        let touching = PixelWindow::new(10, 0, 20, 10);
        assert_eq!(a.intersection(&touching), None);
    }

    #[test]
    fn test_to_polygon_north_up() {
        let gt = GeoTransform::new([1000.0, 2.0, 0.0, 5000.0, 0.0, -2.0]).unwrap();
        let poly = PixelWindow::new(10, 5, 20, 15).to_polygon(&gt);
        let rect = poly.bounding_rect().unwrap();
        assert_eq!(rect.min().x, 1020.0);
        assert_eq!(rect.max().x, 1040.0);
        assert_eq!(rect.min().y, 4970.0);
        assert_eq!(rect.max().y, 4990.0);
        assert_eq!(poly.unsigned_area(), 400.0);
    }
}
