use crate::error::{Result, TilerError};
use log::debug;

/// Affine mapping between raster pixel space and CRS coordinates.
///
/// Coefficients follow the GDAL layout:
/// `x = gt[0] + col * gt[1] + row * gt[2]`, `y = gt[3] + col * gt[4] + row * gt[5]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    coeffs: [f64; 6],
    inverse: [f64; 6],
}

impl GeoTransform {
    pub fn new(coeffs: [f64; 6]) -> Result<Self> {
        let det = coeffs[1] * coeffs[5] - coeffs[2] * coeffs[4];
        if !det.is_finite() || det.abs() < f64::EPSILON * 1e-6 {
            return Err(TilerError::SingularGeotransform(coeffs));
        }

        let inv_det = 1.0 / det;
        let a = coeffs[5] * inv_det;
        let b = -coeffs[2] * inv_det;
        let d = -coeffs[4] * inv_det;
        let e = coeffs[1] * inv_det;
        let inverse = [
            -(a * coeffs[0] + b * coeffs[3]),
            a,
            b,
            -(d * coeffs[0] + e * coeffs[3]),
            d,
            e,
        ];

        Ok(Self { coeffs, inverse })
    }

    pub fn coeffs(&self) -> [f64; 6] {
        self.coeffs
    }

    /// Pixel (row, col) to CRS (x, y). Fractional positions are allowed.
    pub fn pixel_to_crs(&self, row: f64, col: f64) -> (f64, f64) {
        let gt = &self.coeffs;
        let x = gt[0] + col * gt[1] + row * gt[2];
        let y = gt[3] + col * gt[4] + row * gt[5];
        (x, y)
    }

    /// CRS (x, y) to fractional pixel (row, col).
    pub fn crs_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let inv = &self.inverse;
        let col = inv[0] + x * inv[1] + y * inv[2];
        let row = inv[3] + x * inv[4] + y * inv[5];
        (row, col)
    }

    /// Ground size of one pixel along the column (x) axis.
    pub fn pixel_width(&self) -> f64 {
        self.coeffs[1].hypot(self.coeffs[4])
    }

    /// Ground size of one pixel along the row (y) axis.
    pub fn pixel_height(&self) -> f64 {
        self.coeffs[2].hypot(self.coeffs[5])
    }

    pub fn is_north_up(&self) -> bool {
        self.coeffs[2] == 0.0 && self.coeffs[4] == 0.0
    }

    /// Convert a CRS distance to whole pixels per axis, rounding up so the
    /// expansion covers at least the requested distance.
    pub fn distance_to_pixels(&self, distance: f64) -> (usize, usize) {
        let cols = distance_in_cells(distance, self.pixel_width());
        let rows = distance_in_cells(distance, self.pixel_height());
        debug!(
            "Distance {} = {} px horizontally, {} px vertically (pixel size {:.6} x {:.6})",
            distance,
            cols,
            rows,
            self.pixel_width(),
            self.pixel_height()
        );
        (cols, rows)
    }

    /// Geotransform of a sub-window whose top-left pixel is (row_off, col_off),
    /// at the same pixel size and rotation.
    pub fn for_window(&self, row_off: usize, col_off: usize) -> GeoTransform {
        let (x, y) = self.pixel_to_crs(row_off as f64, col_off as f64);
        let mut coeffs = self.coeffs;
        coeffs[0] = x;
        coeffs[3] = y;
        GeoTransform {
            coeffs,
            inverse: invert_offset(&coeffs, &self.inverse),
        }
    }
}

// The linear part of the inverse is unchanged by a translation of the origin.
fn invert_offset(coeffs: &[f64; 6], inverse: &[f64; 6]) -> [f64; 6] {
    let (a, b, d, e) = (inverse[1], inverse[2], inverse[4], inverse[5]);
    [
        -(a * coeffs[0] + b * coeffs[3]),
        a,
        b,
        -(d * coeffs[0] + e * coeffs[3]),
        d,
        e,
    ]
}

fn distance_in_cells(distance: f64, pixel_size: f64) -> usize {
    if distance <= 0.0 {
        return 0;
    }
    // Absorb float noise such as 5.0 / 0.1 = 50.000000000000007.
    let cells = distance / pixel_size;
    let nearest = cells.round();
    if (cells - nearest).abs() < 1e-9 {
        nearest as usize
    } else {
        cells.ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn utm_like() -> GeoTransform {
        GeoTransform::new([500_000.0, 0.25, 0.0, 6_650_000.0, 0.0, -0.25]).unwrap()
    }

    #[test]
    fn test_pixel_to_crs_north_up() {
        let gt = utm_like();
        let (x, y) = gt.pixel_to_crs(4.0, 8.0);
        assert_abs_diff_eq!(x, 500_002.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 6_649_999.0, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let gt = utm_like();
        for &(row, col) in &[(0.0, 0.0), (12.5, 7.25), (999.0, 3.0), (0.5, 1023.75)] {
            let (x, y) = gt.pixel_to_crs(row, col);
            let (r, c) = gt.crs_to_pixel(x, y);
            assert_abs_diff_eq!(r, row, epsilon = 1e-6);
            assert_abs_diff_eq!(c, col, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_round_trip_rotated() {
        let gt = GeoTransform::new([100.0, 0.8, 0.6, 200.0, 0.6, -0.8]).unwrap();
        let (x, y) = gt.pixel_to_crs(31.0, 17.5);
        let (r, c) = gt.crs_to_pixel(x, y);
        assert_abs_diff_eq!(r, 31.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c, 17.5, epsilon = 1e-9);
        assert!(!gt.is_north_up());
        assert_abs_diff_eq!(gt.pixel_width(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_rejected() {
        assert!(GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_distance_to_pixels_per_axis() {
        let gt = GeoTransform::new([0.0, 0.1, 0.0, 0.0, 0.0, -0.5]).unwrap();
        assert_eq!(gt.distance_to_pixels(5.0), (50, 10));
        assert_eq!(gt.distance_to_pixels(5.01), (51, 11));
        assert_eq!(gt.distance_to_pixels(0.0), (0, 0));
    }

    #[test]
    fn test_for_window() {
        let gt = utm_like();
        let sub = gt.for_window(40, 100);
        assert_abs_diff_eq!(sub.coeffs()[0], 500_025.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sub.coeffs()[3], 6_649_990.0, epsilon = 1e-9);
        let (r, c) = sub.crs_to_pixel(500_025.0, 6_649_990.0);
        assert_abs_diff_eq!(r, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c, 0.0, epsilon = 1e-6);
    }
}
